//! Prometheus metrics

use crate::config::MonitoringConfig;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::LazyLock;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Global metrics registry
static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Global metrics instance
pub static METRICS: LazyLock<Metrics> = LazyLock::new(Metrics::new);

/// Metrics struct
pub struct Metrics {
    // Counters
    pub commands: IntCounterVec,
    pub command_errors: IntCounter,
    pub datagrams_dropped: IntCounter,

    // Gauges
    pub channel_open: IntGauge,

    // Histograms
    pub dispatch_duration: Histogram,
}

impl Metrics {
    pub fn new() -> Self {
        let commands = IntCounterVec::new(
            Opts::new("simrelay_commands_total", "Commands received, by kind"),
            &["kind"],
        )
        .expect("static metric definition");

        let command_errors = IntCounter::with_opts(Opts::new(
            "simrelay_command_errors_total",
            "Requests answered with an error",
        ))
        .expect("static metric definition");

        let datagrams_dropped = IntCounter::with_opts(Opts::new(
            "simrelay_datagrams_dropped_total",
            "Inbound datagrams that could not be decoded",
        ))
        .expect("static metric definition");

        let channel_open = IntGauge::with_opts(Opts::new(
            "simrelay_channel_open",
            "1 while a hardware channel is connected",
        ))
        .expect("static metric definition");

        let dispatch_duration = Histogram::with_opts(
            HistogramOpts::new(
                "simrelay_dispatch_duration_seconds",
                "Time spent handling one request, driver included",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )
        .expect("static metric definition");

        // Register metrics
        REGISTRY.register(Box::new(commands.clone())).ok();
        REGISTRY.register(Box::new(command_errors.clone())).ok();
        REGISTRY.register(Box::new(datagrams_dropped.clone())).ok();
        REGISTRY.register(Box::new(channel_open.clone())).ok();
        REGISTRY.register(Box::new(dispatch_duration.clone())).ok();

        Self {
            commands,
            command_errors,
            datagrams_dropped,
            channel_open,
            dispatch_duration,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Render the registry in the Prometheus text format
pub fn render() -> Result<Vec<u8>, prometheus::Error> {
    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(buffer)
}

/// Start the metrics server
pub fn start_server(config: &MonitoringConfig) -> JoinHandle<()> {
    let bind = config.prometheus_bind;
    let enabled = config.prometheus_enabled;

    tokio::spawn(async move {
        if !enabled {
            info!("Prometheus metrics disabled");
            return;
        }

        use bytes::Bytes;
        use http_body_util::Full;
        use hyper::header::{CONTENT_TYPE, HeaderValue};
        use hyper::{Response, StatusCode, server::conn::http1, service::service_fn};
        use hyper_util::rt::TokioIo;

        let listener = match tokio::net::TcpListener::bind(bind).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind metrics server: {}", e);
                return;
            }
        };

        info!("Prometheus metrics server listening on {}", bind);

        loop {
            let (stream, _) = match listener.accept().await {
                Ok(r) => r,
                Err(e) => {
                    error!("Metrics accept error: {}", e);
                    continue;
                }
            };

            let io = TokioIo::new(stream);

            tokio::spawn(async move {
                let service = service_fn(|_req| async {
                    let response = match render() {
                        Ok(buffer) => {
                            let mut response = Response::new(Full::new(Bytes::from(buffer)));
                            response
                                .headers_mut()
                                .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
                            response
                        }
                        Err(e) => {
                            error!("Metrics encoding error: {}", e);
                            let mut response = Response::new(Full::new(Bytes::new()));
                            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                            response
                        }
                    };
                    Ok::<_, std::convert::Infallible>(response)
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Metrics connection error: {}", e);
                }
            });
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_commands() {
        METRICS.commands.with_label_values(&["transmit"]).inc();
        METRICS.channel_open.set(1);

        let text = String::from_utf8(render().unwrap()).unwrap();
        assert!(text.contains("simrelay_commands_total"));
        assert!(text.contains("kind=\"transmit\""));
        assert!(text.contains("simrelay_channel_open"));
    }
}
