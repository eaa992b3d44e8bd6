#[cfg(test)]
mod tests {
    use crate::config::*;
    use simrelay_protocol::{ConnectParams, Proto, StatusWordPolicy};

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.server.bind.port(), 8080);
        assert_eq!(config.server.max_datagram, 512);
        assert!(!config.server.exit_on_decode_error);
        assert!(!config.server.allow_remote_exit);
        assert_eq!(config.channel.status_word, StatusWordPolicy::Passthrough);
        assert!(!config.monitoring.prometheus_enabled);
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = DaemonConfig::from_toml_str("").unwrap();
        assert_eq!(config.server.bind, DaemonConfig::default().server.bind);
    }

    #[test]
    fn test_parse_full_document() {
        let config = DaemonConfig::from_toml_str(
            r#"
[server]
bind = "127.0.0.1:9000"
max_datagram = 1024
exit_on_decode_error = true
allow_remote_exit = true

[channel]
status_word = "append-success"
proto = "qmi"
slot = 1
device = "/dev/cdc-wdm0"
mss = 240

[monitoring]
prometheus_enabled = true
prometheus_bind = "127.0.0.1:9200"
"#,
        )
        .unwrap();

        assert_eq!(config.server.bind.port(), 9000);
        assert_eq!(config.server.max_datagram, 1024);
        assert!(config.server.exit_on_decode_error);
        assert!(config.server.allow_remote_exit);
        assert_eq!(config.channel.status_word, StatusWordPolicy::AppendSuccess);
        assert_eq!(config.channel.proto, Some(Proto::Qmi));
        assert_eq!(config.channel.slot, Some(1));
        assert_eq!(config.channel.device.as_deref(), Some("/dev/cdc-wdm0"));
        assert_eq!(config.channel.mss, 240);
        assert!(config.monitoring.prometheus_enabled);
    }

    #[test]
    fn test_unknown_proto_rejected() {
        let result = DaemonConfig::from_toml_str("[channel]\nproto = \"pcsc\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_tiny_datagram_rejected() {
        let result = DaemonConfig::from_toml_str("[server]\nmax_datagram = 16\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_smallest_datagram_fits_error_reply() {
        let config = DaemonConfig::from_toml_str("[server]\nmax_datagram = 64\n").unwrap();
        assert_eq!(config.server.max_datagram, 64);
    }

    #[test]
    fn test_channel_overrides() {
        let client = ConnectParams {
            device: None,
            proto: Proto::Qrtr,
            slot: 2,
        };

        let untouched = ChannelConfig::default().resolve(client.clone());
        assert_eq!(untouched, client);

        let pinned = ChannelConfig {
            proto: Some(Proto::Mbim),
            device: Some("/dev/cdc-wdm0".to_string()),
            ..Default::default()
        }
        .resolve(client);

        assert_eq!(pinned.proto, Proto::Mbim);
        assert_eq!(pinned.slot, 2);
        assert_eq!(pinned.device.as_deref(), Some("/dev/cdc-wdm0"));
    }
}
