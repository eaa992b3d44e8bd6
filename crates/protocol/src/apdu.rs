//! APDU framing and status words

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Header bytes preceding the raw command in a `Transmit` body
pub const HEADER_LEN: usize = 5;

/// Length-byte values meaning "the rest of the buffer"
pub const EXTENDED_LENGTH_ESCAPES: [u8; 2] = [0xFE, 0xFF];

/// Normal processing
pub const SW_SUCCESS: [u8; 2] = [0x90, 0x00];

/// Generic failure, no precise diagnosis
pub const SW_FAILURE: [u8; 2] = [0x6F, 0x00];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    #[error("Transmit body is empty")]
    EmptyBody,
}

/// Recoverable framing anomaly; the exchange proceeds with best-effort bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    /// Body shorter than the header, used whole
    ShortHeader { len: usize },

    /// Declared length overruns the body, remainder used
    DeclaredLengthExceeds { declared: usize, available: usize },
}

impl std::fmt::Display for Fallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Fallback::ShortHeader { len } => {
                write!(f, "body of {len} bytes has no header, using it as-is")
            }
            Fallback::DeclaredLengthExceeds {
                declared,
                available,
            } => write!(
                f,
                "declared length {declared} exceeds {available} available bytes, using remainder"
            ),
        }
    }
}

/// Raw command carved out of a transmit body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extracted<'a> {
    pub apdu: &'a [u8],
    pub fallback: Option<Fallback>,
}

/// Unwrap the raw command from a header-prefixed `Transmit` body
///
/// `body[4]` is the declared length of what follows the header. `0xFE` and
/// `0xFF` select extended length, where the command runs to the end of the
/// buffer. Malformed lengths degrade to "use what is there" and are
/// reported through `Extracted::fallback` rather than as errors.
pub fn extract_apdu(body: &[u8]) -> Result<Extracted<'_>, FramingError> {
    if body.is_empty() {
        return Err(FramingError::EmptyBody);
    }

    if body.len() < HEADER_LEN {
        return Ok(Extracted {
            apdu: body,
            fallback: Some(Fallback::ShortHeader { len: body.len() }),
        });
    }

    let declared = body[HEADER_LEN - 1];
    let rest = &body[HEADER_LEN..];

    if EXTENDED_LENGTH_ESCAPES.contains(&declared) {
        return Ok(Extracted {
            apdu: rest,
            fallback: None,
        });
    }

    let declared = declared as usize;
    match rest.get(..declared) {
        Some(apdu) => Ok(Extracted {
            apdu,
            fallback: None,
        }),
        None => Ok(Extracted {
            apdu: rest,
            fallback: Some(Fallback::DeclaredLengthExceeds {
                declared,
                available: rest.len(),
            }),
        }),
    }
}

/// How the daemon shapes successful transmit responses
///
/// Drivers return the card's bytes without a trailer. `AppendSuccess`
/// reproduces clients that expect a `90 00` on every successful exchange;
/// it cannot tell a card-level failure from a transport success.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusWordPolicy {
    #[default]
    Passthrough,
    AppendSuccess,
}

impl StatusWordPolicy {
    /// Shape a successful driver response
    pub fn apply(&self, mut response: Vec<u8>) -> Vec<u8> {
        if *self == StatusWordPolicy::AppendSuccess {
            response.extend_from_slice(&SW_SUCCESS);
        }
        response
    }
}
