//! Datagram codec for encoding/decoding Commands

use crate::command::Command;
use rkyv::util::AlignedVec;
use thiserror::Error;
use tracing::trace;

/// Receive buffer size used by both ends of the link
pub const MAX_DATAGRAM_SIZE: usize = 512;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Encoding failed: {0}")]
    Encode(String),

    #[error("Decoding failed: {0}")]
    Decode(String),

    #[error("Datagram too large: {size} bytes (max: {max})")]
    TooLarge { size: usize, max: usize },

    #[error("Empty datagram")]
    Empty,
}

/// Encodes exactly one `Command` per datagram
///
/// There is no framing inside the datagram: a decode call consumes the
/// whole buffer. Anything larger than `max_datagram` is refused on both
/// paths since the peer's receive buffer would truncate it.
#[derive(Debug, Clone, Copy)]
pub struct DatagramCodec {
    max_datagram: usize,
}

impl Default for DatagramCodec {
    fn default() -> Self {
        Self::new(MAX_DATAGRAM_SIZE)
    }
}

impl DatagramCodec {
    pub fn new(max_datagram: usize) -> Self {
        Self { max_datagram }
    }

    pub fn max_datagram(&self) -> usize {
        self.max_datagram
    }

    /// Serialize a command into a datagram payload
    pub fn encode(&self, command: &Command) -> Result<Vec<u8>, CodecError> {
        let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(command)
            .map_err(|e| CodecError::Encode(e.to_string()))?;

        if bytes.len() > self.max_datagram {
            return Err(CodecError::TooLarge {
                size: bytes.len(),
                max: self.max_datagram,
            });
        }

        trace!("Encoded {} command: {} bytes", command.kind(), bytes.len());
        Ok(bytes.to_vec())
    }

    /// Parse a datagram payload; never returns a partial value
    pub fn decode(&self, data: &[u8]) -> Result<Command, CodecError> {
        if data.is_empty() {
            return Err(CodecError::Empty);
        }
        if data.len() > self.max_datagram {
            return Err(CodecError::TooLarge {
                size: data.len(),
                max: self.max_datagram,
            });
        }

        // Receive buffers carry no alignment guarantee
        let mut aligned = AlignedVec::<16>::with_capacity(data.len());
        aligned.extend_from_slice(data);

        let command = rkyv::from_bytes::<Command, rkyv::rancor::Error>(&aligned)
            .map_err(|e| CodecError::Decode(e.to_string()))?;

        trace!("Decoded {} command from {} bytes", command.kind(), data.len());
        Ok(command)
    }
}

/// Encode with the default datagram limit
pub fn encode(command: &Command) -> Result<Vec<u8>, CodecError> {
    DatagramCodec::default().encode(command)
}

/// Decode with the default datagram limit
pub fn decode(data: &[u8]) -> Result<Command, CodecError> {
    DatagramCodec::default().decode(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{ConnectParams, Proto, Reply};

    #[test]
    fn test_roundtrip_preserves_every_field() {
        let commands = vec![
            Command::Connect(ConnectParams {
                device: Some("/dev/cdc-wdm0".to_string()),
                proto: Proto::Mbim,
                slot: 1,
            }),
            Command::Connect(ConnectParams {
                device: None,
                proto: Proto::Qrtr,
                slot: 2,
            }),
            Command::Disconnect,
            Command::OpenLogicalChannel {
                aid: vec![0xA0, 0x00, 0x00, 0x05, 0x59, 0x10, 0x10],
            },
            Command::CloseLogicalChannel { channel: 1 },
            Command::Transmit {
                body: vec![0x81, 0xE2, 0x91, 0x00, 0x02, 0xBF, 0x3E],
            },
            Command::Response(Reply::ok(vec![0x90, 0x00])),
            Command::Response(Reply::failure(vec![], "already open")),
            Command::Exit,
        ];

        for command in commands {
            let bytes = encode(&command).unwrap();
            let decoded = decode(&bytes).unwrap();
            assert_eq!(decoded, command);
        }
    }

    #[test]
    fn test_decode_unaligned_input() {
        let command = Command::Transmit {
            body: vec![1, 2, 3, 4],
        };
        let bytes = encode(&command).unwrap();

        // Shift the datagram by one byte inside a larger buffer
        let mut shifted = vec![0u8];
        shifted.extend_from_slice(&bytes);

        assert_eq!(decode(&shifted[1..]).unwrap(), command);
    }

    #[test]
    fn test_decode_rejects_empty() {
        assert!(matches!(decode(&[]), Err(CodecError::Empty)));
    }

    #[test]
    fn test_decode_rejects_truncated() {
        let bytes = encode(&Command::OpenLogicalChannel {
            aid: vec![0xA0, 0x00, 0x00, 0x05, 0x59],
        })
        .unwrap();

        assert!(matches!(decode(&bytes[..3]), Err(CodecError::Decode(_))));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode(&[0xFF; 16]), Err(CodecError::Decode(_))));
    }

    #[test]
    fn test_encode_rejects_oversized() {
        let command = Command::Transmit {
            body: vec![0u8; MAX_DATAGRAM_SIZE],
        };

        let result = encode(&command);
        assert!(matches!(result, Err(CodecError::TooLarge { max: MAX_DATAGRAM_SIZE, .. })));
    }

    #[test]
    fn test_custom_limit() {
        let codec = DatagramCodec::new(2048);
        let command = Command::Transmit {
            body: vec![0u8; 1024],
        };

        let bytes = codec.encode(&command).unwrap();
        assert!(bytes.len() > MAX_DATAGRAM_SIZE);
        assert_eq!(codec.decode(&bytes).unwrap(), command);

        assert!(matches!(
            DatagramCodec::default().decode(&bytes),
            Err(CodecError::TooLarge { .. })
        ));
    }
}
