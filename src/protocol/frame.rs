//! Wire framing for the command characteristic.
//!
//! Commands travel as bare UTF-8 text with no header, terminator or
//! checksum. Notifications come back the same way.

use bytes::Bytes;

use crate::error::{Error, Result};

/// An outbound UTF-8 payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    payload: Bytes,
}

impl CommandFrame {
    /// Encode command text.
    pub fn new(text: &str) -> Self {
        Self {
            payload: Bytes::copy_from_slice(text.as_bytes()),
        }
    }

    /// Raw payload bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.payload
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Check if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Take the payload.
    pub fn into_bytes(self) -> Bytes {
        self.payload
    }

    /// Check the frame is non-empty and at most `max_len` bytes.
    pub fn validate(&self, max_len: usize) -> Result<()> {
        if self.is_empty() {
            return Err(Error::InvalidCommand {
                reason: "command is empty".to_string(),
            });
        }

        if self.len() > max_len {
            return Err(Error::CommandTooLong {
                len: self.len(),
                max: max_len,
            });
        }

        Ok(())
    }
}

impl From<&str> for CommandFrame {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

/// Decode a notification payload as UTF-8 text.
pub fn decode_notification(data: &[u8]) -> Result<String> {
    std::str::from_utf8(data)
        .map(str::to_string)
        .map_err(|e| Error::DecodeError {
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_is_plain_utf8() {
        let frame = CommandFrame::new("abort");
        assert_eq!(frame.as_bytes(), b"abort");
        assert_eq!(frame.len(), 5);
        assert_eq!(frame.into_bytes(), Bytes::from_static(b"abort"));
    }

    #[test]
    fn test_frame_multibyte_length() {
        // Length is counted in bytes, not characters
        let frame = CommandFrame::from("µ");
        assert_eq!(frame.len(), 2);
    }

    #[test]
    fn test_validate() {
        assert!(CommandFrame::new("sampleBag").validate(20).is_ok());
        assert!(matches!(
            CommandFrame::new("").validate(20),
            Err(Error::InvalidCommand { .. })
        ));
        assert!(matches!(
            CommandFrame::new("sampleAndPurgeBag").validate(10),
            Err(Error::CommandTooLong { len: 17, max: 10 })
        ));
    }

    #[test]
    fn test_decode_notification() {
        assert_eq!(decode_notification(b"Sampling done").unwrap(), "Sampling done");
        assert_eq!(decode_notification(b"").unwrap(), "");
    }

    #[test]
    fn test_decode_invalid_utf8() {
        let err = decode_notification(&[0x66, 0xFF, 0xFE]).unwrap_err();
        assert!(matches!(err, Error::DecodeError { .. }));
        assert!(err.to_string().starts_with("Error in notification handler"));
    }
}
