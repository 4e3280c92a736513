//! Error types for the codec crate.

use rememberit_core::{Phase, RememberItError};
use thiserror::Error;

/// Result type for codec operations.
pub type ProtoResult<T> = Result<T, ProtoError>;

/// Errors that can occur during encoding or decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtoError {
    /// Input ended inside a field.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// A varint ran past ten bytes.
    #[error("varint too long")]
    VarintOverflow,

    /// Wire type 3, 4, 6 or 7.
    #[error("unsupported wire type {wire_type} for field {field}")]
    UnsupportedWireType {
        /// Field number of the offending tag.
        field: u32,
        /// Wire type found in the tag.
        wire_type: u8,
    },

    /// A known field arrived with the wrong wire type.
    #[error("field {field} expected wire type {expected}, found {found}")]
    WireTypeMismatch {
        /// Field number.
        field: u32,
        /// Wire type the schema declares.
        expected: u8,
        /// Wire type found on the wire.
        found: u8,
    },

    /// A string field was not UTF-8.
    #[error("invalid UTF-8 in field {field}")]
    InvalidUtf8 {
        /// Field number.
        field: u32,
    },

    /// Deck tree nested deeper than the decoder allows.
    #[error("message nesting exceeds {max} levels")]
    NestingTooDeep {
        /// Maximum depth accepted.
        max: usize,
    },

    /// Compression or JSON serialisation failed while encoding.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },

    /// Every envelope decode strategy failed.
    #[error("{}", format_attempts(.attempts))]
    Undecodable {
        /// `(strategy, error)` for each strategy tried, in order.
        attempts: Vec<(String, String)>,
    },
}

fn format_attempts(attempts: &[(String, String)]) -> String {
    let detail: Vec<String> = attempts
        .iter()
        .map(|(strategy, err)| format!("{strategy}: {err}"))
        .collect();
    format!("all decode strategies failed ({})", detail.join("; "))
}

impl ProtoError {
    /// Create an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Convert into the public error kind for `phase`.
    pub fn into_error(self, phase: Phase) -> RememberItError {
        RememberItError::Decode {
            phase,
            message: self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undecodable_lists_attempts() {
        let err = ProtoError::Undecodable {
            attempts: vec![
                ("zstd".into(), "bad magic".into()),
                ("json".into(), "expected value".into()),
            ],
        };
        assert_eq!(
            err.to_string(),
            "all decode strategies failed (zstd: bad magic; json: expected value)"
        );
    }

    #[test]
    fn test_into_error_keeps_phase() {
        let err = ProtoError::UnexpectedEof.into_error(Phase::Query);
        assert!(matches!(
            err,
            RememberItError::Decode {
                phase: Phase::Query,
                ..
            }
        ));
    }
}
