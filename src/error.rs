//! Callback error taxonomy
//!
//! Every failure raised by the signature and envelope codecs is an [`AesError`].
//! Each variant maps onto exactly one [`ErrorCode`], which carries the numeric
//! code and message the platform documents for its reference SDKs.

use std::fmt;

/// Closed set of platform error codes
///
/// Signing and base64 encoding cannot fail, so the platform's -40003 and
/// -40009 have no variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ValidateSignatureError,
    ParseXmlError,
    IllegalAesKey,
    ValidateAppIdError,
    EncryptAesError,
    DecryptAesError,
    IllegalBuffer,
    DecodeBase64Error,
    GenReturnXmlError,
}

impl ErrorCode {
    /// Numeric code as used by the platform
    pub const fn code(self) -> i32 {
        match self {
            Self::ValidateSignatureError => -40001,
            Self::ParseXmlError => -40002,
            Self::IllegalAesKey => -40004,
            Self::ValidateAppIdError => -40005,
            Self::EncryptAesError => -40006,
            Self::DecryptAesError => -40007,
            Self::IllegalBuffer => -40008,
            Self::DecodeBase64Error => -40010,
            Self::GenReturnXmlError => -40011,
        }
    }

    /// Human-readable description
    pub const fn message(self) -> &'static str {
        match self {
            Self::ValidateSignatureError => "signature verification failed",
            Self::ParseXmlError => "xml parsing failed",
            Self::IllegalAesKey => "illegal EncodingAESKey",
            Self::ValidateAppIdError => "owner id verification failed",
            Self::EncryptAesError => "aes encryption failed",
            Self::DecryptAesError => "aes decryption failed",
            Self::IllegalBuffer => "illegal decrypted buffer",
            Self::DecodeBase64Error => "base64 decoding failed",
            Self::GenReturnXmlError => "reply xml generation failed",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message(), self.code())
    }
}

/// Typed failure of the callback codecs
///
/// Variants carry the offending inputs needed to diagnose a failure, never
/// the token or the AES key.
#[derive(Debug, thiserror::Error)]
pub enum AesError {
    #[error("signature mismatch: expected {expected}, received {received}")]
    SignatureInvalid { expected: String, received: String },

    #[error("xml parse error: {0}")]
    XmlParse(String),

    #[error("illegal EncodingAESKey: {0}")]
    BadKeyMaterial(String),

    #[error("owner id mismatch: expected '{expected}', got '{actual}'")]
    OwnerIdMismatch { expected: String, actual: String },

    #[error("aes encryption failed: {0}")]
    EncryptFailure(String),

    #[error("aes decryption failed: {0}")]
    DecryptFailure(String),

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("base64 decode failed: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    #[error("reply xml generation failed: {0}")]
    ReplyXml(String),
}

impl AesError {
    /// Platform error code for this failure
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::SignatureInvalid { .. } => ErrorCode::ValidateSignatureError,
            Self::XmlParse(_) => ErrorCode::ParseXmlError,
            Self::BadKeyMaterial(_) => ErrorCode::IllegalAesKey,
            Self::OwnerIdMismatch { .. } => ErrorCode::ValidateAppIdError,
            Self::EncryptFailure(_) => ErrorCode::EncryptAesError,
            Self::DecryptFailure(_) => ErrorCode::DecryptAesError,
            Self::MalformedFrame(_) => ErrorCode::IllegalBuffer,
            Self::Base64Decode(_) => ErrorCode::DecodeBase64Error,
            Self::ReplyXml(_) => ErrorCode::GenReturnXmlError,
        }
    }

    /// Whether the failure means the decrypted frame itself was unusable
    pub fn is_malformed_frame(&self) -> bool {
        matches!(
            self,
            Self::MalformedFrame(_) | Self::OwnerIdMismatch { .. }
        )
    }
}

/// Result type for codec operations
pub type AesResult<T> = Result<T, AesError>;

/// Reason a callback was dropped by the hub
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error(transparent)]
    Codec(#[from] AesError),

    #[error("no credential configured for owner {0}")]
    UnknownOwner(String),

    #[error("missing {0} parameter")]
    MissingParameter(&'static str),
}

impl HubError {
    /// Platform error code, when the failure came from a codec
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Codec(e) => Some(e.code()),
            Self::UnknownOwner(_) | Self::MissingParameter(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    #[test]
    fn test_codes_are_distinct() {
        let all = [
            ErrorCode::ValidateSignatureError,
            ErrorCode::ParseXmlError,
            ErrorCode::IllegalAesKey,
            ErrorCode::ValidateAppIdError,
            ErrorCode::EncryptAesError,
            ErrorCode::DecryptAesError,
            ErrorCode::IllegalBuffer,
            ErrorCode::DecodeBase64Error,
            ErrorCode::GenReturnXmlError,
        ];
        let codes: std::collections::HashSet<i32> = all.iter().map(|c| c.code()).collect();
        assert_eq!(codes.len(), all.len());
    }

    #[test]
    fn test_every_code_is_reachable() {
        let base64_err = base64::engine::general_purpose::STANDARD
            .decode("!")
            .unwrap_err();
        let errors = [
            AesError::SignatureInvalid {
                expected: "a".to_string(),
                received: "b".to_string(),
            },
            AesError::XmlParse(String::new()),
            AesError::BadKeyMaterial(String::new()),
            AesError::OwnerIdMismatch {
                expected: "a".to_string(),
                actual: "b".to_string(),
            },
            AesError::EncryptFailure(String::new()),
            AesError::DecryptFailure(String::new()),
            AesError::MalformedFrame(String::new()),
            AesError::Base64Decode(base64_err),
            AesError::ReplyXml(String::new()),
        ];
        let produced: std::collections::HashSet<ErrorCode> = errors.iter().map(AesError::code).collect();
        assert_eq!(produced.len(), 9);
    }

    #[test]
    fn test_error_maps_to_code() {
        let err = AesError::OwnerIdMismatch {
            expected: "wx123".to_string(),
            actual: "wx999".to_string(),
        };
        assert_eq!(err.code(), ErrorCode::ValidateAppIdError);
        assert_eq!(err.code().code(), -40005);
        assert!(err.is_malformed_frame());
        assert!(err.to_string().contains("wx999"));

        let err = AesError::DecryptFailure("bad".to_string());
        assert_eq!(err.code(), ErrorCode::DecryptAesError);
        assert!(!err.is_malformed_frame());
    }

    #[test]
    fn test_display_includes_numeric_code() {
        assert_eq!(
            ErrorCode::IllegalBuffer.to_string(),
            "illegal decrypted buffer (-40008)"
        );
    }
}
