//! Transport-level callback parameters
//!
//! Signature fields travel in the query string, not in the XML body.

use serde::Deserialize;

/// `encrypt_type` value for AES-encrypted callbacks
pub const ENCRYPT_TYPE_AES: &str = "aes";

/// Body the platform accepts as "received, nothing to say"
pub const SUCCESS_REPLY: &str = "success";

/// URL verification parameters (GET request)
///
/// Official Accounts sign with `signature` over (token, timestamp, nonce);
/// WeCom and safe-mode accounts sign with `msg_signature`, which also covers
/// `echostr`.
#[derive(Debug, Clone, Deserialize)]
pub struct VerifyParams {
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub msg_signature: Option<String>,
    pub timestamp: String,
    pub nonce: String,
    pub echostr: String,
}

/// Callback parameters (POST request)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    pub msg_signature: Option<String>,
    pub timestamp: String,
    pub nonce: String,
    #[serde(default)]
    pub encrypt_type: Option<String>,
    /// Sender openid (Official Account only)
    #[serde(default)]
    pub openid: Option<String>,
}

impl CallbackParams {
    /// Whether the sender declared the body as AES-encrypted
    pub fn is_aes(&self) -> bool {
        self.encrypt_type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case(ENCRYPT_TYPE_AES))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wecom_verify_params_parsing() {
        let query = "msg_signature=abc123&timestamp=1234567890&nonce=xyz789&echostr=encrypted_str";
        let params: VerifyParams = serde_urlencoded::from_str(query).unwrap();
        assert_eq!(params.msg_signature.as_deref(), Some("abc123"));
        assert_eq!(params.signature, None);
        assert_eq!(params.timestamp, "1234567890");
        assert_eq!(params.nonce, "xyz789");
        assert_eq!(params.echostr, "encrypted_str");
    }

    #[test]
    fn test_wechat_callback_params_parsing() {
        let query = "signature=s&timestamp=1&nonce=n&openid=o1&encrypt_type=aes&msg_signature=m";
        let params: CallbackParams = serde_urlencoded::from_str(query).unwrap();
        assert!(params.is_aes());
        assert_eq!(params.msg_signature.as_deref(), Some("m"));
        assert_eq!(params.openid.as_deref(), Some("o1"));
    }

    #[test]
    fn test_plain_callback_params() {
        let query = "signature=s&timestamp=1&nonce=n";
        let params: CallbackParams = serde_urlencoded::from_str(query).unwrap();
        assert!(!params.is_aes());
        assert_eq!(params.msg_signature, None);
    }

    #[test]
    fn test_echostr_plus_is_decoded() {
        let query = "msg_signature=a&timestamp=1&nonce=n&echostr=ab%2Bc%3D";
        let params: VerifyParams = serde_urlencoded::from_str(query).unwrap();
        assert_eq!(params.echostr, "ab+c=");

        // an unescaped '+' is form-decoded to a space
        let query = "msg_signature=a&timestamp=1&nonce=n&echostr=ab+c%3D";
        let params: VerifyParams = serde_urlencoded::from_str(query).unwrap();
        assert_eq!(params.echostr, "ab c=");
    }
}
