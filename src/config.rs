//! Configuration management

use std::fmt;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// One account the hub accepts callbacks for
#[derive(Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// AppID (Official Account) or CorpID (WeCom)
    pub owner_id: String,

    /// Token for signature verification
    pub token: String,

    /// EncodingAESKey (43 characters)
    pub encoding_aes_key: String,
}

impl fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountConfig")
            .field("owner_id", &self.owner_id)
            .field("token", &"<redacted>")
            .field("encoding_aes_key", &"<redacted>")
            .finish()
    }
}

/// Hub configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Accounts with encryption credentials
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,

    /// Accept unencrypted callbacks for owners without a credential
    #[serde(default)]
    pub allow_plaintext: bool,

    /// Webhook server bind address
    #[serde(default = "default_webhook_addr")]
    pub webhook_addr: String,

    /// Enable debug mode (log raw and decrypted XML)
    #[serde(default)]
    pub debug_mode: bool,
}

fn default_webhook_addr() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            accounts: Vec::new(),
            allow_plaintext: false,
            webhook_addr: default_webhook_addr(),
            debug_mode: false,
        }
    }
}

impl HubConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut accounts = Vec::new();

        // WeChat Official Account (公众号)
        if let Some(account) = account_from(
            &lookup,
            "WECHAT_APP_ID",
            "WECHAT_TOKEN",
            "WECHAT_ENCODING_AES_KEY",
        )? {
            accounts.push(account);
        }

        // WeCom (企业微信)
        if let Some(account) = account_from(
            &lookup,
            "WECOM_CORP_ID",
            "WECOM_TOKEN",
            "WECOM_ENCODING_AES_KEY",
        )? {
            accounts.push(account);
        }

        if let Some(json) = lookup("WECHAT_ACCOUNTS").filter(|s| !s.trim().is_empty()) {
            let extra: Vec<AccountConfig> =
                serde_json::from_str(&json).context("WECHAT_ACCOUNTS must be a JSON array of accounts")?;
            accounts.extend(extra);
        }

        {
            let mut seen = std::collections::HashSet::new();
            for account in &accounts {
                if !seen.insert(account.owner_id.as_str()) {
                    return Err(anyhow!("Duplicate account for owner id {}", account.owner_id));
                }
            }
        }

        Ok(Self {
            accounts,
            allow_plaintext: lookup("ALLOW_PLAINTEXT").is_some_and(|v| parse_flag(&v)),
            webhook_addr: lookup("WEBHOOK_ADDR").unwrap_or_else(default_webhook_addr),
            debug_mode: lookup("DEBUG_MODE").is_some_and(|v| parse_flag(&v)),
        })
    }
}

/// All three variables set -> account; none set -> no account; otherwise error
fn account_from<F>(
    lookup: &F,
    owner_var: &str,
    token_var: &str,
    key_var: &str,
) -> Result<Option<AccountConfig>>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |var: &str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    match (get(owner_var), get(token_var), get(key_var)) {
        (Some(owner_id), Some(token), Some(encoding_aes_key)) => Ok(Some(AccountConfig {
            owner_id,
            token,
            encoding_aes_key,
        })),
        (None, None, None) => Ok(None),
        _ => Err(anyhow!(
            "{}, {} and {} must be set together",
            owner_var,
            token_var,
            key_var
        )),
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
