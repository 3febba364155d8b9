//! WeChat Message Hub Library
//!
//! Receives signed, AES-encrypted callbacks from WeChat Official Accounts and
//! WeCom, hands the decrypted message to an application [`Dispatcher`], and
//! returns the reply encrypted and signed in the platform's wire format.
//!
//! # Architecture
//!
//! ```text
//! body + query ──▶ signature ──▶ crypto ──▶ xml ──▶ Dispatcher
//!                                                     │
//! reply XML    ◀── signature ◀── crypto ◀── xml ◀─────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use wechat_msg_hub::prelude::*;
//!
//! struct Echo;
//!
//! impl Dispatcher for Echo {
//!     fn dispatch(&self, ctx: &DispatchContext<'_>, kind: &Classified) -> Option<Reply> {
//!         match kind {
//!             Classified::Message(t) if t == "text" => ctx.message.content().map(Reply::text),
//!             _ => None,
//!         }
//!     }
//! }
//!
//! let credential = Credential::new("token", "abcdefghijklmnopqrstuvwxyz0123456789ABCDEFG", "wx123")?;
//! let hub = MessageHub::new(CredentialStore::default().with_credential(credential), Echo);
//! # let (body, params) = (String::new(), CallbackParams::default());
//! let reply = hub.handle("wx123", &body, &params).unwrap_or_else(|| "success".to_string());
//! # Ok::<(), wechat_msg_hub::AesError>(())
//! ```

pub mod config;
pub mod credential;
pub mod crypto;
pub mod error;
pub mod hub;
pub mod message;
pub mod padding;
pub mod signature;
pub mod types;
pub mod webhook;
pub mod xml;

pub use config::{AccountConfig, HubConfig};
pub use credential::{Credential, CredentialStore, PlaintextMode};
pub use error::{AesError, AesResult, ErrorCode, HubError};
pub use hub::{DispatchContext, Dispatcher, MessageHub};
pub use message::{Article, Classified, InnerMessage, Reply};
pub use types::*;

/// Prelude for common imports
pub mod prelude {
    pub use crate::config::HubConfig;
    pub use crate::credential::{Credential, CredentialStore, PlaintextMode};
    pub use crate::error::{AesError, ErrorCode, HubError};
    pub use crate::hub::{DispatchContext, Dispatcher, MessageHub};
    pub use crate::message::{Classified, InnerMessage, Reply};
    pub use crate::types::*;
}
