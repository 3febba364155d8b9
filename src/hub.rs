//! Message hub
//!
//! Sequences one callback through four stages:
//!
//! ```text
//! body ──▶ authenticate + decrypt ──▶ classify ──▶ dispatch ──▶ build + encrypt + sign ──▶ reply
//! ```
//!
//! Any failure aborts the callback with "no reply". The hub never returns an
//! error to its caller: the platform redelivers callbacks that error out or
//! time out, which would duplicate whatever the dispatcher did.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::credential::{Credential, CredentialStore, PlaintextMode};
use crate::crypto::{RANDOM_LEN, random_alphanumeric};
use crate::error::{AesError, HubError};
use crate::message::{Classified, InnerMessage, Reply};
use crate::types::{CallbackParams, VerifyParams};
use crate::xml;

/// Context handed to the dispatcher for one inbound message
#[derive(Debug, Clone, Copy)]
pub struct DispatchContext<'a> {
    /// Account the callback was addressed to
    pub owner_id: &'a str,
    /// WeCom application id, when the envelope carried one
    pub agent_id: Option<&'a str>,
    /// Decrypted inner message (raw XML and parsed fields)
    pub message: &'a InnerMessage,
}

/// Application hook invoked once the inbound type is known
///
/// Returning `None` means the application has nothing to reply; the platform
/// then receives the empty acknowledgement.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, ctx: &DispatchContext<'_>, kind: &Classified) -> Option<Reply>;
}

impl<D: Dispatcher + ?Sized> Dispatcher for Arc<D> {
    fn dispatch(&self, ctx: &DispatchContext<'_>, kind: &Classified) -> Option<Reply> {
        (**self).dispatch(ctx, kind)
    }
}

impl<D: Dispatcher + ?Sized> Dispatcher for Box<D> {
    fn dispatch(&self, ctx: &DispatchContext<'_>, kind: &Classified) -> Option<Reply> {
        (**self).dispatch(ctx, kind)
    }
}

/// Output of the authenticate + decrypt stage
struct Opened {
    inner_xml: String,
    agent_id: Option<String>,
    credential: Option<Arc<Credential>>,
}

/// Callback hub for a set of accounts
pub struct MessageHub<D> {
    credentials: RwLock<Arc<CredentialStore>>,
    dispatcher: D,
    debug_mode: bool,
}

impl<D: Dispatcher> MessageHub<D> {
    pub fn new(credentials: CredentialStore, dispatcher: D) -> Self {
        if credentials.plaintext_mode() == PlaintextMode::PassThrough {
            warn!("Plaintext pass-through enabled for owners without a credential");
        }
        Self {
            credentials: RwLock::new(Arc::new(credentials)),
            dispatcher,
            debug_mode: false,
        }
    }

    /// Log raw and decrypted XML at debug level
    pub fn with_debug_mode(mut self, debug_mode: bool) -> Self {
        self.debug_mode = debug_mode;
        self
    }

    /// Swap in a new credential set; in-flight callbacks keep the old one
    pub fn reload(&self, credentials: CredentialStore) {
        info!("Reloading credentials ({} accounts)", credentials.len());
        *self.credentials.write() = Arc::new(credentials);
    }

    pub fn credentials(&self) -> Arc<CredentialStore> {
        self.credentials.read().clone()
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    /// Process one callback body
    ///
    /// Returns the reply body, or `None` when there is nothing to send (the
    /// caller answers with the `success` sentinel). Failures are logged here
    /// and never returned.
    pub fn handle(&self, owner_id: &str, body: &str, params: &CallbackParams) -> Option<String> {
        let span = info_span!("callback", request_id = %Uuid::new_v4(), owner_id);
        let _guard = span.enter();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.process(owner_id, body, params)));

        match outcome {
            Ok(Ok(reply)) => reply,
            Ok(Err(HubError::Codec(e @ AesError::SignatureInvalid { .. }))) => {
                warn!(
                    timestamp = %params.timestamp,
                    nonce = %params.nonce,
                    body_len = body.len(),
                    "Dropping callback: {}",
                    e
                );
                None
            }
            Ok(Err(e)) => {
                error!(
                    timestamp = %params.timestamp,
                    nonce = %params.nonce,
                    encrypt_type = ?params.encrypt_type,
                    body_len = body.len(),
                    code = ?e.code().map(|c| c.code()),
                    "Dropping callback: {}",
                    e
                );
                None
            }
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(
                    timestamp = %params.timestamp,
                    nonce = %params.nonce,
                    "Dropping callback after panic: {}",
                    reason
                );
                None
            }
        }
    }

    /// URL ownership handshake
    ///
    /// With `msg_signature` the signature covers `echostr`, which is then
    /// decrypted; with a plain `signature` the `echostr` is returned as-is.
    pub fn verify_url(&self, owner_id: &str, params: &VerifyParams) -> Result<String, HubError> {
        let store = self.credentials();
        let credential = store
            .get(owner_id)
            .ok_or_else(|| HubError::UnknownOwner(owner_id.to_string()))?;

        if let Some(msg_signature) = &params.msg_signature {
            credential.check_signature(
                &params.timestamp,
                &params.nonce,
                Some(params.echostr.as_str()),
                msg_signature,
            )?;
            let echo = credential.decrypt(&params.echostr)?;
            info!(owner_id, "URL verification successful, decrypted_len={}", echo.len());
            Ok(echo)
        } else if let Some(signature) = &params.signature {
            credential.check_signature(&params.timestamp, &params.nonce, None, signature)?;
            info!(owner_id, "URL verification successful (plain signature)");
            Ok(params.echostr.clone())
        } else {
            Err(HubError::MissingParameter("signature"))
        }
    }

    fn process(
        &self,
        owner_id: &str,
        body: &str,
        params: &CallbackParams,
    ) -> Result<Option<String>, HubError> {
        if self.debug_mode {
            debug!("Raw callback body: {}", body);
        }

        // 1. authenticate + decrypt
        let opened = self.open(owner_id, body, params)?;
        if self.debug_mode {
            debug!("Inner XML: {}", opened.inner_xml);
        }

        // 2. classify
        let message = InnerMessage::parse(opened.inner_xml)?;
        let kind = message.classify()?;

        // 3. dispatch
        let agent_id = opened.agent_id.as_deref().or_else(|| message.agent_id());
        let ctx = DispatchContext {
            owner_id,
            agent_id,
            message: &message,
        };
        match &kind {
            Classified::Event(event) => debug!(
                "Dispatching event {} from {}",
                event,
                message.from_user_name().unwrap_or("unknown")
            ),
            Classified::Message(msg_type) => debug!(
                "Dispatching {} message from {}",
                msg_type,
                message.from_user_name().unwrap_or("unknown")
            ),
        }
        let Some(reply) = self.dispatcher.dispatch(&ctx, &kind) else {
            debug!("Dispatcher produced no reply");
            return Ok(None);
        };

        // 4. build + encrypt + sign
        let reply_xml = render_reply(&reply, &message)?;
        let body = match &opened.credential {
            Some(credential) => seal_reply(credential, &reply_xml, opened.agent_id.as_deref())?,
            None => reply_xml,
        };
        info!("Replying with {} message", reply.msg_type());
        Ok(Some(body))
    }

    fn open(&self, owner_id: &str, body: &str, params: &CallbackParams) -> Result<Opened, HubError> {
        let store = self.credentials();

        let Some(credential) = store.get(owner_id) else {
            if params.is_aes() {
                return Err(HubError::UnknownOwner(owner_id.to_string()));
            }
            return match store.plaintext_mode() {
                PlaintextMode::PassThrough => {
                    warn!("No credential for owner, plaintext pass-through");
                    Ok(Opened {
                        inner_xml: body.to_string(),
                        agent_id: None,
                        credential: None,
                    })
                }
                PlaintextMode::Reject => Err(HubError::UnknownOwner(owner_id.to_string())),
            };
        };

        let mut envelope = xml::extract(body, &["Encrypt", "AgentID"])?;
        let encrypt = envelope
            .remove("Encrypt")
            .flatten()
            .ok_or_else(|| AesError::XmlParse("missing Encrypt element".to_string()))?;
        let agent_id = envelope.remove("AgentID").flatten().filter(|a| !a.is_empty());

        let msg_signature = params
            .msg_signature
            .as_deref()
            .ok_or(HubError::MissingParameter("msg_signature"))?;
        credential.check_signature(&params.timestamp, &params.nonce, Some(encrypt.as_str()), msg_signature)?;

        let inner_xml = credential.decrypt(&encrypt)?;

        Ok(Opened {
            inner_xml,
            agent_id,
            credential: Some(credential),
        })
    }
}

/// Reply addressed back to the inbound sender
fn render_reply(reply: &Reply, message: &InnerMessage) -> Result<String, AesError> {
    let (Some(sender), Some(receiver)) = (message.from_user_name(), message.to_user_name()) else {
        return Err(AesError::ReplyXml(
            "inbound message lacks FromUserName/ToUserName".to_string(),
        ));
    };
    Ok(reply.to_xml(sender, receiver, Utc::now().timestamp()))
}

/// Encrypt and sign a reply with a fresh timestamp and nonce
fn seal_reply(
    credential: &Credential,
    reply_xml: &str,
    agent_id: Option<&str>,
) -> Result<String, AesError> {
    let encrypted = credential.encrypt(reply_xml)?;
    let timestamp = Utc::now().timestamp().to_string();
    let nonce = String::from_utf8_lossy(&random_alphanumeric::<RANDOM_LEN>()).into_owned();
    let signature = credential.sign(&timestamp, &nonce, Some(encrypted.as_str()));
    Ok(xml::encrypted_reply(
        &encrypted,
        &signature,
        &timestamp,
        &nonce,
        agent_id,
    ))
}
