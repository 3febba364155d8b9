//! AES envelope codec
//!
//! Handles key derivation and AES-256-CBC encryption/decryption of callback
//! payloads for WeChat Official Account and WeCom.
//!
//! Plaintext frame: `random(16) || msg_len(4, big-endian) || msg || owner_id`,
//! padded to a multiple of 32 bytes (see [`crate::padding`]).

use std::fmt;

use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::NoPadding};
use base64::engine::general_purpose::STANDARD;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::{Engine, alphabet};
use rand::Rng;
use rand::distr::Alphanumeric;

use crate::error::{AesError, AesResult};
use crate::padding;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Length of the configured EncodingAESKey
pub const ENCODING_KEY_LEN: usize = 43;
/// Random prefix of every frame
pub const RANDOM_LEN: usize = 16;
/// Big-endian payload length field
pub const LENGTH_FIELD_LEN: usize = 4;
/// Smallest frame that can hold the random prefix and the length field
pub const MIN_FRAME_LEN: usize = RANDOM_LEN + LENGTH_FIELD_LEN;

const AES_BLOCK: usize = 16;

/// Standard alphabet, padding optional, non-zero trailing bits accepted.
///
/// Generated keys do not always zero the unused bits of the 43rd character.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// AES-256 key decoded from a 43-character EncodingAESKey
///
/// The IV is the first 16 bytes of the key.
#[derive(Clone, PartialEq, Eq)]
pub struct AesKey([u8; 32]);

impl AesKey {
    /// Decode a 43-character EncodingAESKey
    ///
    /// The key is base64 without its trailing `=`; one pad character is
    /// appended before decoding.
    pub fn from_encoding_key(encoding_aes_key: &str) -> AesResult<Self> {
        let encoding_aes_key = encoding_aes_key.trim();

        if encoding_aes_key.len() != ENCODING_KEY_LEN {
            return Err(AesError::BadKeyMaterial(format!(
                "EncodingAESKey must be {} characters, got {}",
                ENCODING_KEY_LEN,
                encoding_aes_key.len()
            )));
        }

        let decoded = LENIENT
            .decode(format!("{}=", encoding_aes_key))
            .map_err(|e| AesError::BadKeyMaterial(format!("invalid base64: {}", e)))?;

        let key: [u8; 32] = decoded.try_into().map_err(|v: Vec<u8>| {
            AesError::BadKeyMaterial(format!("decoded key is {} bytes, expected 32", v.len()))
        })?;

        Ok(Self(key))
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    fn iv(&self) -> &[u8] {
        &self.0[..AES_BLOCK]
    }
}

impl fmt::Debug for AesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AesKey(<redacted>)")
    }
}

/// Generate `N` random alphanumeric ASCII bytes
pub fn random_alphanumeric<const N: usize>() -> [u8; N] {
    let mut rng = rand::rng();
    let mut out = [0u8; N];
    for b in out.iter_mut() {
        *b = rng.sample(Alphanumeric);
    }
    out
}

/// Encrypt `plaintext` for `owner_id`
///
/// `random` fixes the 16-byte prefix (for deterministic tests); a fresh
/// alphanumeric prefix is generated otherwise.
pub fn encrypt(
    key: &AesKey,
    owner_id: &str,
    plaintext: &str,
    random: Option<[u8; RANDOM_LEN]>,
) -> AesResult<String> {
    let random = random.unwrap_or_else(random_alphanumeric::<RANDOM_LEN>);

    let mut buf = build_frame(&random, plaintext.as_bytes(), owner_id.as_bytes())?;
    padding::pad(&mut buf);
    let len = buf.len();

    let cipher = Aes256CbcEnc::new_from_slices(&key.0, key.iv())
        .map_err(|e| AesError::EncryptFailure(format!("cipher init: {}", e)))?;
    let encrypted = cipher
        .encrypt_padded_mut::<NoPadding>(&mut buf, len)
        .map_err(|e| AesError::EncryptFailure(format!("{:?}", e)))?;

    Ok(STANDARD.encode(encrypted))
}

/// Decrypt a base64 ciphertext and check that it was produced for `owner_id`
pub fn decrypt(key: &AesKey, owner_id: &str, ciphertext: &str) -> AesResult<String> {
    let mut buf = decode_ciphertext(ciphertext)?;

    if buf.is_empty() || buf.len() % AES_BLOCK != 0 {
        return Err(AesError::DecryptFailure(format!(
            "ciphertext length {} is not a positive multiple of {}",
            buf.len(),
            AES_BLOCK
        )));
    }

    let cipher = Aes256CbcDec::new_from_slices(&key.0, key.iv())
        .map_err(|e| AesError::DecryptFailure(format!("cipher init: {}", e)))?;
    let decrypted = cipher
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|e| AesError::DecryptFailure(format!("{:?}", e)))?;

    let frame = padding::unpad(decrypted)?;
    let (msg, owner_in_msg) = split_frame(frame)?;

    if owner_in_msg != owner_id.as_bytes() {
        return Err(AesError::OwnerIdMismatch {
            expected: owner_id.to_string(),
            actual: String::from_utf8_lossy(owner_in_msg).into_owned(),
        });
    }

    String::from_utf8(msg.to_vec())
        .map_err(|e| AesError::MalformedFrame(format!("payload is not UTF-8: {}", e)))
}

/// Decode standard or URL-safe base64, padding optional
///
/// A space is read as `+`: query strings that carry an unescaped `+` are
/// form-decoded into spaces before they get here.
fn decode_ciphertext(ciphertext: &str) -> AesResult<Vec<u8>> {
    let normalized: String = ciphertext
        .trim_matches(|c: char| c.is_whitespace() && c != ' ')
        .chars()
        .map(|c| match c {
            '-' | ' ' => '+',
            '_' => '/',
            c => c,
        })
        .collect();
    Ok(LENIENT.decode(normalized)?)
}

/// `random || len(msg) || msg || owner_id`, unpadded
fn build_frame(random: &[u8; RANDOM_LEN], msg: &[u8], owner_id: &[u8]) -> AesResult<Vec<u8>> {
    let msg_len = u32::try_from(msg.len())
        .map_err(|_| AesError::EncryptFailure(format!("payload too large: {} bytes", msg.len())))?;

    let mut buf = Vec::with_capacity(MIN_FRAME_LEN + msg.len() + owner_id.len() + padding::BLOCK_SIZE);
    buf.extend_from_slice(random);
    buf.extend_from_slice(&msg_len.to_be_bytes());
    buf.extend_from_slice(msg);
    buf.extend_from_slice(owner_id);
    Ok(buf)
}

/// Split an unpadded frame into payload and owner id tail
fn split_frame(frame: &[u8]) -> AesResult<(&[u8], &[u8])> {
    if frame.len() < MIN_FRAME_LEN {
        return Err(AesError::MalformedFrame(format!(
            "decrypted frame too short: {} bytes",
            frame.len()
        )));
    }

    let mut len_bytes = [0u8; LENGTH_FIELD_LEN];
    len_bytes.copy_from_slice(&frame[RANDOM_LEN..MIN_FRAME_LEN]);
    let msg_len = u32::from_be_bytes(len_bytes) as usize;

    let body = &frame[MIN_FRAME_LEN..];
    if msg_len > body.len() {
        return Err(AesError::MalformedFrame(format!(
            "declared length {} but only {} bytes remain",
            msg_len,
            body.len()
        )));
    }

    Ok(body.split_at(msg_len))
}
