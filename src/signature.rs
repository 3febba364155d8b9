//! Callback signature codec
//!
//! signature = hex(SHA1(concat(sort(token, timestamp, nonce[, encrypted]))))

use sha1::{Digest, Sha1};
use subtle::ConstantTimeEq;

use crate::error::{AesError, AesResult};

/// Compute the signature over token, timestamp, nonce and an optional
/// fourth part (the ciphertext or `echostr`)
pub fn sign(token: &str, timestamp: &str, nonce: &str, extra: Option<&str>) -> String {
    let mut parts = vec![token, timestamp, nonce];
    if let Some(extra) = extra {
        parts.push(extra);
    }
    parts.sort_unstable();

    let mut hasher = Sha1::new();
    for part in &parts {
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Verify a candidate signature
pub fn verify(
    token: &str,
    timestamp: &str,
    nonce: &str,
    extra: Option<&str>,
    candidate: &str,
) -> bool {
    check(token, timestamp, nonce, extra, candidate).is_ok()
}

/// Verify a candidate signature, returning both digests on mismatch so the
/// caller can log them
pub fn check(
    token: &str,
    timestamp: &str,
    nonce: &str,
    extra: Option<&str>,
    candidate: &str,
) -> AesResult<()> {
    let expected = sign(token, timestamp, nonce, extra);
    if constant_time_eq(expected.as_bytes(), candidate.trim().as_bytes()) {
        Ok(())
    } else {
        Err(AesError::SignatureInvalid {
            expected,
            received: candidate.to_string(),
        })
    }
}

/// Digest lengths are public; only the content comparison is constant-time
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sign_and_verify() {
        let token = "test_token";
        let timestamp = "1234567890";
        let nonce = "abc123";

        let signature = sign(token, timestamp, nonce, None);
        assert!(verify(token, timestamp, nonce, None, &signature));
        assert!(!verify(token, timestamp, "wrong", None, &signature));
    }

    #[test]
    fn test_known_vector() {
        // sorted: "1409304348" < "QDG6eK" < "xxxxxx"
        let expected = hex::encode(Sha1::digest(b"1409304348QDG6eKxxxxxx"));
        assert_eq!(sign("xxxxxx", "1409304348", "QDG6eK", None), expected);
    }

    #[test]
    fn test_order_independent() {
        let a = sign("t", "1", "n", Some("cipher"));
        let b = sign("cipher", "n", "1", Some("t"));
        assert_eq!(a, b);
        assert_eq!(a.len(), 40);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_any_changed_part_fails() {
        let sig = sign("t", "1700000000", "nonce", Some("cipher"));
        assert!(verify("t", "1700000000", "nonce", Some("cipher"), &sig));
        assert!(!verify("t2", "1700000000", "nonce", Some("cipher"), &sig));
        assert!(!verify("t", "1700000001", "nonce", Some("cipher"), &sig));
        assert!(!verify("t", "1700000000", "nonce2", Some("cipher"), &sig));
        assert!(!verify("t", "1700000000", "nonce", Some("cipher2"), &sig));
        assert!(!verify("t", "1700000000", "nonce", None, &sig));
    }

    #[test]
    fn test_check_reports_both_digests() {
        let err = check("t", "1", "n", None, "deadbeef").unwrap_err();
        match err {
            AesError::SignatureInvalid { expected, received } => {
                assert_eq!(expected, sign("t", "1", "n", None));
                assert_eq!(received, "deadbeef");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    proptest! {
        #[test]
        fn test_sign_then_verify_any_input(
            token in any::<String>(),
            timestamp in any::<String>(),
            nonce in any::<String>(),
            extra in proptest::option::of(any::<String>()),
        ) {
            let sig = sign(&token, &timestamp, &nonce, extra.as_deref());
            prop_assert!(verify(&token, &timestamp, &nonce, extra.as_deref(), &sig));
        }

        #[test]
        fn test_changing_one_part_fails(
            parts in prop::array::uniform4("[A-Za-z0-9]{1,24}"),
            which in 0usize..4,
            suffix in "[A-Za-z0-9]{1,8}",
        ) {
            let sig = sign(&parts[0], &parts[1], &parts[2], Some(parts[3].as_str()));

            let mut changed = parts.clone();
            changed[which].push_str(&suffix);
            prop_assert!(!verify(
                &changed[0],
                &changed[1],
                &changed[2],
                Some(changed[3].as_str()),
                &sig
            ));
        }
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }
}
