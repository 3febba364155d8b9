//! PKCS#7-style padding over a 32-byte block
//!
//! The platform pads the plaintext frame to a multiple of 32 bytes even though
//! AES itself works on 16-byte blocks. Both sides must use 32.

use crate::error::{AesError, AesResult};

/// Padding block size used by the platform
pub const BLOCK_SIZE: usize = 32;

/// Number of pad bytes needed for `data_len` bytes of data (always 1..=32)
pub fn pad_len(data_len: usize) -> usize {
    BLOCK_SIZE - (data_len % BLOCK_SIZE)
}

/// Append padding to `buf`
pub fn pad(buf: &mut Vec<u8>) {
    let n = pad_len(buf.len());
    buf.resize(buf.len() + n, n as u8);
}

/// Strip padding, validating the pad byte and every stripped byte
pub fn unpad(buf: &[u8]) -> AesResult<&[u8]> {
    let Some(&last) = buf.last() else {
        return Err(AesError::MalformedFrame("empty buffer".to_string()));
    };

    let n = last as usize;
    if n == 0 || n > BLOCK_SIZE || n > buf.len() {
        return Err(AesError::MalformedFrame(format!("invalid pad byte {}", last)));
    }

    let (data, padding) = buf.split_at(buf.len() - n);
    if padding.iter().any(|&b| b != last) {
        return Err(AesError::MalformedFrame("inconsistent padding".to_string()));
    }

    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_padded_length_is_multiple_of_block() {
        for len in 0..=100 {
            let mut buf = vec![0xAAu8; len];
            pad(&mut buf);
            assert_eq!(buf.len() % BLOCK_SIZE, 0, "len {len}");
            let added = buf.len() - len;
            assert!((1..=BLOCK_SIZE).contains(&added));
            assert_eq!(*buf.last().unwrap() as usize, added);
        }
    }

    #[test]
    fn test_full_block_when_aligned() {
        assert_eq!(pad_len(0), 32);
        assert_eq!(pad_len(32), 32);
        assert_eq!(pad_len(64), 32);
        assert_eq!(pad_len(31), 1);
        assert_eq!(pad_len(33), 31);
    }

    #[test]
    fn test_not_sixteen() {
        // 16 random + 4 len + 5 payload + 5 owner id = 30 bytes
        let mut buf = vec![0u8; 30];
        pad(&mut buf);
        assert_eq!(buf.len(), 32);
        assert_eq!(&buf[30..], &[2, 2]);
    }

    #[test]
    fn test_unpad_restores_data() {
        let data = b"hello world".to_vec();
        let mut buf = data.clone();
        pad(&mut buf);
        assert_eq!(unpad(&buf).unwrap(), &data[..]);
    }

    #[test]
    fn test_unpad_rejects_bad_padding() {
        assert!(unpad(&[]).is_err());
        assert!(unpad(&[1, 2, 0]).is_err());
        assert!(unpad(&[33u8; 64]).is_err());
        assert!(unpad(&[1, 2, 3, 3, 2]).is_err());
        assert!(unpad(&[5, 5]).is_err());
    }

    proptest! {
        #[test]
        fn test_pad_unpad_any_data(data in prop::collection::vec(any::<u8>(), 0..512)) {
            let mut buf = data.clone();
            pad(&mut buf);

            let added = buf.len() - data.len();
            prop_assert_eq!(buf.len() % BLOCK_SIZE, 0);
            prop_assert!((1..=BLOCK_SIZE).contains(&added));
            prop_assert_eq!(buf[buf.len() - 1] as usize, added);
            prop_assert_eq!(unpad(&buf).unwrap(), &data[..]);
        }
    }
}
