//! AES-128-CBC segment decryption
//!
//! Segments are decrypted whole. The IV is either the explicit value from the key
//! tag or, when absent, the segment's media sequence number as a 128-bit
//! big-endian integer. Padding is stripped leniently: servers that pad incorrectly
//! (or not at all) still yield usable output.

use aes::Aes128;
use cbc::cipher::{BlockDecryptMut, KeyIvInit, block_padding::NoPadding};

use crate::error::CryptoError;

/// AES-128 key and block size in bytes
pub const BLOCK_SIZE: usize = 16;

type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// Where a segment's IV comes from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IvSource<'a> {
    /// Hex digits from the key tag (no `0x` prefix)
    Explicit(&'a str),
    /// Media sequence number of the segment
    Sequence(u64),
}

/// Derive the 16-byte IV
///
/// Explicit IVs shorter than 16 bytes are left-padded with zeros; longer ones
/// keep their first 16 bytes. An odd number of hex digits gets a leading zero.
pub fn derive_iv(source: IvSource<'_>) -> Result<[u8; BLOCK_SIZE], CryptoError> {
    match source {
        IvSource::Sequence(sequence) => Ok(u128::from(sequence).to_be_bytes()),
        IvSource::Explicit(hex_iv) => {
            let digits = hex_iv
                .trim()
                .trim_start_matches("0x")
                .trim_start_matches("0X");
            let padded;
            let digits = if digits.len() % 2 == 1 {
                padded = format!("0{digits}");
                padded.as_str()
            } else {
                digits
            };
            let bytes = hex::decode(digits).map_err(|e| CryptoError::InvalidIv {
                iv: hex_iv.to_string(),
                reason: e.to_string(),
            })?;

            let mut iv = [0u8; BLOCK_SIZE];
            if bytes.len() >= BLOCK_SIZE {
                iv.copy_from_slice(&bytes[..BLOCK_SIZE]);
            } else {
                iv[BLOCK_SIZE - bytes.len()..].copy_from_slice(&bytes);
            }
            Ok(iv)
        }
    }
}

/// Decrypts segments with one AES-128 key
#[derive(Clone)]
pub struct SegmentDecryptor {
    key: [u8; BLOCK_SIZE],
}

impl std::fmt::Debug for SegmentDecryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentDecryptor").finish_non_exhaustive()
    }
}

impl SegmentDecryptor {
    /// Validate `key` as an AES-128 key
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        let key: [u8; BLOCK_SIZE] = key
            .try_into()
            .map_err(|_| CryptoError::KeyLength(key.len()))?;
        Ok(Self { key })
    }

    /// Decrypt a whole segment and strip its padding
    pub fn decrypt(&self, ciphertext: &[u8], iv: IvSource<'_>) -> Result<Vec<u8>, CryptoError> {
        let iv = derive_iv(iv)?;
        let decryptor =
            Aes128CbcDec::new_from_slices(&self.key, &iv).map_err(|e| CryptoError::Decrypt {
                len: ciphertext.len(),
                reason: e.to_string(),
            })?;

        let mut buf = ciphertext.to_vec();
        let plain_len = decryptor
            .decrypt_padded_mut::<NoPadding>(&mut buf)
            .map_err(|_| CryptoError::Decrypt {
                len: ciphertext.len(),
                reason: format!("length is not a multiple of {BLOCK_SIZE}"),
            })?
            .len();
        buf.truncate(plain_len);

        Ok(strip_pkcs7(buf))
    }
}

/// Remove PKCS#7 padding if it is well formed, otherwise return `data` unchanged
pub fn strip_pkcs7(mut data: Vec<u8>) -> Vec<u8> {
    let Some(&last) = data.last() else {
        return data;
    };
    let pad = usize::from(last);

    let valid = (1..=BLOCK_SIZE).contains(&pad)
        && pad <= data.len()
        && data[data.len() - pad..].iter().all(|b| *b == last);

    if valid {
        data.truncate(data.len() - pad);
    } else {
        tracing::warn!(
            len = data.len(),
            last_byte = last,
            "Segment padding is malformed, keeping decrypted bytes as is"
        );
    }
    data
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use cbc::cipher::BlockEncryptMut;
    use cbc::cipher::block_padding::Pkcs7;

    const KEY: [u8; 16] = *b"0123456789abcdef";

    fn encrypt(plain: &[u8], iv: [u8; 16]) -> Vec<u8> {
        cbc::Encryptor::<Aes128>::new_from_slices(&KEY, &iv)
            .unwrap()
            .encrypt_padded_vec_mut::<Pkcs7>(plain)
    }

    #[test]
    fn sequence_iv_is_big_endian() {
        assert_eq!(derive_iv(IvSource::Sequence(0)).unwrap(), [0u8; 16]);

        let mut one = [0u8; 16];
        one[15] = 1;
        assert_eq!(derive_iv(IvSource::Sequence(1)).unwrap(), one);

        let mut big = [0u8; 16];
        big[14] = 0x01;
        big[15] = 0x02;
        assert_eq!(derive_iv(IvSource::Sequence(0x0102)).unwrap(), big);
    }

    #[test]
    fn explicit_iv_full_length() {
        let iv = derive_iv(IvSource::Explicit("000102030405060708090A0B0C0D0E0F")).unwrap();
        assert_eq!(iv, [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15]);
    }

    #[test]
    fn short_explicit_iv_is_left_padded() {
        let iv = derive_iv(IvSource::Explicit("0x1")).unwrap();
        assert_eq!(iv, derive_iv(IvSource::Sequence(1)).unwrap());

        let iv = derive_iv(IvSource::Explicit("ABCD")).unwrap();
        assert_eq!(&iv[14..], &[0xAB, 0xCD]);
        assert!(iv[..14].iter().all(|b| *b == 0));
    }

    #[test]
    fn long_explicit_iv_is_truncated() {
        let iv = derive_iv(IvSource::Explicit(
            "FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF0102",
        ))
        .unwrap();
        assert_eq!(iv, [0xFF; 16]);
    }

    #[test]
    fn non_hex_iv_is_rejected() {
        assert!(matches!(
            derive_iv(IvSource::Explicit("zz")),
            Err(CryptoError::InvalidIv { .. })
        ));
    }

    #[test]
    fn key_must_be_16_bytes() {
        assert!(matches!(
            SegmentDecryptor::new(&[0u8; 15]),
            Err(CryptoError::KeyLength(15))
        ));
        assert!(matches!(
            SegmentDecryptor::new(&[0u8; 32]),
            Err(CryptoError::KeyLength(32))
        ));
        assert!(SegmentDecryptor::new(&KEY).is_ok());
    }

    #[test]
    fn decrypts_with_sequence_iv() {
        let plain = b"transport stream payload that spans several blocks";
        let ciphertext = encrypt(plain, derive_iv(IvSource::Sequence(7)).unwrap());

        let decryptor = SegmentDecryptor::new(&KEY).unwrap();
        let out = decryptor.decrypt(&ciphertext, IvSource::Sequence(7)).unwrap();

        assert_eq!(out, plain);
    }

    #[test]
    fn decrypts_with_explicit_iv() {
        let hex_iv = "00112233445566778899AABBCCDDEEFF";
        let plain = vec![0x47u8; 188 * 3];
        let ciphertext = encrypt(&plain, derive_iv(IvSource::Explicit(hex_iv)).unwrap());

        let decryptor = SegmentDecryptor::new(&KEY).unwrap();
        let out = decryptor
            .decrypt(&ciphertext, IvSource::Explicit(hex_iv))
            .unwrap();

        assert_eq!(out, plain);
    }

    #[test]
    fn wrong_iv_does_not_round_trip() {
        let plain = vec![0x47u8; 64];
        let ciphertext = encrypt(&plain, derive_iv(IvSource::Sequence(0)).unwrap());

        let decryptor = SegmentDecryptor::new(&KEY).unwrap();
        let out = decryptor.decrypt(&ciphertext, IvSource::Sequence(1)).unwrap();

        assert_ne!(out, plain);
    }

    #[test]
    fn misaligned_ciphertext_fails() {
        let decryptor = SegmentDecryptor::new(&KEY).unwrap();
        let err = decryptor
            .decrypt(&[0u8; 17], IvSource::Sequence(0))
            .unwrap_err();
        assert!(matches!(err, CryptoError::Decrypt { len: 17, .. }));
    }

    #[test]
    fn strip_pkcs7_removes_valid_padding() {
        let mut data = b"hello".to_vec();
        data.extend_from_slice(&[11u8; 11]);
        assert_eq!(strip_pkcs7(data), b"hello");

        let full_block = vec![16u8; 16];
        assert!(strip_pkcs7(full_block).is_empty());
    }

    #[test]
    fn strip_pkcs7_keeps_malformed_padding() {
        let zero_tail = vec![1, 2, 3, 0];
        assert_eq!(strip_pkcs7(zero_tail.clone()), zero_tail);

        let too_large = vec![0xAA; 15].into_iter().chain([17]).collect::<Vec<_>>();
        assert_eq!(strip_pkcs7(too_large.clone()), too_large);

        let inconsistent = vec![9, 9, 4, 9, 3, 3];
        assert_eq!(strip_pkcs7(inconsistent.clone()), inconsistent);

        assert!(strip_pkcs7(Vec::new()).is_empty());
    }

    #[test]
    fn unpadded_ciphertext_decrypts_unchanged() {
        // A block whose plaintext ends in 0x47 has no valid padding
        let plain = [0x47u8; 32];
        let iv = [0u8; 16];
        let mut buf = plain.to_vec();
        let ciphertext = cbc::Encryptor::<Aes128>::new_from_slices(&KEY, &iv)
            .unwrap()
            .encrypt_padded_mut::<NoPadding>(&mut buf, 32)
            .unwrap()
            .to_vec();

        let decryptor = SegmentDecryptor::new(&KEY).unwrap();
        let out = decryptor
            .decrypt(&ciphertext, IvSource::Sequence(0))
            .unwrap();

        assert_eq!(out, plain);
    }
}
