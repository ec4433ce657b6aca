//! Counter-mode keystream for SRTP (RFC 3711 4.1.1)
//!
//! The block cipher key schedule is expanded once when the session is
//! created; each packet only clones the expanded key into a fresh CTR state.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::consts::U16;
use aes::cipher::{BlockCipher, BlockEncryptMut, BlockSizeUser, InnerIvInit, KeyInit, StreamCipher};
use aes::{Aes128, Aes192, Aes256};
use ctr::{flavors, Ctr128BE, CtrCore};
use twofish::Twofish;

use super::suite::{SymCipher, BLOCK_LEN};
use crate::error::Error;
use crate::Result;

/// Expanded block cipher used as a counter-mode keystream generator
#[derive(Clone)]
pub enum CtrCipher {
    Aes128(Aes128),
    Aes192(Aes192),
    Aes256(Aes256),
    Twofish(Twofish),
}

fn keystream<C>(cipher: &C, iv: &[u8; BLOCK_LEN], data: &mut [u8])
where
    C: BlockCipher + BlockEncryptMut + BlockSizeUser<BlockSize = U16> + Clone,
{
    let core = CtrCore::<C, flavors::Ctr128BE>::inner_iv_init(cipher.clone(), GenericArray::from_slice(iv));
    let mut ctr = Ctr128BE::<C>::from_core(core);
    ctr.apply_keystream(data);
}

impl CtrCipher {
    pub fn new(cipher: SymCipher, key: &[u8]) -> Result<Self> {
        let invalid = |_| {
            Error::SrtpError(format!(
                "Invalid {:?} key length: {} bytes",
                cipher,
                key.len()
            ))
        };

        match (cipher, key.len()) {
            (SymCipher::Aes, 16) => Ok(CtrCipher::Aes128(Aes128::new_from_slice(key).map_err(invalid)?)),
            (SymCipher::Aes, 24) => Ok(CtrCipher::Aes192(Aes192::new_from_slice(key).map_err(invalid)?)),
            (SymCipher::Aes, 32) => Ok(CtrCipher::Aes256(Aes256::new_from_slice(key).map_err(invalid)?)),
            (SymCipher::TwoFish, 16 | 24 | 32) => {
                Ok(CtrCipher::Twofish(Twofish::new_from_slice(key).map_err(invalid)?))
            }
            _ => Err(Error::SrtpError(format!(
                "Invalid {:?} key length: {} bytes",
                cipher,
                key.len()
            ))),
        }
    }

    /// XOR `data` with the keystream starting at counter block `iv`
    pub fn apply_keystream(&self, iv: &[u8; BLOCK_LEN], data: &mut [u8]) {
        if data.is_empty() {
            return;
        }
        match self {
            CtrCipher::Aes128(c) => keystream(c, iv, data),
            CtrCipher::Aes192(c) => keystream(c, iv, data),
            CtrCipher::Aes256(c) => keystream(c, iv, data),
            CtrCipher::Twofish(c) => keystream(c, iv, data),
        }
    }
}

/// Build the SRTP/SRTCP counter block
///
/// IV = (salt << 16) XOR (SSRC << 64) XOR (index << 16), with the 48-bit
/// packet index (ROC || SEQ for SRTP, SRTCP index for SRTCP) in bytes 8..14.
pub fn build_iv(salt: &[u8; 14], ssrc: u32, index: u64) -> [u8; BLOCK_LEN] {
    let mut iv = [0u8; BLOCK_LEN];
    iv[4..8].copy_from_slice(&ssrc.to_be_bytes());
    iv[8..14].copy_from_slice(&index.to_be_bytes()[2..8]);
    for (byte, salt) in iv.iter_mut().zip(salt.iter()) {
        *byte ^= salt;
    }
    iv
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    #[test]
    fn test_rfc3711_keystream() {
        // RFC 3711 B.2 AES-CM test vector
        let key = hex("2B7E151628AED2A6ABF7158809CF4F3C");
        let mut iv = [0u8; 16];
        iv[..14].copy_from_slice(&hex("F0F1F2F3F4F5F6F7F8F9FAFBFCFD"));

        let cipher = CtrCipher::new(SymCipher::Aes, &key).unwrap();
        let mut out = vec![0u8; 48];
        cipher.apply_keystream(&iv, &mut out);

        assert_eq!(&out[..16], &hex("E03EAD0935C95E80E166B16DD92B4EB4")[..]);
        assert_eq!(&out[16..32], &hex("D23513162B02D0F72A43A2FE4A5F97AB")[..]);
        assert_eq!(&out[32..48], &hex("41E95B3BB0A2E8DD477901E4FCA894C0")[..]);
    }

    #[test]
    fn test_keystream_is_involution() {
        for (cipher, key_len) in [(SymCipher::Aes, 16), (SymCipher::Aes, 32), (SymCipher::TwoFish, 24)] {
            let ctr = CtrCipher::new(cipher, &vec![0x42; key_len]).unwrap();
            let iv = build_iv(&[7u8; 14], 0x1234, 99);
            let plain = b"media payload that spans more than one block".to_vec();

            let mut data = plain.clone();
            ctr.apply_keystream(&iv, &mut data);
            assert_ne!(data, plain);
            ctr.apply_keystream(&iv, &mut data);
            assert_eq!(data, plain);
        }
    }

    #[test]
    fn test_matches_keyed_ctr_for_every_key_size() {
        use aes::cipher::KeyIvInit;

        let iv = build_iv(&[0x5a; 14], 0xdead_beef, 0x0001_0000_fffe);
        let plain = vec![0x33u8; 70];

        let mut expected = plain.clone();
        Ctr128BE::<Aes128>::new_from_slices(&[9; 16], &iv).unwrap().apply_keystream(&mut expected);
        let mut data = plain.clone();
        CtrCipher::new(SymCipher::Aes, &[9; 16]).unwrap().apply_keystream(&iv, &mut data);
        assert_eq!(data, expected);

        let mut expected = plain.clone();
        Ctr128BE::<Aes192>::new_from_slices(&[9; 24], &iv).unwrap().apply_keystream(&mut expected);
        let mut data = plain.clone();
        CtrCipher::new(SymCipher::Aes, &[9; 24]).unwrap().apply_keystream(&iv, &mut data);
        assert_eq!(data, expected);

        let mut expected = plain.clone();
        Ctr128BE::<Aes256>::new_from_slices(&[9; 32], &iv).unwrap().apply_keystream(&mut expected);
        let mut data = plain.clone();
        CtrCipher::new(SymCipher::Aes, &[9; 32]).unwrap().apply_keystream(&iv, &mut data);
        assert_eq!(data, expected);

        let mut expected = plain.clone();
        Ctr128BE::<Twofish>::new_from_slices(&[9; 32], &iv).unwrap().apply_keystream(&mut expected);
        let mut data = plain;
        CtrCipher::new(SymCipher::TwoFish, &[9; 32]).unwrap().apply_keystream(&iv, &mut data);
        assert_eq!(data, expected);
    }

    #[test]
    fn test_ciphers_differ() {
        let iv = [0u8; 16];
        let mut aes = [0u8; 16];
        let mut twofish = [0u8; 16];
        CtrCipher::new(SymCipher::Aes, &[1; 16]).unwrap().apply_keystream(&iv, &mut aes);
        CtrCipher::new(SymCipher::TwoFish, &[1; 16]).unwrap().apply_keystream(&iv, &mut twofish);
        assert_ne!(aes, twofish);
    }

    #[test]
    fn test_invalid_key_length() {
        assert!(CtrCipher::new(SymCipher::Aes, &[0; 15]).is_err());
        assert!(CtrCipher::new(SymCipher::TwoFish, &[0; 40]).is_err());
    }

    #[test]
    fn test_build_iv() {
        let iv = build_iv(&[0u8; 14], 0xaabbccdd, 0x0000_0001_0002);
        assert_eq!(&iv[4..8], &[0xaa, 0xbb, 0xcc, 0xdd]);
        assert_eq!(&iv[8..14], &[0, 0, 0, 1, 0, 2]);
        assert_eq!(&iv[14..], &[0, 0]);
    }
}
