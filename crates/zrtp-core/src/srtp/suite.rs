//! Negotiated algorithm identifiers and their concrete parameters

use std::fmt;

use crate::error::Error;
use crate::Result;

/// Symmetric cipher negotiated by ZRTP, always used in counter mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymCipher {
    /// AES-CM ("AES1" / "AES2" / "AES3")
    Aes,

    /// Twofish-CM ("2FS1" / "2FS2" / "2FS3")
    TwoFish,
}

/// SRTP authentication algorithm negotiated by ZRTP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthAlgorithm {
    /// HMAC-SHA1 ("HS32" / "HS80")
    HmacSha1,

    /// Keyed BLAKE3 ("B332" / "B364")
    Blake3,
}

/// Master salt length for every suite
pub const MASTER_SALT_LEN: usize = 14;

/// Cipher block size for every suite
pub const BLOCK_LEN: usize = 16;

/// Fixed parameters of a cipher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CipherSpec {
    pub cipher: SymCipher,
    /// Accepted master (and derived session) key lengths in bytes
    pub key_lengths: &'static [usize],
    pub salt_len: usize,
}

/// Fixed parameters of a MAC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacSpec {
    pub algorithm: AuthAlgorithm,
    /// Derived auth key length in bytes
    pub auth_key_len: usize,
    /// Accepted tag lengths in bytes
    pub tag_lengths: &'static [usize],
}

pub const CIPHER_TABLE: [CipherSpec; 2] = [
    CipherSpec {
        cipher: SymCipher::Aes,
        key_lengths: &[16, 24, 32],
        salt_len: MASTER_SALT_LEN,
    },
    CipherSpec {
        cipher: SymCipher::TwoFish,
        key_lengths: &[16, 24, 32],
        salt_len: MASTER_SALT_LEN,
    },
];

pub const MAC_TABLE: [MacSpec; 2] = [
    MacSpec {
        algorithm: AuthAlgorithm::HmacSha1,
        auth_key_len: 20,
        tag_lengths: &[4, 10],
    },
    MacSpec {
        algorithm: AuthAlgorithm::Blake3,
        auth_key_len: 32,
        tag_lengths: &[4, 8],
    },
];

impl SymCipher {
    pub fn spec(&self) -> &'static CipherSpec {
        match self {
            SymCipher::Aes => &CIPHER_TABLE[0],
            SymCipher::TwoFish => &CIPHER_TABLE[1],
        }
    }

    /// ZRTP cipher type name for a key length in bytes
    pub fn zrtp_name(&self, key_len: usize) -> Option<&'static str> {
        match (self, key_len) {
            (SymCipher::Aes, 16) => Some("AES1"),
            (SymCipher::Aes, 24) => Some("AES2"),
            (SymCipher::Aes, 32) => Some("AES3"),
            (SymCipher::TwoFish, 16) => Some("2FS1"),
            (SymCipher::TwoFish, 24) => Some("2FS2"),
            (SymCipher::TwoFish, 32) => Some("2FS3"),
            _ => None,
        }
    }
}

impl AuthAlgorithm {
    pub fn spec(&self) -> &'static MacSpec {
        match self {
            AuthAlgorithm::HmacSha1 => &MAC_TABLE[0],
            AuthAlgorithm::Blake3 => &MAC_TABLE[1],
        }
    }

    /// ZRTP auth tag type name for a tag length in bits
    pub fn zrtp_name(&self, tag_bits: usize) -> Option<&'static str> {
        match (self, tag_bits) {
            (AuthAlgorithm::HmacSha1, 32) => Some("HS32"),
            (AuthAlgorithm::HmacSha1, 80) => Some("HS80"),
            (AuthAlgorithm::Blake3, 32) => Some("B332"),
            (AuthAlgorithm::Blake3, 64) => Some("B364"),
            _ => None,
        }
    }
}

/// Concrete parameters of one crypto session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SrtpSuite {
    pub cipher: SymCipher,
    pub key_len: usize,
    pub auth: AuthAlgorithm,
    pub auth_key_len: usize,
    pub tag_len: usize,
}

impl SrtpSuite {
    /// Look up and validate a negotiated combination
    pub fn lookup(
        cipher: SymCipher,
        key_len: usize,
        auth: AuthAlgorithm,
        tag_bits: usize,
    ) -> Result<Self> {
        let cipher_spec = cipher.spec();
        if !cipher_spec.key_lengths.contains(&key_len) {
            return Err(Error::SrtpError(format!(
                "Unsupported {:?} key length: {} bytes",
                cipher, key_len
            )));
        }

        let mac_spec = auth.spec();
        if tag_bits % 8 != 0 || !mac_spec.tag_lengths.contains(&(tag_bits / 8)) {
            return Err(Error::SrtpError(format!(
                "Unsupported {:?} tag length: {} bits",
                auth, tag_bits
            )));
        }

        Ok(Self {
            cipher,
            key_len,
            auth,
            auth_key_len: mac_spec.auth_key_len,
            tag_len: tag_bits / 8,
        })
    }
}

impl fmt::Display for SrtpSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (
            self.cipher.zrtp_name(self.key_len),
            self.auth.zrtp_name(self.tag_len * 8),
        ) {
            (Some(cipher), Some(auth)) => write!(f, "{}/{}", cipher, auth),
            _ => write!(f, "{:?}-{}/{:?}-{}", self.cipher, self.key_len * 8, self.auth, self.tag_len * 8),
        }
    }
}
