use hmac::{Hmac, Mac};
use sha1::Sha1;

use super::suite::AuthAlgorithm;
use crate::error::Error;
use crate::Result;

// Define type for HMAC-SHA1
type HmacSha1 = Hmac<Sha1>;

/// Keyed MAC state, expanded once per session
#[derive(Clone)]
enum MacState {
    HmacSha1(HmacSha1),
    Blake3(blake3::Hasher),
}

/// SRTP Authentication Handler
#[derive(Clone)]
pub struct SrtpAuthenticator {
    /// Authentication algorithm
    algorithm: AuthAlgorithm,

    /// Keyed MAC
    mac: MacState,

    /// Authentication tag length in bytes
    tag_length: usize,
}

impl SrtpAuthenticator {
    /// Create a new SRTP authenticator
    pub fn new(algorithm: AuthAlgorithm, auth_key: &[u8], tag_length: usize) -> Result<Self> {
        let mac = match algorithm {
            AuthAlgorithm::HmacSha1 => MacState::HmacSha1(
                HmacSha1::new_from_slice(auth_key)
                    .map_err(|e| Error::SrtpError(format!("Failed to create HMAC: {}", e)))?,
            ),
            AuthAlgorithm::Blake3 => {
                let key: &[u8; 32] = auth_key.try_into().map_err(|_| {
                    Error::SrtpError(format!(
                        "BLAKE3 auth key must be 32 bytes, got {}",
                        auth_key.len()
                    ))
                })?;
                MacState::Blake3(blake3::Hasher::new_keyed(key))
            }
        };

        let max_tag = match algorithm {
            AuthAlgorithm::HmacSha1 => 20,
            AuthAlgorithm::Blake3 => 32,
        };
        if tag_length == 0 || tag_length > max_tag {
            return Err(Error::SrtpError(format!(
                "Invalid {:?} tag length: {}",
                algorithm, tag_length
            )));
        }

        Ok(Self {
            algorithm,
            mac,
            tag_length,
        })
    }

    /// Calculate the truncated tag over `packet_data`, followed by the ROC for SRTP
    pub fn calculate_auth_tag(&self, packet_data: &[u8], roc: Option<u32>) -> Vec<u8> {
        match &self.mac {
            MacState::HmacSha1(mac) => {
                let mut mac = mac.clone();
                mac.update(packet_data);
                if let Some(roc) = roc {
                    mac.update(&roc.to_be_bytes());
                }
                let result = mac.finalize().into_bytes();
                result[..self.tag_length].to_vec()
            }
            MacState::Blake3(hasher) => {
                let mut hasher = hasher.clone();
                hasher.update(packet_data);
                if let Some(roc) = roc {
                    hasher.update(&roc.to_be_bytes());
                }
                let result = hasher.finalize();
                result.as_bytes()[..self.tag_length].to_vec()
            }
        }
    }

    /// Verify an authentication tag in constant time
    pub fn verify_auth_tag(&self, packet_data: &[u8], tag: &[u8], roc: Option<u32>) -> bool {
        if tag.len() != self.tag_length {
            return false;
        }
        let expected = self.calculate_auth_tag(packet_data, roc);

        let mut result = 0;
        for (a, b) in expected.iter().zip(tag.iter()) {
            result |= a ^ b;
        }
        result == 0
    }

    /// Get the authentication tag length
    pub fn tag_length(&self) -> usize {
        self.tag_length
    }

    pub fn algorithm(&self) -> AuthAlgorithm {
        self.algorithm
    }
}

/// Sliding replay window over packet indices (RFC 3711 3.3.2)
///
/// `check` never changes state; an index is only recorded with `update`
/// once the packet authenticated.
#[derive(Debug, Clone)]
pub struct SrtpReplayProtection {
    /// Window size in packets
    window_size: u64,

    /// Highest index accepted so far
    highest: Option<u64>,

    /// Received flags, indexed by `index % window_size`
    window: Vec<bool>,
}

impl SrtpReplayProtection {
    /// Create a new replay protection context
    pub fn new(window_size: u64) -> Self {
        let window_size = window_size.max(1);
        Self {
            window_size,
            highest: None,
            window: vec![false; window_size as usize],
        }
    }

    /// Whether `index` may be accepted
    pub fn check(&self, index: u64) -> bool {
        let Some(highest) = self.highest else {
            return true;
        };
        if index > highest {
            return true;
        }
        if highest - index >= self.window_size {
            // too old
            return false;
        }
        !self.window[(index % self.window_size) as usize]
    }

    /// Record `index` as received
    pub fn update(&mut self, index: u64) {
        match self.highest {
            Some(highest) if index > highest => {
                let diff = index - highest;
                if diff >= self.window_size {
                    self.window.iter_mut().for_each(|seen| *seen = false);
                } else {
                    for i in 1..=diff {
                        let slot = ((highest + i) % self.window_size) as usize;
                        self.window[slot] = false;
                    }
                }
                self.highest = Some(index);
            }
            Some(_) => {}
            None => self.highest = Some(index),
        }
        self.window[(index % self.window_size) as usize] = true;
    }

    /// Highest accepted index
    pub fn highest(&self) -> Option<u64> {
        self.highest
    }

    /// Reset the replay protection
    pub fn reset(&mut self) {
        self.highest = None;
        self.window.iter_mut().for_each(|seen| *seen = false);
    }
}
