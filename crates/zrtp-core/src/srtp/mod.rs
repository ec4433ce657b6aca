//! Secure RTP (SRTP) implementation
//!
//! This module provides encryption and authentication for RTP/RTCP packets
//! with keys negotiated by ZRTP.

pub mod auth;
pub mod cipher;
pub mod context;
pub mod kdf;
pub mod sessions;
pub mod suite;

pub use auth::{SrtpAuthenticator, SrtpReplayProtection};
pub use context::{rtp_header_len, SrtcpContext, SrtpContext, RTCP_HEADER_LEN, SRTCP_INDEX_LEN};
pub use kdf::KeyDerivationLabel;
pub use sessions::{CryptoSessions, SessionLimits, SessionSlot};
pub use suite::{AuthAlgorithm, SrtpSuite, SymCipher, CIPHER_TABLE, MAC_TABLE};
