//! Contract between the transport and a ZRTP handshake engine
//!
//! The handshake state machine (Hello/Commit/DHPart/Confirm sequencing,
//! retained secrets, SAS computation) lives behind [`ZrtpEngine`]. The
//! transport drives it and receives its requests through [`ZrtpCallbacks`].
//!
//! The engine is not required to be thread safe. The transport only calls
//! into it while holding its engine lock, and every callback is delivered
//! on the thread that made the call.

use std::fmt;
use std::path::Path;

use crate::message::ZrtpMessage;
use crate::srtp::{AuthAlgorithm, SymCipher};

/// ZRTP role negotiated during the Commit exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Initiator,
    Responder,
}

/// Which direction a secrets notification refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnableSecurity {
    /// Inbound direction
    ForReceiver,

    /// Outbound direction
    ForSender,
}

impl fmt::Display for EnableSecurity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnableSecurity::ForReceiver => write!(f, "receiver"),
            EnableSecurity::ForSender => write!(f, "sender"),
        }
    }
}

/// Negotiated SRTP keying material handed over by the engine
///
/// Keys and salts are raw bytes. The tag length is in bits as it appears in
/// the negotiated auth tag type (32, 64 or 80).
#[derive(Clone, PartialEq, Eq)]
pub struct SrtpSecrets {
    pub sym_cipher: SymCipher,
    pub init_key: Vec<u8>,
    pub init_salt: Vec<u8>,
    pub resp_key: Vec<u8>,
    pub resp_salt: Vec<u8>,
    pub auth_algorithm: AuthAlgorithm,
    pub auth_tag_bits: usize,
    pub role: Role,
}

impl fmt::Debug for SrtpSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SrtpSecrets")
            .field("sym_cipher", &self.sym_cipher)
            .field("key_len", &self.init_key.len())
            .field("auth_algorithm", &self.auth_algorithm)
            .field("auth_tag_bits", &self.auth_tag_bits)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

/// One half of the negotiated key material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyBlock {
    Initiator,
    Responder,
}

/// Select the key block a session uses
///
/// A sender protects with the keys of its own role, a receiver unprotects
/// with the keys of the peer's role. The initiator's sender session and the
/// responder's receiver session therefore share the initiator block, and
/// the other pair shares the responder block.
pub fn select_key_block(role: Role, part: EnableSecurity) -> KeyBlock {
    match (part, role) {
        (EnableSecurity::ForSender, Role::Initiator) => KeyBlock::Initiator,
        (EnableSecurity::ForSender, Role::Responder) => KeyBlock::Responder,
        (EnableSecurity::ForReceiver, Role::Initiator) => KeyBlock::Responder,
        (EnableSecurity::ForReceiver, Role::Responder) => KeyBlock::Initiator,
    }
}

impl SrtpSecrets {
    /// Master key and salt for `part`, following [`select_key_block`]
    pub fn key_material(&self, part: EnableSecurity) -> (&[u8], &[u8]) {
        match select_key_block(self.role, part) {
            KeyBlock::Initiator => (&self.init_key, &self.init_salt),
            KeyBlock::Responder => (&self.resp_key, &self.resp_salt),
        }
    }
}

/// Services the transport provides to the engine
///
/// Every method may be called re-entrantly from inside any [`ZrtpEngine`]
/// method.
pub trait ZrtpCallbacks {
    /// Frame and send a handshake message; `false` if nothing was sent
    fn send_data(&self, data: &[u8]) -> bool;

    /// Arm the single retransmission timer; replaces a pending one
    fn activate_timer(&self, time_ms: u32) -> bool;

    /// Cancel the pending retransmission timer
    fn cancel_timer(&self) -> bool;

    /// Informational, warning or severe message from the handshake
    fn send_info(&self, message: ZrtpMessage);

    /// Keys for `part` are ready; install the SRTP sessions
    fn srtp_secrets_ready(&self, secrets: &SrtpSecrets, part: EnableSecurity) -> bool;

    /// Tear down the SRTP sessions of `part`
    fn srtp_secrets_off(&self, part: EnableSecurity);

    /// Both directions are secure; `sas` may be empty
    fn srtp_secrets_on(&self, cipher: &str, sas: &str, verified: bool);

    /// Peer asked to switch back to clear mode
    fn handle_go_clear(&self);

    fn negotiation_failed(&self, message: ZrtpMessage);

    /// Peer never answered Hello with a ZRTP packet
    fn not_supported_by_other(&self);

    /// Enter the engine critical section
    fn synch_enter(&self);

    /// Leave the engine critical section
    fn synch_leave(&self);

    fn ask_enrollment(&self, info: &str);

    fn inform_enrollment(&self, info: &str);

    fn sign_sas(&self, sas_hash: &[u8]);

    fn check_sas_signature(&self, sas_hash: &[u8]) -> bool;
}

/// A ZRTP handshake state machine
///
/// Created by the caller and handed to the transport, which owns it until
/// the transport stops. Dropping the engine destroys it.
pub trait ZrtpEngine: Send {
    /// Bind the engine to its identity store and client identity
    fn initialize(
        &mut self,
        callbacks: &dyn ZrtpCallbacks,
        client_id: &str,
        zid_file: Option<&Path>,
        mitm_mode: bool,
    ) -> crate::Result<()>;

    /// Start the handshake (send Hello)
    fn start(&mut self, callbacks: &dyn ZrtpCallbacks);

    /// Stop the handshake and forget pending state
    fn stop(&mut self, callbacks: &dyn ZrtpCallbacks);

    /// The retransmission timer fired
    fn process_timeout(&mut self, callbacks: &dyn ZrtpCallbacks);

    /// A handshake message arrived from the peer with SSRC `peer_ssrc`
    fn process_message(&mut self, callbacks: &dyn ZrtpCallbacks, message: &[u8], peer_ssrc: u32);

    /// Whether the engine reached the secure state
    fn is_secure(&self) -> bool;

    /// Number of ZRTP protocol versions the engine supports
    fn supported_versions(&self) -> usize;

    /// `"<version> <hex hash>"` of the Hello message for version index `index`
    ///
    /// Empty if the engine has no Hello for that index.
    fn hello_hash(&self, index: usize) -> String;

    /// Peer's Hello hash received via signaling
    fn set_peer_hello_hash(&mut self, _hash: &str) -> bool {
        false
    }
}
