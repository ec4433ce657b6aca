//! Media transport contracts
//!
//! A [`MediaTransport`] moves RTP and RTCP datagrams for one media stream.
//! Transports stack: the ZRTP adapter wraps a "slave" transport, sends
//! through it and installs itself as the slave's [`MediaSink`] so inbound
//! packets pass through the adapter before reaching the upstream consumer.
//!
//! All operations are synchronous and may be called from any thread.

use std::net::SocketAddr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::message::ZrtpMessage;
use crate::Result;

/// Consumer of inbound media
pub trait MediaSink: Send + Sync {
    /// An RTP packet (plaintext once it left the adapter)
    fn on_rtp(&self, packet: &[u8]);

    /// An RTCP packet
    fn on_rtcp(&self, packet: &[u8]);
}

/// Direction of a media stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaDirection {
    /// Outbound
    Encoding,
    /// Inbound
    Decoding,
    Both,
}

/// Trait for media transport implementations
pub trait MediaTransport: Send + Sync {
    /// Start delivering inbound packets to `sink`
    fn attach(
        &self,
        sink: Arc<dyn MediaSink>,
        remote_rtp: SocketAddr,
        remote_rtcp: Option<SocketAddr>,
    ) -> Result<()>;

    /// Stop delivering inbound packets
    fn detach(&self);

    /// Send an RTP packet to the attached remote
    fn send_rtp(&self, packet: &[u8]) -> Result<()>;

    /// Send an RTCP packet to the attached remote
    fn send_rtcp(&self, packet: &[u8]) -> Result<()>;

    /// Send an RTCP packet to an explicit address
    fn send_rtcp_to(&self, addr: SocketAddr, packet: &[u8]) -> Result<()>;

    /// Addresses and layer information
    fn info(&self) -> TransportInfo;

    /// The media stream stopped
    fn media_stop(&self) -> Result<()>;

    /// Drop a percentage of packets in `dir` (testing aid)
    fn simulate_lost(&self, dir: MediaDirection, pct_lost: u8) -> Result<()>;

    /// Release the transport; later calls fail
    fn close(&self) -> Result<()>;
}

/// ZRTP layer information added by the adapter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZrtpInfo {
    /// The handshake reached the secure state
    pub active: bool,
}

/// Transport information, reported from the bottom of the stack upwards
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportInfo {
    pub local_rtp: Option<SocketAddr>,
    pub local_rtcp: Option<SocketAddr>,
    pub remote_rtp: Option<SocketAddr>,
    pub remote_rtcp: Option<SocketAddr>,

    /// Present if a ZRTP adapter is part of the stack
    pub zrtp: Option<ZrtpInfo>,
}

/// Packet counters of a ZRTP adapter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZrtpStats {
    /// RTP packets protected and sent
    pub protected: u64,

    /// RTP packets unprotected and delivered
    pub unprotected: u64,

    pub rtcp_protected: u64,
    pub rtcp_unprotected: u64,

    /// Code of the last failed unprotect, 0 after a success
    pub last_unprotect_error: i32,
}

/// Receiver of user-facing ZRTP events
///
/// Every method has an empty default. Methods are called on the thread that
/// drove the engine (network receive, timer or sender) and must not block.
pub trait ZrtpObserver: Send + Sync {
    /// Informational, warning and error messages
    fn show_message(&self, _message: ZrtpMessage) {}

    /// Media is encrypted with `cipher`
    fn secure_on(&self, _cipher: &str) {}

    /// A direction stopped being encrypted
    fn secure_off(&self) {}

    /// Short authentication string to compare with the peer
    fn show_sas(&self, _sas: &str, _verified: bool) {}

    /// The peer asks to go back to clear media
    fn confirm_go_clear(&self) {}

    fn negotiation_failed(&self, _message: ZrtpMessage) {}

    /// The peer does not support ZRTP
    fn not_supported_by_other(&self) {}

    fn ask_enrollment(&self, _info: &str) {}

    fn inform_enrollment(&self, _info: &str) {}

    fn sign_sas(&self, _sas_hash: &[u8]) {}

    /// Verify the peer's SAS signature; unsigned SAS is rejected by default
    fn check_sas_signature(&self, _sas_hash: &[u8]) -> bool {
        false
    }
}
