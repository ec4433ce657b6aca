//! ZRTP secure transport for the RVOIP project
//!
//! This crate wraps a media transport with ZRTP (RFC 6189): handshake
//! messages are multiplexed with RTP on the same socket, and once the
//! handshake engine has negotiated keys, media is protected with SRTP and
//! SRTCP (RFC 3711).
//!
//! The library is organized into several modules:
//!
//! - `zrtp_transport`: the adapter between a media stream and its slave transport
//! - `endpoint`: composition root owning the shared timer service
//! - `engine`: contract with the ZRTP handshake state machine
//! - `transport`: media transport, sink and observer traits
//! - `srtp`: SRTP/SRTCP crypto sessions
//! - `frame`, `checksum`, `demux`: ZRTP framing and packet classification
//! - `timer`: retransmission timer service
//! - `udp`: a tokio UDP media transport
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use rvoip_zrtp_core::prelude::*;
//! # fn engine() -> Box<dyn ZrtpEngine> { unimplemented!() }
//! # async fn run() -> Result<()> {
//! let endpoint = ZrtpEndpoint::new(ZrtpConfig::default())?;
//! let udp = Arc::new(UdpMediaTransport::bind(UdpTransportConfig::default()).await?);
//! let zrtp = endpoint.create_transport(udp, engine(), true)?;
//! for line in zrtp.zrtp_hash_attributes()? {
//!     println!("{}", line);
//! }
//! # Ok(())
//! # }
//! ```

mod error;

pub mod checksum;
pub mod config;
pub mod demux;
pub mod endpoint;
pub mod engine;
pub mod frame;
pub mod message;
pub mod sdp;
pub mod srtp;
pub mod sync;
pub mod timer;
pub mod transport;
pub mod udp;
pub mod zrtp_transport;

// Re-export core types
pub use error::{Error, FrameError, UnprotectError};

pub use config::{TimerConfig, ZrtpConfig};
pub use endpoint::ZrtpEndpoint;
pub use engine::{EnableSecurity, Role, SrtpSecrets, ZrtpCallbacks, ZrtpEngine};
pub use frame::ZrtpFrame;
pub use message::{InfoCode, SevereCode, Severity, WarningCode, ZrtpMessage};
pub use sdp::ZrtpHashAttribute;
pub use timer::{ManualClock, TimerService};
pub use transport::{
    MediaDirection, MediaSink, MediaTransport, TransportInfo, ZrtpInfo, ZrtpObserver, ZrtpStats,
};
pub use udp::{UdpMediaTransport, UdpTransportConfig};
pub use zrtp_transport::{SecurityState, ZrtpTransport};

/// Result type for ZRTP transport operations
pub type Result<T> = std::result::Result<T, Error>;

/// Prelude module with commonly used types
pub mod prelude {
    pub use crate::{
        EnableSecurity, Error, MediaSink, MediaTransport, Result, SecurityState, SrtpSecrets,
        ZrtpCallbacks, ZrtpConfig, ZrtpEndpoint, ZrtpEngine, ZrtpHashAttribute, ZrtpMessage,
        ZrtpObserver, ZrtpTransport,
    };

    pub use crate::udp::{UdpMediaTransport, UdpTransportConfig};
}
