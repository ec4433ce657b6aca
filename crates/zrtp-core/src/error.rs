use std::io;
use thiserror::Error;

/// Error type for ZRTP transport operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// Packet or frame larger than the configured buffer
    #[error("Packet too large: {size} bytes exceeds maximum of {max}")]
    PacketTooLarge {
        size: usize,
        max: usize,
    },

    /// SRTP error
    #[error("SRTP error: {0}")]
    SrtpError(String),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The transport has already been closed
    #[error("Transport closed")]
    TransportClosed,

    /// The transport already has a media sink attached
    #[error("Transport already attached")]
    AlreadyAttached,

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(String),

    /// Handshake engine error
    #[error("ZRTP engine error: {0}")]
    Engine(String),

    /// Timer error
    #[error("Timer error: {0}")]
    Timer(String),

    /// IO error when sending/receiving packets
    #[error("IO error: {0}")]
    IoError(String),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::IoError(err.to_string())
    }
}

/// Reasons a received handshake frame is rejected
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame of {0} bytes is shorter than header and checksum")]
    Truncated(usize),

    #[error("first byte {0:#04x} is not a ZRTP marker")]
    NotZrtp(u8),

    #[error("checksum mismatch: computed {computed:#010x}, received {received:#010x}")]
    ChecksumMismatch {
        computed: u32,
        received: u32,
    },

    #[error("bad magic cookie {0:#010x}")]
    BadMagic(u32),

    #[error("frame of {size} bytes exceeds maximum of {max}")]
    Oversize {
        size: usize,
        max: usize,
    },
}

/// Distinguishable SRTP/SRTCP unprotect failures
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnprotectError {
    #[error("authentication tag mismatch")]
    AuthenticationFailed,

    #[error("replayed packet")]
    ReplayDetected,

    #[error("malformed packet")]
    Malformed,
}

impl UnprotectError {
    /// Numeric code kept as the transport's last unprotect error
    pub fn code(&self) -> i32 {
        match self {
            UnprotectError::AuthenticationFailed => -1,
            UnprotectError::ReplayDetected => -2,
            UnprotectError::Malformed => -3,
        }
    }
}
