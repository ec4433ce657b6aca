//! Configuration for ZRTP transports and the shared timer service

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::Result;

/// Length of the client identifier announced in Hello messages
pub const CLIENT_ID_LEN: usize = 16;

/// Default client identifier
pub const DEFAULT_CLIENT_ID: &str = "rvoip ZRTP      ";

/// Maximum size of a framed ZRTP message
pub const DEFAULT_MAX_ZRTP_SIZE: usize = 3072;

/// Maximum size of an outbound RTP packet including the SRTP tag
pub const DEFAULT_MAX_RTP_BUFFER_LEN: usize = 1500 + 64;

/// Maximum size of an outbound RTCP packet including index and tag
pub const DEFAULT_MAX_RTCP_BUFFER_LEN: usize = 1500 + 64;

/// Default SRTP replay window in packets
pub const DEFAULT_REPLAY_WINDOW: u64 = 128;

/// Default polling resolution of the timer thread
pub const DEFAULT_TIMER_TICK_MS: u64 = 10;

/// Timer service configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    /// Polling tick of the background timer thread, in milliseconds
    pub tick_ms: u64,
}

impl TimerConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            tick_ms: DEFAULT_TIMER_TICK_MS,
        }
    }
}

/// Per-transport ZRTP configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZrtpConfig {
    /// Client identifier passed to the handshake engine
    pub client_id: String,

    /// Identity store (ZID cache) file, if any
    pub zid_file: Option<PathBuf>,

    /// Start the handshake automatically on first media
    pub auto_start: bool,

    /// Run the engine in trusted MitM (PBX) mode
    pub mitm_mode: bool,

    /// Maximum size of a framed handshake message
    pub max_zrtp_size: usize,

    /// Maximum size of a protected RTP packet
    pub max_rtp_buffer_len: usize,

    /// Maximum size of a protected RTCP packet
    pub max_rtcp_buffer_len: usize,

    /// SRTP replay window in packets
    pub replay_window: u64,

    /// Timer service configuration
    pub timer: TimerConfig,
}

impl Default for ZrtpConfig {
    fn default() -> Self {
        Self {
            client_id: DEFAULT_CLIENT_ID.to_string(),
            zid_file: None,
            auto_start: true,
            mitm_mode: false,
            max_zrtp_size: DEFAULT_MAX_ZRTP_SIZE,
            max_rtp_buffer_len: DEFAULT_MAX_RTP_BUFFER_LEN,
            max_rtcp_buffer_len: DEFAULT_MAX_RTCP_BUFFER_LEN,
            replay_window: DEFAULT_REPLAY_WINDOW,
            timer: TimerConfig::default(),
        }
    }
}

impl ZrtpConfig {
    /// Set the client identifier; it is padded or truncated to 16 characters
    pub fn with_client_id(mut self, client_id: &str) -> Self {
        self.client_id = client_id.to_string();
        self
    }

    pub fn with_zid_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.zid_file = Some(path.into());
        self
    }

    pub fn with_auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    pub fn with_mitm_mode(mut self, mitm_mode: bool) -> Self {
        self.mitm_mode = mitm_mode;
        self
    }

    pub fn with_max_zrtp_size(mut self, size: usize) -> Self {
        self.max_zrtp_size = size;
        self
    }

    pub fn with_max_rtp_buffer_len(mut self, size: usize) -> Self {
        self.max_rtp_buffer_len = size;
        self
    }

    pub fn with_replay_window(mut self, window: u64) -> Self {
        self.replay_window = window;
        self
    }

    pub fn with_timer_tick(mut self, tick: Duration) -> Self {
        self.timer.tick_ms = tick.as_millis() as u64;
        self
    }

    /// The client identifier exactly as handed to the engine
    pub fn normalized_client_id(&self) -> String {
        let mut id: String = self.client_id.chars().take(CLIENT_ID_LEN).collect();
        while id.chars().count() < CLIENT_ID_LEN {
            id.push(' ');
        }
        id
    }

    /// Check the configuration for inconsistent values
    pub fn validate(&self) -> Result<()> {
        // header + crc
        let min_frame = crate::frame::ZRTP_HEADER_LEN + crate::frame::ZRTP_CRC_LEN;
        if self.max_zrtp_size <= min_frame {
            return Err(Error::Config(format!(
                "max_zrtp_size {} cannot hold a ZRTP header and checksum",
                self.max_zrtp_size
            )));
        }
        if self.max_rtp_buffer_len < crate::demux::RTP_HEADER_LEN {
            return Err(Error::Config(format!(
                "max_rtp_buffer_len {} is smaller than an RTP header",
                self.max_rtp_buffer_len
            )));
        }
        if self.max_rtcp_buffer_len < crate::srtp::RTCP_HEADER_LEN {
            return Err(Error::Config(format!(
                "max_rtcp_buffer_len {} is smaller than an RTCP header",
                self.max_rtcp_buffer_len
            )));
        }
        if !(64..=1024).contains(&self.replay_window) {
            return Err(Error::Config(format!(
                "replay_window {} outside 64..=1024",
                self.replay_window
            )));
        }
        if self.timer.tick_ms == 0 {
            return Err(Error::Config("timer tick must be non-zero".to_string()));
        }
        Ok(())
    }
}
