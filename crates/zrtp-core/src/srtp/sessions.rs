//! The four directional crypto sessions of one transport

use tracing::debug;

use super::context::{SrtcpContext, SrtpContext};
use super::suite::SrtpSuite;
use crate::config::ZrtpConfig;
use crate::engine::{EnableSecurity, SrtpSecrets};
use crate::error::UnprotectError;
use crate::Result;

/// One of the four session slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionSlot {
    SendMedia,
    RecvMedia,
    SendControl,
    RecvControl,
}

/// Buffer and replay limits applied to every new session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLimits {
    pub replay_window: u64,
    pub max_rtp_len: usize,
    pub max_rtcp_len: usize,
}

impl From<&ZrtpConfig> for SessionLimits {
    fn from(config: &ZrtpConfig) -> Self {
        Self {
            replay_window: config.replay_window,
            max_rtp_len: config.max_rtp_buffer_len,
            max_rtcp_len: config.max_rtcp_buffer_len,
        }
    }
}

/// Send/receive media and control sessions
///
/// A slot is `None` while its direction is in the clear. Every operation
/// returns `None` for an empty slot so the caller can pass the packet
/// through, which keeps the presence check and the use in one borrow.
#[derive(Default)]
pub struct CryptoSessions {
    send_rtp: Option<SrtpContext>,
    recv_rtp: Option<SrtpContext>,
    send_rtcp: Option<SrtcpContext>,
    recv_rtcp: Option<SrtcpContext>,
}

impl CryptoSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive and install the media and control sessions of `part`
    ///
    /// `ssrc` is the stream the sessions protect: the local SSRC for the
    /// sender, the peer's for the receiver. Existing sessions of `part` are
    /// replaced only if both new sessions could be derived.
    pub fn install(
        &mut self,
        part: EnableSecurity,
        secrets: &SrtpSecrets,
        ssrc: u32,
        limits: &SessionLimits,
    ) -> Result<()> {
        let (master_key, master_salt) = secrets.key_material(part);
        let suite = SrtpSuite::lookup(
            secrets.sym_cipher,
            master_key.len(),
            secrets.auth_algorithm,
            secrets.auth_tag_bits,
        )?;

        let media = SrtpContext::new(
            ssrc,
            suite,
            master_key,
            master_salt,
            limits.replay_window,
            limits.max_rtp_len,
        )?;
        let control = SrtcpContext::new(
            ssrc,
            suite,
            master_key,
            master_salt,
            limits.replay_window,
            limits.max_rtcp_len,
        )?;

        debug!(
            "Installed SRTP {} sessions for SSRC {:08x} ({})",
            part, ssrc, suite
        );

        match part {
            EnableSecurity::ForSender => {
                self.send_rtp = Some(media);
                self.send_rtcp = Some(control);
            }
            EnableSecurity::ForReceiver => {
                self.recv_rtp = Some(media);
                self.recv_rtcp = Some(control);
            }
        }
        Ok(())
    }

    /// Drop the sessions of `part`; returns whether any existed
    pub fn teardown(&mut self, part: EnableSecurity) -> bool {
        let (media, control) = match part {
            EnableSecurity::ForSender => (self.send_rtp.take(), self.send_rtcp.take()),
            EnableSecurity::ForReceiver => (self.recv_rtp.take(), self.recv_rtcp.take()),
        };
        media.is_some() || control.is_some()
    }

    pub fn clear(&mut self) {
        self.teardown(EnableSecurity::ForSender);
        self.teardown(EnableSecurity::ForReceiver);
    }

    pub fn is_installed(&self, slot: SessionSlot) -> bool {
        match slot {
            SessionSlot::SendMedia => self.send_rtp.is_some(),
            SessionSlot::RecvMedia => self.recv_rtp.is_some(),
            SessionSlot::SendControl => self.send_rtcp.is_some(),
            SessionSlot::RecvControl => self.recv_rtcp.is_some(),
        }
    }

    /// Whether the media direction of `part` is secured
    pub fn is_secure(&self, part: EnableSecurity) -> bool {
        match part {
            EnableSecurity::ForSender => self.send_rtp.is_some(),
            EnableSecurity::ForReceiver => self.recv_rtp.is_some(),
        }
    }

    pub fn installed_count(&self) -> usize {
        [
            SessionSlot::SendMedia,
            SessionSlot::RecvMedia,
            SessionSlot::SendControl,
            SessionSlot::RecvControl,
        ]
        .iter()
        .filter(|slot| self.is_installed(**slot))
        .count()
    }

    pub fn send_media(&self) -> Option<&SrtpContext> {
        self.send_rtp.as_ref()
    }

    pub fn recv_media(&self) -> Option<&SrtpContext> {
        self.recv_rtp.as_ref()
    }

    pub fn protect_rtp(&mut self, packet: &mut Vec<u8>) -> Option<Result<usize>> {
        self.send_rtp.as_mut().map(|ctx| ctx.protect(packet))
    }

    pub fn unprotect_rtp(
        &mut self,
        packet: &mut Vec<u8>,
    ) -> Option<std::result::Result<usize, UnprotectError>> {
        self.recv_rtp.as_mut().map(|ctx| ctx.unprotect(packet))
    }

    pub fn protect_rtcp(&mut self, packet: &mut Vec<u8>) -> Option<Result<usize>> {
        self.send_rtcp.as_mut().map(|ctx| ctx.protect(packet))
    }

    pub fn unprotect_rtcp(
        &mut self,
        packet: &mut Vec<u8>,
    ) -> Option<std::result::Result<usize, UnprotectError>> {
        self.recv_rtcp.as_mut().map(|ctx| ctx.unprotect(packet))
    }
}
