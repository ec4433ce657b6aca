//! ZRTP secure-transport adapter
//!
//! [`ZrtpTransport`] sits between a media stream and its slave transport.
//! Inbound datagrams are split into ZRTP handshake frames, which feed the
//! handshake engine, and media, which is unprotected once the receive
//! direction is secured. Outbound media is protected once the send
//! direction is secured. Until then both directions pass through unchanged.
//!
//! Three kinds of threads drive an adapter: the slave's receive thread, the
//! shared timer thread and the callers of `send_rtp`/`send_rtcp`. Every call
//! into the engine is made while holding the adapter's [`EngineLock`];
//! callbacks from the engine arrive on the calling thread and may re-enter.

use std::net::SocketAddr;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU16, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace, warn};

use crate::config::ZrtpConfig;
use crate::demux::{classify, rtcp_ssrc, rtp_ssrc, PacketKind};
use crate::engine::{EnableSecurity, SrtpSecrets, ZrtpCallbacks, ZrtpEngine};
use crate::error::{Error, FrameError, UnprotectError};
use crate::frame::ZrtpFrame;
use crate::message::{WarningCode, ZrtpMessage};
use crate::sdp::ZrtpHashAttribute;
use crate::srtp::{CryptoSessions, SessionLimits, SessionSlot};
use crate::sync::EngineLock;
use crate::timer::{TimeoutHandler, TimerRegistration, TimerService};
use crate::transport::{
    MediaDirection, MediaSink, MediaTransport, TransportInfo, ZrtpInfo, ZrtpObserver, ZrtpStats,
};
use crate::Result;

/// Security state of an adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecurityState {
    /// Handshake not started, media in the clear
    Idle,
    /// Handshake running, media in the clear
    Negotiating,
    /// One direction is encrypted
    PartiallySecure,
    /// Both directions are encrypted
    Secure,
    /// ZRTP stopped; media passes through
    Stopped,
}

/// ZRTP adapter around a slave media transport
pub struct ZrtpTransport {
    inner: Arc<TransportInner>,
}

struct TransportInner {
    config: ZrtpConfig,
    limits: SessionLimits,
    slave: Arc<dyn MediaTransport>,
    close_slave: bool,

    engine_lock: EngineLock,
    engine: Mutex<Option<Box<dyn ZrtpEngine>>>,
    sessions: Mutex<CryptoSessions>,

    timer: Mutex<Option<TimerRegistration>>,
    /// Generation of the armed timeout, 0 if none
    armed_timer: AtomicU64,

    sink: RwLock<Option<Arc<dyn MediaSink>>>,
    observer: RwLock<Option<Arc<dyn ZrtpObserver>>>,

    enabled: AtomicBool,
    initialized: AtomicBool,
    started: AtomicBool,
    stopped: AtomicBool,
    closed: AtomicBool,
    /// Engine secure state, refreshed after every engine call
    secure: AtomicBool,
    mitm_mode: AtomicBool,

    local_ssrc: AtomicU32,
    peer_ssrc: AtomicU32,
    zrtp_sequence: AtomicU16,

    send_buffer: Mutex<Vec<u8>>,
    send_rtcp_buffer: Mutex<Vec<u8>>,
    zrtp_buffer: Mutex<Vec<u8>>,
    recv_buffer: Mutex<Vec<u8>>,
    recv_rtcp_buffer: Mutex<Vec<u8>>,

    protected: AtomicU64,
    unprotected: AtomicU64,
    rtcp_protected: AtomicU64,
    rtcp_unprotected: AtomicU64,
    last_unprotect_error: AtomicI32,
}

impl ZrtpTransport {
    /// Wrap `slave` with ZRTP
    ///
    /// The adapter takes ownership of `engine`, which is initialized when
    /// the handshake starts. With `close_slave` set, closing the adapter
    /// also closes the slave.
    pub fn new(
        slave: Arc<dyn MediaTransport>,
        engine: Box<dyn ZrtpEngine>,
        config: ZrtpConfig,
        timers: &Arc<TimerService>,
        close_slave: bool,
    ) -> Result<Self> {
        config.validate()?;

        let inner = Arc::new(TransportInner {
            limits: SessionLimits::from(&config),
            slave,
            close_slave,
            engine_lock: EngineLock::new(),
            engine: Mutex::new(Some(engine)),
            sessions: Mutex::new(CryptoSessions::new()),
            timer: Mutex::new(None),
            armed_timer: AtomicU64::new(0),
            sink: RwLock::new(None),
            observer: RwLock::new(None),
            enabled: AtomicBool::new(true),
            initialized: AtomicBool::new(false),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            secure: AtomicBool::new(false),
            mitm_mode: AtomicBool::new(config.mitm_mode),
            local_ssrc: AtomicU32::new(0),
            peer_ssrc: AtomicU32::new(0),
            zrtp_sequence: AtomicU16::new(rand::random::<u16>()),
            send_buffer: Mutex::new(Vec::with_capacity(config.max_rtp_buffer_len)),
            send_rtcp_buffer: Mutex::new(Vec::with_capacity(config.max_rtcp_buffer_len)),
            zrtp_buffer: Mutex::new(Vec::with_capacity(config.max_zrtp_size)),
            recv_buffer: Mutex::new(Vec::with_capacity(config.max_rtp_buffer_len)),
            recv_rtcp_buffer: Mutex::new(Vec::with_capacity(config.max_rtcp_buffer_len)),
            protected: AtomicU64::new(0),
            unprotected: AtomicU64::new(0),
            rtcp_protected: AtomicU64::new(0),
            rtcp_unprotected: AtomicU64::new(0),
            last_unprotect_error: AtomicI32::new(0),
            config,
        });

        let weak = Arc::downgrade(&inner);
        let handler: Weak<dyn TimeoutHandler> = weak;
        let registration = timers.register(handler)?;
        *inner.timer.lock() = Some(registration);

        debug!("Created ZRTP transport (client id {:?})", inner.config.client_id);
        Ok(Self { inner })
    }

    /// Start the handshake now instead of on first media
    pub fn start_zrtp(&self) -> Result<()> {
        self.inner.ensure_open("start_zrtp")?;
        self.inner.start()
    }

    /// Stop the handshake, drop all crypto sessions and release the engine
    ///
    /// Media passes through unchanged afterwards. Idempotent.
    pub fn stop_zrtp(&self) {
        self.inner.stop();
    }

    /// Enable or disable handshake processing and automatic start
    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    /// Select trusted MitM mode; only effective before the handshake starts
    pub fn set_mitm_mode(&self, mitm_mode: bool) {
        if self.inner.initialized.load(Ordering::SeqCst) {
            warn!("MitM mode change ignored, ZRTP engine already initialized");
            return;
        }
        self.inner.mitm_mode.store(mitm_mode, Ordering::SeqCst);
    }

    pub fn is_mitm_mode(&self) -> bool {
        self.inner.mitm_mode.load(Ordering::SeqCst)
    }

    /// Override the SSRC learned from outbound media
    pub fn set_local_ssrc(&self, ssrc: u32) {
        self.inner.local_ssrc.store(ssrc, Ordering::SeqCst);
    }

    pub fn local_ssrc(&self) -> u32 {
        self.inner.local_ssrc.load(Ordering::SeqCst)
    }

    pub fn peer_ssrc(&self) -> u32 {
        self.inner.peer_ssrc.load(Ordering::SeqCst)
    }

    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::SeqCst)
    }

    /// Whether the engine reached its secure state
    pub fn is_secure(&self) -> bool {
        self.inner.secure.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> SecurityState {
        self.inner.state()
    }

    pub fn stats(&self) -> ZrtpStats {
        self.inner.stats()
    }

    /// Install or remove the user observer
    pub fn set_observer(&self, observer: Option<Arc<dyn ZrtpObserver>>) {
        *self.inner.observer.write() = observer;
    }

    pub fn observer(&self) -> Option<Arc<dyn ZrtpObserver>> {
        self.inner.observer()
    }

    /// One `a=zrtp-hash` attribute per protocol version the engine supports
    pub fn zrtp_hash_attributes(&self) -> Result<Vec<ZrtpHashAttribute>> {
        self.inner.ensure_open("zrtp_hash_attributes")?;
        self.inner.initialize_engine()?;

        let hashes = self
            .inner
            .with_engine(|engine, _| {
                (0..engine.supported_versions())
                    .map(|index| engine.hello_hash(index))
                    .filter(|hash| !hash.is_empty())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        hashes.iter().map(|hash| hash.parse()).collect()
    }

    /// Append the `a=zrtp-hash` lines to an SDP attribute list
    pub fn encode_sdp(&self, attributes: &mut Vec<String>) -> Result<usize> {
        let hashes = self.zrtp_hash_attributes()?;
        let count = hashes.len();
        attributes.extend(hashes.iter().map(|hash| hash.to_string()));
        Ok(count)
    }

    /// Hand the peer's Hello hash from its SDP to the engine
    pub fn set_peer_zrtp_hash(&self, hash: &ZrtpHashAttribute) -> Result<bool> {
        self.inner.ensure_open("set_peer_zrtp_hash")?;
        self.inner.initialize_engine()?;
        let value = format!("{} {}", hash.version, hash.hash);
        Ok(self
            .inner
            .with_engine(|engine, _| engine.set_peer_hello_hash(&value))
            .unwrap_or(false))
    }
}

impl MediaTransport for ZrtpTransport {
    fn attach(
        &self,
        sink: Arc<dyn MediaSink>,
        remote_rtp: SocketAddr,
        remote_rtcp: Option<SocketAddr>,
    ) -> Result<()> {
        self.inner.ensure_open("attach")?;
        {
            let mut current = self.inner.sink.write();
            if current.is_some() {
                return Err(Error::AlreadyAttached);
            }
            *current = Some(sink);
        }

        let slave_sink = Arc::new(SlaveSink {
            adapter: Arc::downgrade(&self.inner),
        });
        if let Err(e) = self.inner.slave.attach(slave_sink, remote_rtp, remote_rtcp) {
            *self.inner.sink.write() = None;
            return Err(e);
        }
        debug!("ZRTP transport attached to {}", remote_rtp);
        Ok(())
    }

    fn detach(&self) {
        self.inner.detach();
    }

    fn send_rtp(&self, packet: &[u8]) -> Result<()> {
        self.inner.send_rtp(packet)
    }

    fn send_rtcp(&self, packet: &[u8]) -> Result<()> {
        self.inner.send_rtcp(None, packet)
    }

    fn send_rtcp_to(&self, addr: SocketAddr, packet: &[u8]) -> Result<()> {
        self.inner.send_rtcp(Some(addr), packet)
    }

    fn info(&self) -> TransportInfo {
        let mut info = self.inner.slave.info();
        info.zrtp = Some(ZrtpInfo {
            active: self.is_secure(),
        });
        info
    }

    fn media_stop(&self) -> Result<()> {
        self.inner.ensure_open("media_stop")?;
        self.inner.log_counters("Media stop");
        self.inner.slave.media_stop()
    }

    fn simulate_lost(&self, dir: MediaDirection, pct_lost: u8) -> Result<()> {
        self.inner.ensure_open("simulate_lost")?;
        self.inner.slave.simulate_lost(dir, pct_lost)
    }

    fn close(&self) -> Result<()> {
        self.inner.close()
    }
}

impl Drop for ZrtpTransport {
    fn drop(&mut self) {
        if let Err(e) = self.inner.close() {
            warn!("Error closing ZRTP transport: {}", e);
        }
    }
}

impl std::fmt::Debug for ZrtpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZrtpTransport")
            .field("state", &self.state())
            .field("local_ssrc", &self.local_ssrc())
            .field("peer_ssrc", &self.peer_ssrc())
            .finish_non_exhaustive()
    }
}

/// Sink installed on the slave; forwards into the adapter while it lives
struct SlaveSink {
    adapter: Weak<TransportInner>,
}

impl MediaSink for SlaveSink {
    fn on_rtp(&self, packet: &[u8]) {
        if let Some(adapter) = self.adapter.upgrade() {
            adapter.handle_rtp(packet);
        }
    }

    fn on_rtcp(&self, packet: &[u8]) {
        if let Some(adapter) = self.adapter.upgrade() {
            adapter.handle_rtcp(packet);
        }
    }
}

/// Packet buffer checked out of its slot while one packet is processed
///
/// The slot lock is held only to swap the buffer in and out, so a sink or
/// slave may re-enter the transport while the packet is in flight.
struct Scratch<'a> {
    slot: &'a Mutex<Vec<u8>>,
    buffer: Vec<u8>,
}

impl<'a> Scratch<'a> {
    fn take(slot: &'a Mutex<Vec<u8>>) -> Self {
        let buffer = std::mem::take(&mut *slot.lock());
        Self { slot, buffer }
    }
}

impl Deref for Scratch<'_> {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        &self.buffer
    }
}

impl DerefMut for Scratch<'_> {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buffer
    }
}

impl Drop for Scratch<'_> {
    fn drop(&mut self) {
        let mut slot = self.slot.lock();
        if slot.capacity() < self.buffer.capacity() {
            *slot = std::mem::take(&mut self.buffer);
        }
    }
}

impl TransportInner {
    fn ensure_open(&self, operation: &str) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            error!("{} called on a closed ZRTP transport", operation);
            return Err(Error::TransportClosed);
        }
        Ok(())
    }

    fn observer(&self) -> Option<Arc<dyn ZrtpObserver>> {
        self.observer.read().clone()
    }

    fn sink(&self) -> Option<Arc<dyn MediaSink>> {
        self.sink.read().clone()
    }

    fn notify(&self, message: ZrtpMessage) {
        if let Some(observer) = self.observer() {
            observer.show_message(message);
        }
    }

    /// Run `f` on the engine under the engine lock
    ///
    /// Returns `None` if the engine is gone or if this thread is already
    /// inside an engine call; the engine is not re-entrant.
    fn with_engine<R>(&self, f: impl FnOnce(&mut dyn ZrtpEngine, &dyn ZrtpCallbacks) -> R) -> Option<R> {
        let _guard = self.engine_lock.lock();
        let Some(mut slot) = self.engine.try_lock() else {
            debug!("Nested ZRTP engine call ignored");
            return None;
        };

        let result = {
            let engine = slot.as_mut()?;
            let result = f(&mut **engine, self);
            self.secure.store(engine.is_secure(), Ordering::SeqCst);
            result
        };

        // stopped from inside the call
        if self.stopped.load(Ordering::SeqCst) {
            if let Some(mut engine) = slot.take() {
                engine.stop(self);
            }
            self.secure.store(false, Ordering::SeqCst);
        }
        Some(result)
    }

    fn initialize_engine(&self) -> Result<()> {
        let _guard = self.engine_lock.lock();
        if self.initialized.load(Ordering::SeqCst) {
            return Ok(());
        }
        let client_id = self.config.normalized_client_id();
        let mitm_mode = self.mitm_mode.load(Ordering::SeqCst);
        let outcome = self.with_engine(|engine, callbacks| {
            engine.initialize(
                callbacks,
                &client_id,
                self.config.zid_file.as_deref(),
                mitm_mode,
            )
        });
        match outcome {
            Some(Ok(())) => {
                self.initialized.store(true, Ordering::SeqCst);
                debug!("ZRTP engine initialized (MitM mode: {})", mitm_mode);
                Ok(())
            }
            Some(Err(e)) => {
                error!("Failed to initialize ZRTP engine: {}", e);
                self.stop();
                Err(e)
            }
            None => Err(Error::Engine("ZRTP engine not available".to_string())),
        }
    }

    /// Start the handshake once; later calls are no-ops
    fn start(&self) -> Result<()> {
        let _guard = self.engine_lock.lock();
        if self.stopped.load(Ordering::SeqCst) {
            return Err(Error::Engine("ZRTP stopped".to_string()));
        }
        if self.started.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.initialize_engine()?;

        self.started.store(true, Ordering::SeqCst);
        if self.with_engine(|engine, callbacks| engine.start(callbacks)).is_none() {
            self.started.store(false, Ordering::SeqCst);
            return Err(Error::Engine("ZRTP engine not available".to_string()));
        }
        info!(
            "ZRTP started (local SSRC {:08x})",
            self.local_ssrc.load(Ordering::SeqCst)
        );
        Ok(())
    }

    fn auto_start(&self) {
        if self.started.load(Ordering::SeqCst)
            || self.stopped.load(Ordering::SeqCst)
            || !self.enabled.load(Ordering::SeqCst)
            || !self.config.auto_start
        {
            return;
        }
        if let Err(e) = self.start() {
            warn!("Automatic ZRTP start failed: {}", e);
        }
    }

    fn stop(&self) -> bool {
        let registration = {
            let _guard = self.engine_lock.lock();
            if self.stopped.swap(true, Ordering::SeqCst) {
                return false;
            }
            self.armed_timer.store(0, Ordering::SeqCst);

            match self.engine.try_lock() {
                Some(mut slot) => {
                    if let Some(mut engine) = slot.take() {
                        engine.stop(self);
                    }
                }
                None => debug!("ZRTP stop requested by the engine, releasing it after the call"),
            }

            self.sessions.lock().clear();
            self.secure.store(false, Ordering::SeqCst);

            let mut timer = self.timer.lock();
            if let Some(registration) = timer.as_ref() {
                registration.cancel();
            }
            // Releasing the last registration joins the timer thread, which
            // may be waiting for this lock. Nested stops keep it until drop.
            if self.engine_lock.depth() > 1 {
                None
            } else {
                timer.take()
            }
        };
        drop(registration);
        info!("ZRTP stopped");
        true
    }

    fn detach(&self) {
        if self.sink.write().take().is_some() {
            self.slave.detach();
            debug!("ZRTP transport detached");
        }
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.stop();
        self.detach();
        self.log_counters("Destroy");

        if self.close_slave {
            self.slave.close()?;
        }
        Ok(())
    }

    fn log_counters(&self, what: &str) {
        info!(
            "{} - encrypted packets: {}, decrypted packets: {}",
            what,
            self.protected.load(Ordering::Relaxed),
            self.unprotected.load(Ordering::Relaxed)
        );
    }

    fn state(&self) -> SecurityState {
        if self.stopped.load(Ordering::SeqCst) {
            return SecurityState::Stopped;
        }
        if !self.started.load(Ordering::SeqCst) {
            return SecurityState::Idle;
        }
        let sessions = self.sessions.lock();
        match (
            sessions.is_secure(EnableSecurity::ForSender),
            sessions.is_secure(EnableSecurity::ForReceiver),
        ) {
            (true, true) => SecurityState::Secure,
            (false, false) => SecurityState::Negotiating,
            _ => SecurityState::PartiallySecure,
        }
    }

    fn stats(&self) -> ZrtpStats {
        ZrtpStats {
            protected: self.protected.load(Ordering::Relaxed),
            unprotected: self.unprotected.load(Ordering::Relaxed),
            rtcp_protected: self.rtcp_protected.load(Ordering::Relaxed),
            rtcp_unprotected: self.rtcp_unprotected.load(Ordering::Relaxed),
            last_unprotect_error: self.last_unprotect_error.load(Ordering::Relaxed),
        }
    }

    fn send_rtp(&self, packet: &[u8]) -> Result<()> {
        self.ensure_open("send_rtp")?;

        if self.local_ssrc.load(Ordering::SeqCst) == 0 {
            if let Some(ssrc) = rtp_ssrc(packet) {
                let _ = self
                    .local_ssrc
                    .compare_exchange(0, ssrc, Ordering::SeqCst, Ordering::SeqCst);
            }
        }
        self.auto_start();

        let mut buffer = Scratch::take(&self.send_buffer);
        let protected = {
            let mut sessions = self.sessions.lock();
            if sessions.is_installed(SessionSlot::SendMedia) {
                if packet.len() > self.limits.max_rtp_len {
                    return Err(Error::PacketTooLarge {
                        size: packet.len(),
                        max: self.limits.max_rtp_len,
                    });
                }
                buffer.clear();
                buffer.extend_from_slice(packet);
                sessions.protect_rtp(&mut buffer).transpose()?
            } else {
                None
            }
        };

        match protected {
            Some(len) => {
                self.protected.fetch_add(1, Ordering::Relaxed);
                self.slave.send_rtp(&buffer[..len])
            }
            None => {
                drop(buffer);
                self.slave.send_rtp(packet)
            }
        }
    }

    fn send_rtcp(&self, addr: Option<SocketAddr>, packet: &[u8]) -> Result<()> {
        self.ensure_open("send_rtcp")?;

        let mut buffer = Scratch::take(&self.send_rtcp_buffer);
        let protected = {
            let mut sessions = self.sessions.lock();
            if sessions.is_installed(SessionSlot::SendControl) {
                if packet.len() > self.limits.max_rtcp_len {
                    return Err(Error::PacketTooLarge {
                        size: packet.len(),
                        max: self.limits.max_rtcp_len,
                    });
                }
                buffer.clear();
                buffer.extend_from_slice(packet);
                sessions.protect_rtcp(&mut buffer).transpose()?
            } else {
                None
            }
        };

        let data: &[u8] = match protected {
            Some(len) => {
                self.rtcp_protected.fetch_add(1, Ordering::Relaxed);
                &buffer[..len]
            }
            None => packet,
        };
        match addr {
            Some(addr) => self.slave.send_rtcp_to(addr, data),
            None => self.slave.send_rtcp(data),
        }
    }

    fn handle_rtp(&self, packet: &[u8]) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        match classify(packet) {
            PacketKind::Media => self.handle_media(packet),
            PacketKind::Zrtp => self.handle_zrtp(packet),
        }
    }

    fn handle_media(&self, packet: &[u8]) {
        if self.peer_ssrc.load(Ordering::SeqCst) == 0 {
            if let Some(ssrc) = rtp_ssrc(packet) {
                let _ = self
                    .peer_ssrc
                    .compare_exchange(0, ssrc, Ordering::SeqCst, Ordering::SeqCst);
            }
        }

        let mut buffer = Scratch::take(&self.recv_buffer);
        let outcome = {
            let mut sessions = self.sessions.lock();
            if !sessions.is_installed(SessionSlot::RecvMedia) {
                None
            } else if packet.len() > self.limits.max_rtp_len {
                Some(Err(UnprotectError::Malformed))
            } else {
                buffer.clear();
                buffer.extend_from_slice(packet);
                sessions.unprotect_rtp(&mut buffer)
            }
        };

        match outcome {
            None => self.deliver_rtp(packet),
            Some(Ok(len)) => {
                self.unprotected.fetch_add(1, Ordering::Relaxed);
                self.last_unprotect_error.store(0, Ordering::Relaxed);
                self.deliver_rtp(&buffer[..len]);
            }
            Some(Err(e)) => {
                drop(buffer);
                debug!("Dropping SRTP packet of {} bytes: {}", packet.len(), e);
                self.last_unprotect_error.store(e.code(), Ordering::Relaxed);
                let warning = match e {
                    UnprotectError::AuthenticationFailed => WarningCode::SrtpAuthError,
                    _ => WarningCode::SrtpReplayError,
                };
                self.notify(warning.into());
            }
        }

        self.auto_start();
    }

    fn deliver_rtp(&self, packet: &[u8]) {
        match self.sink() {
            Some(sink) => sink.on_rtp(packet),
            None => trace!("No sink attached, dropping RTP packet"),
        }
    }

    fn handle_zrtp(&self, packet: &[u8]) {
        if !self.enabled.load(Ordering::SeqCst) || self.stopped.load(Ordering::SeqCst) {
            trace!("ZRTP processing disabled, dropping {} byte frame", packet.len());
            return;
        }

        let frame = match ZrtpFrame::decode(packet, self.config.max_zrtp_size) {
            Ok(frame) => frame,
            Err(FrameError::ChecksumMismatch { computed, received }) => {
                debug!(
                    "ZRTP CRC mismatch: computed {:08x}, received {:08x}",
                    computed, received
                );
                self.notify(WarningCode::CrcMismatch.into());
                return;
            }
            Err(e) => {
                debug!("Dropping ZRTP packet: {}", e);
                return;
            }
        };

        if let Err(e) = self.start() {
            debug!("Cannot process ZRTP message: {}", e);
            return;
        }
        self.peer_ssrc.store(frame.ssrc, Ordering::SeqCst);
        trace!(
            "ZRTP message seq {} from SSRC {:08x}, {} bytes",
            frame.sequence,
            frame.ssrc,
            frame.payload.len()
        );
        self.with_engine(|engine, callbacks| {
            engine.process_message(callbacks, frame.payload, frame.ssrc)
        });
    }

    fn handle_rtcp(&self, packet: &[u8]) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }

        let mut buffer = Scratch::take(&self.recv_rtcp_buffer);
        let outcome = {
            let mut sessions = self.sessions.lock();
            if !sessions.is_installed(SessionSlot::RecvControl) {
                None
            } else if packet.len() > self.limits.max_rtcp_len {
                Some(Err(UnprotectError::Malformed))
            } else {
                buffer.clear();
                buffer.extend_from_slice(packet);
                sessions.unprotect_rtcp(&mut buffer)
            }
        };

        let data: &[u8] = match outcome {
            None => packet,
            Some(Ok(len)) => {
                self.rtcp_unprotected.fetch_add(1, Ordering::Relaxed);
                &buffer[..len]
            }
            Some(Err(e)) => {
                debug!(
                    "Dropping SRTCP packet from SSRC {:08x}: {}",
                    rtcp_ssrc(packet).unwrap_or_default(),
                    e
                );
                return;
            }
        };
        match self.sink() {
            Some(sink) => sink.on_rtcp(data),
            None => trace!("No sink attached, dropping RTCP packet"),
        }
    }
}

impl TimeoutHandler for TransportInner {
    fn on_timeout(&self, generation: u64) {
        let _guard = self.engine_lock.lock();
        if self
            .armed_timer
            .compare_exchange(generation, 0, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            trace!("Ignoring stale ZRTP timeout {}", generation);
            return;
        }
        self.with_engine(|engine, callbacks| engine.process_timeout(callbacks));
    }
}

impl ZrtpCallbacks for TransportInner {
    fn send_data(&self, data: &[u8]) -> bool {
        let sequence = self.zrtp_sequence.fetch_add(1, Ordering::SeqCst);
        let ssrc = self.local_ssrc.load(Ordering::SeqCst);

        let mut buffer = Scratch::take(&self.zrtp_buffer);
        let len = match ZrtpFrame::new(sequence, ssrc, data).encode_into(&mut buffer, self.config.max_zrtp_size) {
            Ok(len) => len,
            Err(e) => {
                warn!("Cannot frame ZRTP message: {}", e);
                return false;
            }
        };
        match self.slave.send_rtp(&buffer[..len]) {
            Ok(()) => true,
            Err(e) => {
                debug!("Failed to send ZRTP message: {}", e);
                false
            }
        }
    }

    fn activate_timer(&self, time_ms: u32) -> bool {
        if self.stopped.load(Ordering::SeqCst) {
            return false;
        }
        let timer = self.timer.lock();
        match timer.as_ref() {
            Some(registration) => {
                let generation = registration.activate(Duration::from_millis(u64::from(time_ms)));
                self.armed_timer.store(generation, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    fn cancel_timer(&self) -> bool {
        self.armed_timer.store(0, Ordering::SeqCst);
        let timer = self.timer.lock();
        match timer.as_ref() {
            Some(registration) => {
                registration.cancel();
                true
            }
            None => false,
        }
    }

    fn send_info(&self, message: ZrtpMessage) {
        self.notify(message);
    }

    fn srtp_secrets_ready(&self, secrets: &SrtpSecrets, part: EnableSecurity) -> bool {
        let ssrc = match part {
            EnableSecurity::ForSender => self.local_ssrc.load(Ordering::SeqCst),
            EnableSecurity::ForReceiver => self.peer_ssrc.load(Ordering::SeqCst),
        };
        match self.sessions.lock().install(part, secrets, ssrc, &self.limits) {
            Ok(()) => true,
            Err(e) => {
                warn!("Cannot create SRTP {} sessions: {}", part, e);
                false
            }
        }
    }

    fn srtp_secrets_off(&self, part: EnableSecurity) {
        if self.sessions.lock().teardown(part) {
            debug!("Removed SRTP {} sessions", part);
        }
        if let Some(observer) = self.observer() {
            observer.secure_off();
        }
    }

    fn srtp_secrets_on(&self, cipher: &str, sas: &str, verified: bool) {
        if let Some(observer) = self.observer() {
            observer.secure_on(cipher);
            if !sas.is_empty() {
                observer.show_sas(sas, verified);
            }
        }
    }

    fn handle_go_clear(&self) {
        if let Some(observer) = self.observer() {
            observer.confirm_go_clear();
        }
    }

    fn negotiation_failed(&self, message: ZrtpMessage) {
        warn!("ZRTP negotiation failed: {}", message);
        if let Some(observer) = self.observer() {
            observer.negotiation_failed(message);
        }
    }

    fn not_supported_by_other(&self) {
        info!("Peer does not support ZRTP");
        if let Some(observer) = self.observer() {
            observer.not_supported_by_other();
        }
    }

    fn synch_enter(&self) {
        self.engine_lock.enter();
    }

    fn synch_leave(&self) {
        if !self.engine_lock.leave() {
            warn!("ZRTP engine left a critical section it did not enter");
        }
    }

    fn ask_enrollment(&self, info: &str) {
        if let Some(observer) = self.observer() {
            observer.ask_enrollment(info);
        }
    }

    fn inform_enrollment(&self, info: &str) {
        if let Some(observer) = self.observer() {
            observer.inform_enrollment(info);
        }
    }

    fn sign_sas(&self, sas_hash: &[u8]) {
        if let Some(observer) = self.observer() {
            observer.sign_sas(sas_hash);
        }
    }

    fn check_sas_signature(&self, sas_hash: &[u8]) -> bool {
        self.observer()
            .map(|observer| observer.check_sas_signature(sas_hash))
            .unwrap_or(false)
    }
}
