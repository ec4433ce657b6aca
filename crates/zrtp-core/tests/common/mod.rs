//! Shared fixtures: scripted engine, in-memory slave transport, recorders

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use rvoip_zrtp_core::config::ZrtpConfig;
use rvoip_zrtp_core::engine::{EnableSecurity, Role, SrtpSecrets, ZrtpCallbacks, ZrtpEngine};
use rvoip_zrtp_core::message::ZrtpMessage;
use rvoip_zrtp_core::srtp::{AuthAlgorithm, SymCipher};
use rvoip_zrtp_core::timer::{ManualClock, TimerService};
use rvoip_zrtp_core::transport::{
    MediaDirection, MediaSink, MediaTransport, TransportInfo, ZrtpObserver,
};
use rvoip_zrtp_core::{Error, Result, ZrtpEndpoint, ZrtpTransport};

pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn remote() -> SocketAddr {
    "127.0.0.1:40000".parse().unwrap()
}

/// RTP v2 packet with a payload
pub fn rtp_packet(seq: u16, ssrc: u32, payload: &[u8]) -> Vec<u8> {
    let mut packet = vec![0x80, 0x00];
    packet.extend_from_slice(&seq.to_be_bytes());
    packet.extend_from_slice(&(u32::from(seq) * 160).to_be_bytes());
    packet.extend_from_slice(&ssrc.to_be_bytes());
    packet.extend_from_slice(payload);
    packet
}

/// Minimal RTCP receiver report
pub fn rtcp_packet(ssrc: u32) -> Vec<u8> {
    let mut packet = vec![0x80, 201, 0x00, 0x01];
    packet.extend_from_slice(&ssrc.to_be_bytes());
    packet
}

pub fn secrets(role: Role) -> SrtpSecrets {
    SrtpSecrets {
        sym_cipher: SymCipher::Aes,
        init_key: (0u8..16).collect(),
        init_salt: (100u8..114).collect(),
        resp_key: (16u8..32).collect(),
        resp_salt: (200u8..214).collect(),
        auth_algorithm: AuthAlgorithm::HmacSha1,
        auth_tag_bits: 80,
        role,
    }
}

/// Calls a scripted engine makes against its callbacks
pub type Hook = Box<dyn FnMut(&dyn ZrtpCallbacks, &[u8]) + Send>;

/// What a [`MockEngine`] observed
#[derive(Default)]
pub struct EngineLog {
    pub initialized: Mutex<Option<(String, Option<PathBuf>, bool)>>,
    pub started: AtomicUsize,
    pub stopped: AtomicUsize,
    pub timeouts: AtomicUsize,
    pub messages: Mutex<Vec<(Vec<u8>, u32)>>,
    pub secure: AtomicBool,
    pub peer_hello_hash: Mutex<Option<String>>,
    pub dropped: AtomicBool,
}

impl EngineLog {
    pub fn message_count(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn timeout_count(&self) -> usize {
        self.timeouts.load(Ordering::SeqCst)
    }
}

/// Engine stand-in whose reactions are supplied by the test
pub struct MockEngine {
    pub log: Arc<EngineLog>,
    pub hello_hashes: Vec<String>,
    pub fail_initialize: bool,
    pub on_start: Option<Hook>,
    pub on_message: Option<Hook>,
    pub on_timeout: Option<Hook>,
}

impl MockEngine {
    pub fn new() -> (Self, Arc<EngineLog>) {
        let log = Arc::new(EngineLog::default());
        let engine = Self {
            log: Arc::clone(&log),
            hello_hashes: Vec::new(),
            fail_initialize: false,
            on_start: None,
            on_message: None,
            on_timeout: None,
        };
        (engine, log)
    }

    pub fn on_start(mut self, hook: impl FnMut(&dyn ZrtpCallbacks, &[u8]) + Send + 'static) -> Self {
        self.on_start = Some(Box::new(hook));
        self
    }

    pub fn on_message(mut self, hook: impl FnMut(&dyn ZrtpCallbacks, &[u8]) + Send + 'static) -> Self {
        self.on_message = Some(Box::new(hook));
        self
    }

    pub fn on_timeout(mut self, hook: impl FnMut(&dyn ZrtpCallbacks, &[u8]) + Send + 'static) -> Self {
        self.on_timeout = Some(Box::new(hook));
        self
    }
}

impl ZrtpEngine for MockEngine {
    fn initialize(
        &mut self,
        _callbacks: &dyn ZrtpCallbacks,
        client_id: &str,
        zid_file: Option<&std::path::Path>,
        mitm_mode: bool,
    ) -> Result<()> {
        if self.fail_initialize {
            return Err(Error::Engine("cannot open ZID file".to_string()));
        }
        *self.log.initialized.lock() =
            Some((client_id.to_string(), zid_file.map(PathBuf::from), mitm_mode));
        Ok(())
    }

    fn start(&mut self, callbacks: &dyn ZrtpCallbacks) {
        self.log.started.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = self.on_start.as_mut() {
            hook(callbacks, &[]);
        }
    }

    fn stop(&mut self, callbacks: &dyn ZrtpCallbacks) {
        self.log.stopped.fetch_add(1, Ordering::SeqCst);
        callbacks.cancel_timer();
    }

    fn process_timeout(&mut self, callbacks: &dyn ZrtpCallbacks) {
        self.log.timeouts.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = self.on_timeout.as_mut() {
            hook(callbacks, &[]);
        }
    }

    fn process_message(&mut self, callbacks: &dyn ZrtpCallbacks, message: &[u8], peer_ssrc: u32) {
        self.log.messages.lock().push((message.to_vec(), peer_ssrc));
        if let Some(hook) = self.on_message.as_mut() {
            hook(callbacks, message);
        }
    }

    fn is_secure(&self) -> bool {
        self.log.secure.load(Ordering::SeqCst)
    }

    fn supported_versions(&self) -> usize {
        self.hello_hashes.len()
    }

    fn hello_hash(&self, index: usize) -> String {
        self.hello_hashes.get(index).cloned().unwrap_or_default()
    }

    fn set_peer_hello_hash(&mut self, hash: &str) -> bool {
        *self.log.peer_hello_hash.lock() = Some(hash.to_string());
        true
    }
}

impl Drop for MockEngine {
    fn drop(&mut self) {
        self.log.dropped.store(true, Ordering::SeqCst);
    }
}

/// In-memory slave transport; the test moves packets by hand
#[derive(Default)]
pub struct MockSlave {
    sink: Mutex<Option<Arc<dyn MediaSink>>>,
    pub sent_rtp: Mutex<Vec<Vec<u8>>>,
    pub sent_rtcp: Mutex<Vec<(Option<SocketAddr>, Vec<u8>)>>,
    pub attach_count: AtomicUsize,
    pub media_stopped: AtomicUsize,
    pub closed: AtomicBool,
    pub lost: Mutex<Vec<(MediaDirection, u8)>>,
}

impl MockSlave {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Hand an inbound RTP-channel datagram to the attached sink
    pub fn deliver_rtp(&self, packet: &[u8]) {
        let sink = self.sink.lock().clone();
        if let Some(sink) = sink {
            sink.on_rtp(packet);
        }
    }

    pub fn deliver_rtcp(&self, packet: &[u8]) {
        let sink = self.sink.lock().clone();
        if let Some(sink) = sink {
            sink.on_rtcp(packet);
        }
    }

    pub fn take_rtp(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *self.sent_rtp.lock())
    }

    pub fn take_rtcp(&self) -> Vec<(Option<SocketAddr>, Vec<u8>)> {
        std::mem::take(&mut *self.sent_rtcp.lock())
    }

    pub fn is_attached(&self) -> bool {
        self.sink.lock().is_some()
    }
}

impl MediaTransport for MockSlave {
    fn attach(
        &self,
        sink: Arc<dyn MediaSink>,
        _remote_rtp: SocketAddr,
        _remote_rtcp: Option<SocketAddr>,
    ) -> Result<()> {
        self.attach_count.fetch_add(1, Ordering::SeqCst);
        *self.sink.lock() = Some(sink);
        Ok(())
    }

    fn detach(&self) {
        *self.sink.lock() = None;
    }

    fn send_rtp(&self, packet: &[u8]) -> Result<()> {
        self.sent_rtp.lock().push(packet.to_vec());
        Ok(())
    }

    fn send_rtcp(&self, packet: &[u8]) -> Result<()> {
        self.sent_rtcp.lock().push((None, packet.to_vec()));
        Ok(())
    }

    fn send_rtcp_to(&self, addr: SocketAddr, packet: &[u8]) -> Result<()> {
        self.sent_rtcp.lock().push((Some(addr), packet.to_vec()));
        Ok(())
    }

    fn info(&self) -> TransportInfo {
        TransportInfo {
            remote_rtp: Some(remote()),
            ..Default::default()
        }
    }

    fn media_stop(&self) -> Result<()> {
        self.media_stopped.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn simulate_lost(&self, dir: MediaDirection, pct_lost: u8) -> Result<()> {
        self.lost.lock().push((dir, pct_lost));
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Upstream sink recording what the adapter delivered
#[derive(Default)]
pub struct RecordingSink {
    pub rtp: Mutex<Vec<Vec<u8>>>,
    pub rtcp: Mutex<Vec<Vec<u8>>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn rtp(&self) -> Vec<Vec<u8>> {
        self.rtp.lock().clone()
    }

    pub fn rtcp(&self) -> Vec<Vec<u8>> {
        self.rtcp.lock().clone()
    }
}

impl MediaSink for RecordingSink {
    fn on_rtp(&self, packet: &[u8]) {
        self.rtp.lock().push(packet.to_vec());
    }

    fn on_rtcp(&self, packet: &[u8]) {
        self.rtcp.lock().push(packet.to_vec());
    }
}

/// Observer recording every event
#[derive(Default)]
pub struct RecordingObserver {
    pub messages: Mutex<Vec<ZrtpMessage>>,
    pub secure_on: Mutex<Vec<String>>,
    pub secure_off: AtomicUsize,
    pub sas: Mutex<Vec<(String, bool)>>,
    pub failures: Mutex<Vec<ZrtpMessage>>,
    pub go_clear: AtomicUsize,
    pub not_supported: AtomicUsize,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn messages(&self) -> Vec<ZrtpMessage> {
        self.messages.lock().clone()
    }
}

impl ZrtpObserver for RecordingObserver {
    fn show_message(&self, message: ZrtpMessage) {
        self.messages.lock().push(message);
    }

    fn secure_on(&self, cipher: &str) {
        self.secure_on.lock().push(cipher.to_string());
    }

    fn secure_off(&self) {
        self.secure_off.fetch_add(1, Ordering::SeqCst);
    }

    fn show_sas(&self, sas: &str, verified: bool) {
        self.sas.lock().push((sas.to_string(), verified));
    }

    fn confirm_go_clear(&self) {
        self.go_clear.fetch_add(1, Ordering::SeqCst);
    }

    fn negotiation_failed(&self, message: ZrtpMessage) {
        self.failures.lock().push(message);
    }

    fn not_supported_by_other(&self) {
        self.not_supported.fetch_add(1, Ordering::SeqCst);
    }
}

/// One adapter over a mock slave, driven by a manual clock
pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub timers: Arc<TimerService>,
    pub endpoint: ZrtpEndpoint,
    pub slave: Arc<MockSlave>,
    pub sink: Arc<RecordingSink>,
    pub observer: Arc<RecordingObserver>,
    pub transport: ZrtpTransport,
}

impl Harness {
    pub fn new(engine: MockEngine) -> Self {
        Self::with_config(engine, ZrtpConfig::default())
    }

    pub fn with_config(engine: MockEngine, config: ZrtpConfig) -> Self {
        init_test_logging();
        let clock = Arc::new(ManualClock::new());
        let timers = TimerService::manual(clock.clone());
        let endpoint = ZrtpEndpoint::with_timer_service(config, Arc::clone(&timers)).unwrap();
        Self::on_endpoint(clock, timers, endpoint, engine)
    }

    /// A second adapter sharing this harness' endpoint and clock
    pub fn peer(&self, engine: MockEngine) -> Self {
        let endpoint =
            ZrtpEndpoint::with_timer_service(self.endpoint.config().clone(), Arc::clone(&self.timers))
                .unwrap();
        Self::on_endpoint(Arc::clone(&self.clock), Arc::clone(&self.timers), endpoint, engine)
    }

    fn on_endpoint(
        clock: Arc<ManualClock>,
        timers: Arc<TimerService>,
        endpoint: ZrtpEndpoint,
        engine: MockEngine,
    ) -> Self {
        let slave = MockSlave::new();
        let transport = endpoint
            .create_transport(slave.clone(), Box::new(engine), false)
            .unwrap();
        let sink = RecordingSink::new();
        let observer = RecordingObserver::new();
        transport.set_observer(Some(observer.clone()));
        transport.attach(sink.clone(), remote(), None).unwrap();

        Self {
            clock,
            timers,
            endpoint,
            slave,
            sink,
            observer,
            transport,
        }
    }
}

/// Move queued datagrams between two harnesses until both queues are empty
pub fn pump(a: &Harness, b: &Harness) {
    for _ in 0..32 {
        let from_a = a.slave.take_rtp();
        let from_b = b.slave.take_rtp();
        if from_a.is_empty() && from_b.is_empty() {
            return;
        }
        for packet in from_a {
            b.slave.deliver_rtp(&packet);
        }
        for packet in from_b {
            a.slave.deliver_rtp(&packet);
        }
    }
    panic!("handshake did not settle");
}

/// Engines for a minimal two-message handshake
///
/// The initiator sends `Hello` on start, the responder installs its keys
/// and answers `Confirm`, on which the initiator installs its keys.
pub fn handshake_engines() -> ((MockEngine, Arc<EngineLog>), (MockEngine, Arc<EngineLog>)) {
    let (initiator, initiator_log) = MockEngine::new();
    let (responder, responder_log) = MockEngine::new();

    let log = Arc::clone(&initiator_log);
    let initiator = initiator
        .on_start(|callbacks, _| {
            callbacks.send_data(b"Hello   ");
        })
        .on_message(move |callbacks, message| {
            if message == b"Confirm " {
                let secrets = secrets(Role::Initiator);
                assert!(callbacks.srtp_secrets_ready(&secrets, EnableSecurity::ForSender));
                assert!(callbacks.srtp_secrets_ready(&secrets, EnableSecurity::ForReceiver));
                callbacks.srtp_secrets_on("AES-CM-128/HMAC-SHA1-80", "ab3x", false);
                log.secure.store(true, Ordering::SeqCst);
            }
        });

    let log = Arc::clone(&responder_log);
    let responder = responder.on_message(move |callbacks, message| {
        if message == b"Hello   " {
            let secrets = secrets(Role::Responder);
            assert!(callbacks.srtp_secrets_ready(&secrets, EnableSecurity::ForSender));
            assert!(callbacks.srtp_secrets_ready(&secrets, EnableSecurity::ForReceiver));
            callbacks.srtp_secrets_on("AES-CM-128/HMAC-SHA1-80", "ab3x", false);
            log.secure.store(true, Ordering::SeqCst);
            callbacks.send_data(b"Confirm ");
        }
    });

    ((initiator, initiator_log), (responder, responder_log))
}
