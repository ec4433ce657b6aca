//! UDP media transport
//!
//! A plain RTP/RTCP transport on tokio UDP sockets, usable as the slave of a
//! [`ZrtpTransport`](crate::ZrtpTransport). Receiving runs in tokio tasks
//! that queue every datagram for a blocking consumer, which calls the
//! attached [`MediaSink`]; a sink may block without stalling the runtime.
//! Sending never blocks and fails if the socket is not writable.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use rand::Rng;
use tokio::net::UdpSocket;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::error::Error;
use crate::transport::{MediaDirection, MediaSink, MediaTransport, TransportInfo};
use crate::Result;

/// The default maximum size for received datagrams in bytes
pub const DEFAULT_MAX_DATAGRAM_SIZE: usize = 2048;

/// Datagrams queued between the receiver tasks and the sink consumer
const SINK_QUEUE_DEPTH: usize = 256;

/// UDP transport configuration
#[derive(Debug, Clone)]
pub struct UdpTransportConfig {
    /// Local address for RTP
    pub local_rtp_addr: SocketAddr,

    /// Local address for RTCP; RTCP is multiplexed on the RTP socket if unset
    pub local_rtcp_addr: Option<SocketAddr>,

    /// Receive buffer size
    pub max_datagram_size: usize,
}

impl Default for UdpTransportConfig {
    fn default() -> Self {
        Self {
            local_rtp_addr: SocketAddr::from(([0, 0, 0, 0], 0)),
            local_rtcp_addr: None,
            max_datagram_size: DEFAULT_MAX_DATAGRAM_SIZE,
        }
    }
}

enum Inbound {
    Rtp(Bytes),
    Rtcp(Bytes),
}

#[derive(Debug, Clone, Copy)]
struct Remote {
    rtp: SocketAddr,
    rtcp: Option<SocketAddr>,
}

/// UDP transport for RTP/RTCP
pub struct UdpMediaTransport {
    /// RTP socket
    rtp_socket: Arc<UdpSocket>,

    /// RTCP socket (if separate from RTP)
    rtcp_socket: Option<Arc<UdpSocket>>,

    config: UdpTransportConfig,

    /// Runtime the receiver tasks are spawned on
    runtime: Handle,

    remote: Mutex<Option<Remote>>,

    /// Receiver tasks and the sink consumer
    receiver_tasks: Mutex<Vec<JoinHandle<()>>>,

    /// Simulated loss in percent, per direction
    send_loss: Arc<AtomicU8>,
    recv_loss: Arc<AtomicU8>,

    closed: AtomicBool,
}

impl UdpMediaTransport {
    /// Bind the sockets; must be called inside a tokio runtime
    pub async fn bind(config: UdpTransportConfig) -> Result<Self> {
        let rtp_socket = UdpSocket::bind(config.local_rtp_addr)
            .await
            .map_err(|e| Error::Transport(format!("Failed to bind RTP socket: {}", e)))?;

        let rtcp_socket = match config.local_rtcp_addr {
            Some(addr) => {
                let socket = UdpSocket::bind(addr)
                    .await
                    .map_err(|e| Error::Transport(format!("Failed to bind RTCP socket: {}", e)))?;
                Some(Arc::new(socket))
            }
            None => None,
        };

        let transport = Self {
            rtp_socket: Arc::new(rtp_socket),
            rtcp_socket,
            config,
            runtime: Handle::current(),
            remote: Mutex::new(None),
            receiver_tasks: Mutex::new(Vec::new()),
            send_loss: Arc::new(AtomicU8::new(0)),
            recv_loss: Arc::new(AtomicU8::new(0)),
            closed: AtomicBool::new(false),
        };
        debug!("Bound UDP media transport on {:?}", transport.local_rtp_addr());
        Ok(transport)
    }

    pub fn local_rtp_addr(&self) -> Result<SocketAddr> {
        self.rtp_socket
            .local_addr()
            .map_err(|e| Error::Transport(format!("Failed to get local RTP address: {}", e)))
    }

    pub fn local_rtcp_addr(&self) -> Result<SocketAddr> {
        match &self.rtcp_socket {
            Some(socket) => socket
                .local_addr()
                .map_err(|e| Error::Transport(format!("Failed to get local RTCP address: {}", e))),
            None => self.local_rtp_addr(),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::TransportClosed);
        }
        Ok(())
    }

    fn spawn_receiver(
        &self,
        socket: Arc<UdpSocket>,
        queue: mpsc::Sender<Inbound>,
        rtcp_only: bool,
    ) -> JoinHandle<()> {
        let loss = Arc::clone(&self.recv_loss);
        let size = self.config.max_datagram_size;

        self.runtime.spawn(async move {
            let mut buffer = BytesMut::zeroed(size);
            loop {
                match socket.recv_from(&mut buffer[..]).await {
                    Ok((len, addr)) => {
                        if lose(loss.load(Ordering::Relaxed)) {
                            trace!("Simulated loss of {} bytes from {}", len, addr);
                            continue;
                        }
                        let packet = Bytes::copy_from_slice(&buffer[..len]);
                        let inbound = if rtcp_only || is_rtcp(&packet) {
                            Inbound::Rtcp(packet)
                        } else {
                            Inbound::Rtp(packet)
                        };
                        if queue.send(inbound).await.is_err() {
                            debug!("Sink consumer gone, stopping receiver");
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        // Short delay before retrying
                        tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
                    }
                }
            }
        })
    }

    /// Deliver queued datagrams to the sink off the async workers
    fn spawn_sink_consumer(
        &self,
        sink: Arc<dyn MediaSink>,
        mut queue: mpsc::Receiver<Inbound>,
    ) -> JoinHandle<()> {
        self.runtime.spawn_blocking(move || {
            while let Some(inbound) = queue.blocking_recv() {
                match inbound {
                    Inbound::Rtp(packet) => sink.on_rtp(&packet),
                    Inbound::Rtcp(packet) => sink.on_rtcp(&packet),
                }
            }
            trace!("UDP sink consumer finished");
        })
    }

    fn send(&self, socket: &UdpSocket, packet: &[u8], dest: SocketAddr) -> Result<()> {
        if lose(self.send_loss.load(Ordering::Relaxed)) {
            trace!("Simulated loss of {} bytes to {}", packet.len(), dest);
            return Ok(());
        }
        socket
            .try_send_to(packet, dest)
            .map(|_| ())
            .map_err(|e| Error::Transport(format!("Failed to send to {}: {}", dest, e)))
    }

    fn remote(&self) -> Result<Remote> {
        self.ensure_open()?;
        (*self.remote.lock())
            .ok_or_else(|| Error::Transport("Transport is not attached".to_string()))
    }
}

/// RTCP packet types 200..=204 (RFC 5761 section 4)
fn is_rtcp(packet: &[u8]) -> bool {
    packet.len() >= 8 && packet[0] >> 6 == 2 && (200..=204).contains(&packet[1])
}

fn lose(pct: u8) -> bool {
    pct > 0 && rand::thread_rng().gen_range(0..100) < pct
}

impl MediaTransport for UdpMediaTransport {
    fn attach(
        &self,
        sink: Arc<dyn MediaSink>,
        remote_rtp: SocketAddr,
        remote_rtcp: Option<SocketAddr>,
    ) -> Result<()> {
        self.ensure_open()?;
        let mut tasks = self.receiver_tasks.lock();
        if !tasks.is_empty() {
            return Err(Error::AlreadyAttached);
        }

        *self.remote.lock() = Some(Remote {
            rtp: remote_rtp,
            rtcp: remote_rtcp,
        });
        let (tx, rx) = mpsc::channel(SINK_QUEUE_DEPTH);
        tasks.push(self.spawn_receiver(Arc::clone(&self.rtp_socket), tx.clone(), false));
        if let Some(rtcp_socket) = &self.rtcp_socket {
            tasks.push(self.spawn_receiver(Arc::clone(rtcp_socket), tx.clone(), true));
        }
        drop(tx);
        tasks.push(self.spawn_sink_consumer(sink, rx));

        info!("Started UDP transport receiver tasks, remote {}", remote_rtp);
        Ok(())
    }

    fn detach(&self) {
        for task in self.receiver_tasks.lock().drain(..) {
            task.abort();
        }
        *self.remote.lock() = None;
    }

    fn send_rtp(&self, packet: &[u8]) -> Result<()> {
        let remote = self.remote()?;
        self.send(&self.rtp_socket, packet, remote.rtp)
    }

    fn send_rtcp(&self, packet: &[u8]) -> Result<()> {
        let remote = self.remote()?;
        self.send_rtcp_to(remote.rtcp.unwrap_or(remote.rtp), packet)
    }

    fn send_rtcp_to(&self, addr: SocketAddr, packet: &[u8]) -> Result<()> {
        self.ensure_open()?;
        let socket = self.rtcp_socket.as_ref().unwrap_or(&self.rtp_socket);
        self.send(socket, packet, addr)
    }

    fn info(&self) -> TransportInfo {
        let remote = *self.remote.lock();
        TransportInfo {
            local_rtp: self.local_rtp_addr().ok(),
            local_rtcp: self.local_rtcp_addr().ok(),
            remote_rtp: remote.map(|r| r.rtp),
            remote_rtcp: remote.and_then(|r| r.rtcp),
            zrtp: None,
        }
    }

    fn media_stop(&self) -> Result<()> {
        self.ensure_open()?;
        debug!("UDP media stopped");
        Ok(())
    }

    fn simulate_lost(&self, dir: MediaDirection, pct_lost: u8) -> Result<()> {
        self.ensure_open()?;
        if pct_lost > 100 {
            return Err(Error::InvalidParameter(format!("Loss of {}%", pct_lost)));
        }
        if matches!(dir, MediaDirection::Encoding | MediaDirection::Both) {
            self.send_loss.store(pct_lost, Ordering::Relaxed);
        }
        if matches!(dir, MediaDirection::Decoding | MediaDirection::Both) {
            self.recv_loss.store(pct_lost, Ordering::Relaxed);
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            warn!("UDP transport closed twice");
            return Ok(());
        }
        self.detach();
        debug!("UDP transport closed");
        Ok(())
    }
}

impl Drop for UdpMediaTransport {
    fn drop(&mut self) {
        for task in self.receiver_tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_rtcp() {
        let mut sr = vec![0x80, 200, 0, 6];
        sr.extend_from_slice(&[0; 24]);
        assert!(is_rtcp(&sr));

        let rtp = [0x80, 0x00, 0, 1, 0, 0, 0, 0, 0, 0, 0, 1];
        assert!(!is_rtcp(&rtp));

        let zrtp = [0x10, 0x00, 0, 1, 0x5a, 0x52, 0x54, 0x50];
        assert!(!is_rtcp(&zrtp));
    }

    #[test]
    fn test_lose_bounds() {
        assert!(!lose(0));
        assert!(lose(100));
    }

    struct BlockingSink {
        release: std::sync::Mutex<std::sync::mpsc::Receiver<()>>,
        released: AtomicBool,
    }

    impl MediaSink for BlockingSink {
        fn on_rtp(&self, _packet: &[u8]) {
            let release = self.release.lock().unwrap();
            if release.recv_timeout(std::time::Duration::from_secs(5)).is_ok() {
                self.released.store(true, Ordering::SeqCst);
            }
        }

        fn on_rtcp(&self, _packet: &[u8]) {}
    }

    #[tokio::test]
    async fn test_blocking_sink_does_not_stall_runtime() {
        let config = UdpTransportConfig {
            local_rtp_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        };
        let transport = UdpMediaTransport::bind(config).await.unwrap();
        let local = transport.local_rtp_addr().unwrap();

        let (release, wait) = std::sync::mpsc::channel();
        let sink = Arc::new(BlockingSink {
            release: std::sync::Mutex::new(wait),
            released: AtomicBool::new(false),
        });
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        transport
            .attach(sink.clone(), peer.local_addr().unwrap(), None)
            .unwrap();

        peer.send_to(&[0x80, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 1], local)
            .await
            .unwrap();

        // the single runtime thread keeps running while the sink blocks
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        release.send(()).unwrap();

        for _ in 0..200 {
            if sink.released.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
        }
        assert!(sink.released.load(Ordering::SeqCst));
        transport.close().unwrap();
    }

    #[tokio::test]
    async fn test_udp_transport_creation() {
        let config = UdpTransportConfig {
            local_rtp_addr: "127.0.0.1:0".parse().unwrap(),
            local_rtcp_addr: Some("127.0.0.1:0".parse().unwrap()),
            ..Default::default()
        };

        let transport = UdpMediaTransport::bind(config).await.unwrap();
        let rtp_addr = transport.local_rtp_addr().unwrap();
        let rtcp_addr = transport.local_rtcp_addr().unwrap();

        assert_ne!(rtp_addr.port(), 0);
        assert_ne!(rtcp_addr.port(), 0);
        assert_ne!(rtp_addr.port(), rtcp_addr.port());

        // not attached yet
        assert!(transport.send_rtp(&[0x80, 0, 0, 1]).is_err());
        transport.close().unwrap();
        assert_eq!(transport.media_stop(), Err(Error::TransportClosed));
    }
}
