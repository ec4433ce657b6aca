//! SRTP and SRTCP crypto contexts
//!
//! Packets are processed in place in a caller supplied `Vec<u8>`: protect
//! appends the tag (and the SRTCP index), unprotect truncates them. Neither
//! operation grows a buffer beyond the configured maximum.

use bytes::Buf;

use super::auth::{SrtpAuthenticator, SrtpReplayProtection};
use super::cipher::{build_iv, CtrCipher};
use super::kdf::derive_session_keys;
use super::suite::{SrtpSuite, MASTER_SALT_LEN};
use crate::demux::RTP_HEADER_LEN;
use crate::error::{Error, UnprotectError};
use crate::Result;

/// Fixed RTCP header: V/P/RC, PT, length, sender SSRC
pub const RTCP_HEADER_LEN: usize = 8;

/// SRTCP E flag and index word
pub const SRTCP_INDEX_LEN: usize = 4;

const SRTCP_E_FLAG: u32 = 0x8000_0000;
const SRTCP_INDEX_MASK: u32 = 0x7FFF_FFFF;

/// Length of the RTP header including CSRCs and the header extension
pub fn rtp_header_len(packet: &[u8]) -> Option<usize> {
    if packet.len() < RTP_HEADER_LEN {
        return None;
    }
    let csrc_count = (packet[0] & 0x0f) as usize;
    let mut len = RTP_HEADER_LEN + csrc_count * 4;

    if packet[0] & 0x10 != 0 {
        if packet.len() < len + 4 {
            return None;
        }
        let mut ext = &packet[len + 2..len + 4];
        len += 4 + ext.get_u16() as usize * 4;
    }

    (len <= packet.len()).then_some(len)
}

/// Estimate the 48-bit packet index of `seq` (RFC 3711 3.3.1)
///
/// Returns `None` when the guess would need a ROC below zero.
fn estimate_index(highest: Option<u64>, seq: u16) -> Option<u64> {
    let Some(highest) = highest else {
        return Some(u64::from(seq));
    };
    let roc = highest >> 16;
    let s_l = (highest & 0xffff) as u16;

    let v = if s_l < 0x8000 {
        if seq > s_l && seq - s_l > 0x8000 {
            roc.checked_sub(1)?
        } else {
            roc
        }
    } else if s_l - 0x8000 > seq {
        roc + 1
    } else {
        roc
    };

    Some((v << 16) | u64::from(seq))
}

/// One direction of an SRTP media stream
pub struct SrtpContext {
    ssrc: u32,
    suite: SrtpSuite,
    cipher: CtrCipher,
    auth: SrtpAuthenticator,
    salt: [u8; MASTER_SALT_LEN],
    max_packet_len: usize,

    /// Highest index protected (sender) or accepted (receiver)
    highest_index: Option<u64>,
    replay: SrtpReplayProtection,
    packets: u64,
}

impl SrtpContext {
    /// Derive a context from master key and salt; key derivation rate is zero
    pub fn new(
        ssrc: u32,
        suite: SrtpSuite,
        master_key: &[u8],
        master_salt: &[u8],
        replay_window: u64,
        max_packet_len: usize,
    ) -> Result<Self> {
        let keys = derive_session_keys(&suite, master_key, master_salt, false)?;
        Ok(Self {
            ssrc,
            suite,
            cipher: CtrCipher::new(suite.cipher, &keys.cipher_key)?,
            auth: SrtpAuthenticator::new(suite.auth, &keys.auth_key, suite.tag_len)?,
            salt: keys.salt,
            max_packet_len,
            highest_index: None,
            replay: SrtpReplayProtection::new(replay_window),
            packets: 0,
        })
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    pub fn suite(&self) -> &SrtpSuite {
        &self.suite
    }

    /// Packets successfully protected or unprotected by this context
    pub fn packet_count(&self) -> u64 {
        self.packets
    }

    /// Current rollover counter
    pub fn roc(&self) -> u32 {
        self.highest_index.map(|index| (index >> 16) as u32).unwrap_or(0)
    }

    /// Encrypt and authenticate an RTP packet in place, returning the new length
    pub fn protect(&mut self, packet: &mut Vec<u8>) -> Result<usize> {
        let header_len = rtp_header_len(&packet[..]).ok_or_else(|| {
            Error::SrtpError(format!("RTP packet too short: {} bytes", packet.len()))
        })?;
        let total = packet.len() + self.suite.tag_len;
        if total > self.max_packet_len {
            return Err(Error::PacketTooLarge {
                size: total,
                max: self.max_packet_len,
            });
        }

        let mut header = &packet[2..12];
        let seq = header.get_u16();
        header.advance(4);
        let ssrc = header.get_u32();
        let index = estimate_index(self.highest_index, seq).unwrap_or(u64::from(seq));

        let iv = build_iv(&self.salt, ssrc, index);
        self.cipher.apply_keystream(&iv, &mut packet[header_len..]);

        let tag = self.auth.calculate_auth_tag(&packet[..], Some((index >> 16) as u32));
        packet.extend_from_slice(&tag);

        if self.highest_index.map_or(true, |highest| index > highest) {
            self.highest_index = Some(index);
        }
        self.packets += 1;
        Ok(packet.len())
    }

    /// Verify, replay-check and decrypt an SRTP packet in place
    pub fn unprotect(&mut self, packet: &mut Vec<u8>) -> std::result::Result<usize, UnprotectError> {
        let tag_len = self.suite.tag_len;
        if packet.len() < RTP_HEADER_LEN + tag_len {
            return Err(UnprotectError::Malformed);
        }
        let auth_len = packet.len() - tag_len;
        let header_len = rtp_header_len(&packet[..auth_len]).ok_or(UnprotectError::Malformed)?;

        let mut header = &packet[2..12];
        let seq = header.get_u16();
        header.advance(4);
        let ssrc = header.get_u32();

        let index = estimate_index(self.highest_index, seq).ok_or(UnprotectError::ReplayDetected)?;
        if !self.replay.check(index) {
            return Err(UnprotectError::ReplayDetected);
        }

        let (data, tag) = packet.split_at(auth_len);
        if !self.auth.verify_auth_tag(data, tag, Some((index >> 16) as u32)) {
            return Err(UnprotectError::AuthenticationFailed);
        }

        packet.truncate(auth_len);
        let iv = build_iv(&self.salt, ssrc, index);
        self.cipher.apply_keystream(&iv, &mut packet[header_len..]);

        self.replay.update(index);
        if self.highest_index.map_or(true, |highest| index > highest) {
            self.highest_index = Some(index);
        }
        self.packets += 1;
        Ok(packet.len())
    }
}

/// One direction of an SRTCP control stream
pub struct SrtcpContext {
    ssrc: u32,
    suite: SrtpSuite,
    cipher: CtrCipher,
    auth: SrtpAuthenticator,
    salt: [u8; MASTER_SALT_LEN],
    max_packet_len: usize,

    /// Next index to send
    send_index: u32,
    replay: SrtpReplayProtection,
    packets: u64,
}

impl SrtcpContext {
    pub fn new(
        ssrc: u32,
        suite: SrtpSuite,
        master_key: &[u8],
        master_salt: &[u8],
        replay_window: u64,
        max_packet_len: usize,
    ) -> Result<Self> {
        let keys = derive_session_keys(&suite, master_key, master_salt, true)?;
        Ok(Self {
            ssrc,
            suite,
            cipher: CtrCipher::new(suite.cipher, &keys.cipher_key)?,
            auth: SrtpAuthenticator::new(suite.auth, &keys.auth_key, suite.tag_len)?,
            salt: keys.salt,
            max_packet_len,
            send_index: 0,
            replay: SrtpReplayProtection::new(replay_window),
            packets: 0,
        })
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    pub fn packet_count(&self) -> u64 {
        self.packets
    }

    /// Encrypt and authenticate an RTCP compound packet in place
    pub fn protect(&mut self, packet: &mut Vec<u8>) -> Result<usize> {
        if packet.len() < RTCP_HEADER_LEN {
            return Err(Error::SrtpError(format!(
                "RTCP packet too short: {} bytes",
                packet.len()
            )));
        }
        let total = packet.len() + SRTCP_INDEX_LEN + self.suite.tag_len;
        if total > self.max_packet_len {
            return Err(Error::PacketTooLarge {
                size: total,
                max: self.max_packet_len,
            });
        }

        let mut header = &packet[4..8];
        let ssrc = header.get_u32();
        let index = self.send_index;

        let iv = build_iv(&self.salt, ssrc, u64::from(index));
        self.cipher.apply_keystream(&iv, &mut packet[RTCP_HEADER_LEN..]);
        packet.extend_from_slice(&(SRTCP_E_FLAG | index).to_be_bytes());

        let tag = self.auth.calculate_auth_tag(&packet[..], None);
        packet.extend_from_slice(&tag);

        self.send_index = index.wrapping_add(1) & SRTCP_INDEX_MASK;
        self.packets += 1;
        Ok(packet.len())
    }

    /// Verify, replay-check and decrypt an SRTCP packet in place
    pub fn unprotect(&mut self, packet: &mut Vec<u8>) -> std::result::Result<usize, UnprotectError> {
        let tag_len = self.suite.tag_len;
        if packet.len() < RTCP_HEADER_LEN + SRTCP_INDEX_LEN + tag_len {
            return Err(UnprotectError::Malformed);
        }
        let auth_len = packet.len() - tag_len;
        let index_offset = auth_len - SRTCP_INDEX_LEN;

        let mut word = &packet[index_offset..auth_len];
        let e_index = word.get_u32();
        let encrypted = e_index & SRTCP_E_FLAG != 0;
        let index = u64::from(e_index & SRTCP_INDEX_MASK);

        if !self.replay.check(index) {
            return Err(UnprotectError::ReplayDetected);
        }

        let (data, tag) = packet.split_at(auth_len);
        if !self.auth.verify_auth_tag(data, tag, None) {
            return Err(UnprotectError::AuthenticationFailed);
        }

        let mut header = &packet[4..8];
        let ssrc = header.get_u32();

        packet.truncate(index_offset);
        if encrypted {
            let iv = build_iv(&self.salt, ssrc, index);
            self.cipher.apply_keystream(&iv, &mut packet[RTCP_HEADER_LEN..]);
        }

        self.replay.update(index);
        self.packets += 1;
        Ok(packet.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::srtp::suite::{AuthAlgorithm, SymCipher};

    fn suite() -> SrtpSuite {
        SrtpSuite::lookup(SymCipher::Aes, 16, AuthAlgorithm::HmacSha1, 80).unwrap()
    }

    fn pair(suite: SrtpSuite) -> (SrtpContext, SrtpContext) {
        let key = vec![0x11; suite.key_len];
        let salt = [0x22; 14];
        (
            SrtpContext::new(0xcafe, suite, &key, &salt, 128, 1600).unwrap(),
            SrtpContext::new(0xcafe, suite, &key, &salt, 128, 1600).unwrap(),
        )
    }

    fn rtp(seq: u16, payload: &[u8]) -> Vec<u8> {
        let mut packet = vec![0x80, 0x00];
        packet.extend_from_slice(&seq.to_be_bytes());
        packet.extend_from_slice(&[0, 0, 0, 160]);
        packet.extend_from_slice(&0xcafeu32.to_be_bytes());
        packet.extend_from_slice(payload);
        packet
    }

    fn rtcp(payload: &[u8]) -> Vec<u8> {
        let mut packet = vec![0x80, 200, 0x00, 0x06];
        packet.extend_from_slice(&0xcafeu32.to_be_bytes());
        packet.extend_from_slice(payload);
        packet
    }

    #[test]
    fn test_rtp_header_len() {
        assert_eq!(rtp_header_len(&rtp(1, b"abc")), Some(12));

        let mut with_csrc = rtp(1, &[0u8; 8]);
        with_csrc[0] |= 0x02;
        assert_eq!(rtp_header_len(&with_csrc), Some(20));

        let mut with_ext = rtp(1, &[0xbe, 0xde, 0x00, 0x01, 1, 2, 3, 4, 9]);
        with_ext[0] |= 0x10;
        assert_eq!(rtp_header_len(&with_ext), Some(20));

        assert_eq!(rtp_header_len(&[0x80; 11]), None);
        with_ext.truncate(18);
        assert_eq!(rtp_header_len(&with_ext), None);
    }

    #[test]
    fn test_protect_unprotect() {
        for suite in [
            suite(),
            SrtpSuite::lookup(SymCipher::TwoFish, 32, AuthAlgorithm::Blake3, 64).unwrap(),
            SrtpSuite::lookup(SymCipher::Aes, 24, AuthAlgorithm::HmacSha1, 32).unwrap(),
        ] {
            let (mut tx, mut rx) = pair(suite);
            let plain = rtp(100, b"hello srtp payload");
            let mut packet = plain.clone();

            let len = tx.protect(&mut packet).unwrap();
            assert_eq!(len, plain.len() + suite.tag_len);
            assert_eq!(&packet[..12], &plain[..12]);
            assert_ne!(&packet[12..plain.len()], &plain[12..]);

            let len = rx.unprotect(&mut packet).unwrap();
            assert_eq!(len, plain.len());
            assert_eq!(packet, plain);
            assert_eq!(tx.packet_count(), 1);
            assert_eq!(rx.packet_count(), 1);
        }
    }

    #[test]
    fn test_unprotect_failures() {
        let (mut tx, mut rx) = pair(suite());

        let mut packet = rtp(7, b"payload");
        tx.protect(&mut packet).unwrap();

        let mut tampered = packet.clone();
        tampered[13] ^= 0x01;
        assert_eq!(rx.unprotect(&mut tampered), Err(UnprotectError::AuthenticationFailed));

        let mut replayed = packet.clone();
        assert!(rx.unprotect(&mut packet).is_ok());
        assert_eq!(rx.unprotect(&mut replayed), Err(UnprotectError::ReplayDetected));

        let mut short = vec![0x80; 15];
        assert_eq!(rx.unprotect(&mut short), Err(UnprotectError::Malformed));
        let mut empty = Vec::new();
        assert_eq!(rx.unprotect(&mut empty), Err(UnprotectError::Malformed));

        // failures did not count
        assert_eq!(rx.packet_count(), 1);
    }

    #[test]
    fn test_failed_auth_does_not_poison_replay_window() {
        let (mut tx, mut rx) = pair(suite());
        let mut packet = rtp(9, b"x");
        tx.protect(&mut packet).unwrap();

        let mut forged = packet.clone();
        let last = forged.len() - 1;
        forged[last] ^= 0xff;
        assert_eq!(rx.unprotect(&mut forged), Err(UnprotectError::AuthenticationFailed));
        assert!(rx.unprotect(&mut packet).is_ok());
    }

    #[test]
    fn test_protect_rejects_oversize() {
        let key = [0u8; 16];
        let mut tx = SrtpContext::new(1, suite(), &key, &[0; 14], 128, 40).unwrap();
        let mut packet = rtp(1, &[0u8; 20]);
        let before = packet.clone();
        assert_eq!(
            tx.protect(&mut packet),
            Err(Error::PacketTooLarge { size: 42, max: 40 })
        );
        assert_eq!(packet, before);
        assert_eq!(tx.packet_count(), 0);
    }

    #[test]
    fn test_rollover() {
        let (mut tx, mut rx) = pair(suite());
        for seq in [0xfffeu16, 0xffff, 0x0000, 0x0001] {
            let plain = rtp(seq, b"wrap");
            let mut packet = plain.clone();
            tx.protect(&mut packet).unwrap();
            rx.unprotect(&mut packet).unwrap();
            assert_eq!(packet, plain);
        }
        assert_eq!(tx.roc(), 1);
        assert_eq!(rx.roc(), 1);
    }

    #[test]
    fn test_estimate_index() {
        assert_eq!(estimate_index(None, 5), Some(5));
        assert_eq!(estimate_index(Some(0x1_0010), 0x0011), Some(0x1_0011));
        assert_eq!(estimate_index(Some(0x0_fff0), 0x0002), Some(0x1_0002));
        assert_eq!(estimate_index(Some(0x1_0002), 0xfff0), Some(0x0_fff0));
        assert_eq!(estimate_index(Some(0x0_0002), 0xfff0), None);
    }

    #[test]
    fn test_srtcp_protect_unprotect() {
        let key = [0x33; 16];
        let salt = [0x44; 14];
        let mut tx = SrtcpContext::new(0xcafe, suite(), &key, &salt, 128, 1600).unwrap();
        let mut rx = SrtcpContext::new(0xcafe, suite(), &key, &salt, 128, 1600).unwrap();

        for _ in 0..3 {
            let plain = rtcp(&[1, 2, 3, 4, 5, 6, 7, 8]);
            let mut packet = plain.clone();
            let len = tx.protect(&mut packet).unwrap();
            assert_eq!(len, plain.len() + SRTCP_INDEX_LEN + 10);
            assert_eq!(packet[plain.len()] & 0x80, 0x80);

            let mut replay = packet.clone();
            assert_eq!(rx.unprotect(&mut packet).unwrap(), plain.len());
            assert_eq!(packet, plain);
            assert_eq!(rx.unprotect(&mut replay), Err(UnprotectError::ReplayDetected));
        }

        let mut forged = rtcp(&[0; 8]);
        forged.extend_from_slice(&[0x80, 0, 0, 9]);
        forged.extend_from_slice(&[0; 10]);
        assert_eq!(rx.unprotect(&mut forged), Err(UnprotectError::AuthenticationFailed));
        assert_eq!(rx.unprotect(&mut vec![0x80; 12]), Err(UnprotectError::Malformed));
    }
}
