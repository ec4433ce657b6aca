//! Demultiplexing of ZRTP and RTP packets sharing one socket
//!
//! RTP version 2 packets always carry `10` in the two most significant bits
//! of the first byte. ZRTP frames use `0001` in the high nibble, which no
//! valid RTP packet can carry.

use bytes::Buf;

use crate::frame::ZRTP_MARKER;

/// Fixed RTP header length without CSRCs or extensions
pub const RTP_HEADER_LEN: usize = 12;

/// Class of an inbound datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    /// RTP or SRTP media, possibly empty or garbage
    Media,

    /// ZRTP handshake frame
    Zrtp,
}

/// Classify an inbound datagram by its first byte
pub fn classify(packet: &[u8]) -> PacketKind {
    match packet.first() {
        Some(&first) if first & 0xf0 == ZRTP_MARKER => PacketKind::Zrtp,
        _ => PacketKind::Media,
    }
}

/// SSRC of an RTP packet, if the packet is long enough to carry one
pub fn rtp_ssrc(packet: &[u8]) -> Option<u32> {
    if packet.len() < RTP_HEADER_LEN {
        return None;
    }
    let mut ssrc = &packet[8..12];
    Some(ssrc.get_u32())
}

/// SSRC of an RTCP packet (sender SSRC of the first report)
pub fn rtcp_ssrc(packet: &[u8]) -> Option<u32> {
    if packet.len() < 8 {
        return None;
    }
    let mut ssrc = &packet[4..8];
    Some(ssrc.get_u32())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(classify(&[0x10, 0, 0, 1]), PacketKind::Zrtp);
        assert_eq!(classify(&[0x1f]), PacketKind::Zrtp);

        // RTP v2 with and without padding/extension/CSRCs
        for first in [0x80u8, 0x90, 0xa0, 0xbf] {
            assert_eq!(classify(&[first, 0, 0, 0]), PacketKind::Media);
        }

        // anything else is handed to the media path
        assert_eq!(classify(&[]), PacketKind::Media);
        assert_eq!(classify(&[0x00]), PacketKind::Media);
        assert_eq!(classify(&[0x20]), PacketKind::Media);
    }

    #[test]
    fn test_ssrc_extraction() {
        let rtp = [0x80, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0x12, 0x34, 0x56, 0x78];
        assert_eq!(rtp_ssrc(&rtp), Some(0x1234_5678));
        assert_eq!(rtp_ssrc(&rtp[..11]), None);

        let rtcp = [0x80, 200, 0x00, 0x06, 0xca, 0xfe, 0xba, 0xbe];
        assert_eq!(rtcp_ssrc(&rtcp), Some(0xcafe_babe));
        assert_eq!(rtcp_ssrc(&rtcp[..4]), None);
    }
}
