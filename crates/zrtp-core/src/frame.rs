//! ZRTP packet framing
//!
//! Every handshake message travels in a frame of the form:
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |0 0 0 1|0 0 0 0|  reserved     |        Sequence Number        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                 Magic Cookie 'ZRTP' (0x5a525450)              |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Source Identifier                      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                  ZRTP Message (length depends)                |
//! |                            . . .                              |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                              CRC                              |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use bytes::{Buf, BufMut};

use crate::checksum;
use crate::error::{Error, FrameError};
use crate::Result;

/// First byte of every ZRTP frame
pub const ZRTP_MARKER: u8 = 0x10;

/// Magic cookie "ZRTP"
pub const ZRTP_MAGIC: u32 = 0x5a52_5450;

/// Fixed header: marker, reserved, sequence, magic, SSRC
pub const ZRTP_HEADER_LEN: usize = 12;

/// CRC trailer
pub const ZRTP_CRC_LEN: usize = 4;

/// A ZRTP frame borrowed from a datagram or about to be written into one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZrtpFrame<'a> {
    /// Handshake sequence number
    pub sequence: u16,

    /// Sender's SSRC
    pub ssrc: u32,

    /// Handshake message, without header and checksum
    pub payload: &'a [u8],
}

impl<'a> ZrtpFrame<'a> {
    pub fn new(sequence: u16, ssrc: u32, payload: &'a [u8]) -> Self {
        Self {
            sequence,
            ssrc,
            payload,
        }
    }

    /// Size of the frame on the wire
    pub fn encoded_len(&self) -> usize {
        ZRTP_HEADER_LEN + self.payload.len() + ZRTP_CRC_LEN
    }

    /// Encode into `buf`, replacing its contents
    ///
    /// Fails without touching `buf` if the frame would exceed `max_size`.
    pub fn encode_into(&self, buf: &mut Vec<u8>, max_size: usize) -> Result<usize> {
        let total = self.encoded_len();
        if total > max_size {
            return Err(Error::PacketTooLarge {
                size: total,
                max: max_size,
            });
        }

        buf.clear();
        buf.reserve(total);
        buf.put_u8(ZRTP_MARKER);
        buf.put_u8(0);
        buf.put_u16(self.sequence);
        buf.put_u32(ZRTP_MAGIC);
        buf.put_u32(self.ssrc);
        buf.put_slice(self.payload);

        let crc = checksum::generate(&buf[..]);
        buf.put_u32(crc);

        Ok(total)
    }

    pub fn encode(&self, max_size: usize) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut buf, max_size)?;
        Ok(buf)
    }

    /// Decode and validate a received frame
    ///
    /// The checksum is verified before anything else in the frame is
    /// trusted; a frame with a valid checksum but the wrong magic cookie is
    /// reported as `BadMagic`.
    pub fn decode(data: &'a [u8], max_size: usize) -> std::result::Result<Self, FrameError> {
        if data.len() > max_size {
            return Err(FrameError::Oversize {
                size: data.len(),
                max: max_size,
            });
        }
        if data.len() < ZRTP_HEADER_LEN + ZRTP_CRC_LEN {
            return Err(FrameError::Truncated(data.len()));
        }
        if data[0] & 0xf0 != ZRTP_MARKER {
            return Err(FrameError::NotZrtp(data[0]));
        }

        let crc_offset = data.len() - ZRTP_CRC_LEN;
        let mut trailer = &data[crc_offset..];
        let received = trailer.get_u32();
        let computed = checksum::generate(&data[..crc_offset]);
        if computed != received {
            return Err(FrameError::ChecksumMismatch { computed, received });
        }

        let mut header = &data[..ZRTP_HEADER_LEN];
        header.advance(2);
        let sequence = header.get_u16();
        let magic = header.get_u32();
        let ssrc = header.get_u32();
        if magic != ZRTP_MAGIC {
            return Err(FrameError::BadMagic(magic));
        }

        Ok(Self {
            sequence,
            ssrc,
            payload: &data[ZRTP_HEADER_LEN..crc_offset],
        })
    }
}
