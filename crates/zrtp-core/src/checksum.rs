//! CRC-32C (Castagnoli) checksum for ZRTP frames
//!
//! ZRTP protects every handshake packet with the CRC-32C of RFC 3309.
//! The value is carried in the trailer in the SCTP byte order, so the
//! raw remainder is byte-swapped before it is written big-endian.

/// Reflected Castagnoli polynomial
const CRC32C_POLY: u32 = 0x82F6_3B78;

static CRC32C_TABLE: [u32; 256] = build_table();

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ CRC32C_POLY;
            } else {
                crc >>= 1;
            }
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Incremental CRC-32C
#[derive(Debug, Clone, Copy)]
pub struct Crc32c {
    state: u32,
}

impl Crc32c {
    pub fn new() -> Self {
        Self { state: 0xFFFF_FFFF }
    }

    pub fn update(&mut self, data: &[u8]) {
        let mut crc = self.state;
        for &byte in data {
            crc = CRC32C_TABLE[((crc ^ u32::from(byte)) & 0xff) as usize] ^ (crc >> 8);
        }
        self.state = crc;
    }

    /// Standard CRC-32C value
    pub fn finalize(self) -> u32 {
        !self.state
    }
}

impl Default for Crc32c {
    fn default() -> Self {
        Self::new()
    }
}

/// CRC-32C of `data`
pub fn crc32c(data: &[u8]) -> u32 {
    let mut crc = Crc32c::new();
    crc.update(data);
    crc.finalize()
}

/// Value stored (big-endian) in the ZRTP frame trailer for `data`
pub fn generate(data: &[u8]) -> u32 {
    crc32c(data).swap_bytes()
}
