use super::cipher::CtrCipher;
use super::suite::{SrtpSuite, BLOCK_LEN, MASTER_SALT_LEN};
use crate::error::Error;
use crate::Result;

/// Label values for SRTP key derivation (RFC 3711 4.3.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDerivationLabel {
    /// RTP encryption key
    RtpEncryption = 0,

    /// RTP authentication key
    RtpAuthentication = 1,

    /// RTP salt (for IV creation)
    RtpSalt = 2,

    /// RTCP encryption key
    RtcpEncryption = 3,

    /// RTCP authentication key
    RtcpAuthentication = 4,

    /// RTCP salt (for IV creation)
    RtcpSalt = 5,
}

/// Session keys derived from a master key and salt
pub struct SessionKeys {
    pub cipher_key: Vec<u8>,
    pub auth_key: Vec<u8>,
    pub salt: [u8; MASTER_SALT_LEN],
}

/// RFC 3711 PRF with a key derivation rate of zero
///
/// `prf` is the negotiated cipher keyed with the master key. The counter
/// block is the master salt with the label XORed into byte 7.
pub fn derive(
    prf: &CtrCipher,
    master_salt: &[u8; MASTER_SALT_LEN],
    label: KeyDerivationLabel,
    output_len: usize,
) -> Vec<u8> {
    let mut iv = [0u8; BLOCK_LEN];
    iv[..MASTER_SALT_LEN].copy_from_slice(master_salt);
    iv[7] ^= label as u8;

    let mut output = vec![0u8; output_len];
    prf.apply_keystream(&iv, &mut output);
    output
}

/// Derive the media (`control == false`) or control session keys
pub fn derive_session_keys(
    suite: &SrtpSuite,
    master_key: &[u8],
    master_salt: &[u8],
    control: bool,
) -> Result<SessionKeys> {
    let master_salt: &[u8; MASTER_SALT_LEN] = master_salt.try_into().map_err(|_| {
        Error::SrtpError(format!(
            "Master salt must be {} bytes, got {}",
            MASTER_SALT_LEN,
            master_salt.len()
        ))
    })?;
    if master_key.len() != suite.key_len {
        return Err(Error::SrtpError(format!(
            "Master key must be {} bytes, got {}",
            suite.key_len,
            master_key.len()
        )));
    }

    let (enc_label, auth_label, salt_label) = if control {
        (
            KeyDerivationLabel::RtcpEncryption,
            KeyDerivationLabel::RtcpAuthentication,
            KeyDerivationLabel::RtcpSalt,
        )
    } else {
        (
            KeyDerivationLabel::RtpEncryption,
            KeyDerivationLabel::RtpAuthentication,
            KeyDerivationLabel::RtpSalt,
        )
    };

    let prf = CtrCipher::new(suite.cipher, master_key)?;
    let cipher_key = derive(&prf, master_salt, enc_label, suite.key_len);
    let auth_key = derive(&prf, master_salt, auth_label, suite.auth_key_len);

    let mut salt = [0u8; MASTER_SALT_LEN];
    salt.copy_from_slice(&derive(&prf, master_salt, salt_label, MASTER_SALT_LEN));

    Ok(SessionKeys {
        cipher_key,
        auth_key,
        salt,
    })
}
