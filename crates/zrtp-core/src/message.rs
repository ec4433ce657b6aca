//! Status messages reported by the handshake engine and the transport

use std::fmt;

/// Severity of a [`ZrtpMessage`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Severe,
    /// ZRTP protocol error carrying an RFC 6189 error code
    ZrtpError,
}

/// Progress of the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InfoCode {
    HelloReceived = 1,
    CommitDhGenerated = 2,
    RespCommitReceived = 3,
    Dh1DhGenerated = 4,
    InitDh1Received = 5,
    RespDh2Received = 6,
    InitConf1Received = 7,
    RespConf2Received = 8,
    RsMatchFound = 9,
    SecureStateOn = 10,
    SecureStateOff = 11,
}

impl InfoCode {
    pub fn description(&self) -> &'static str {
        match self {
            InfoCode::HelloReceived => "Hello received, preparing a Commit",
            InfoCode::CommitDhGenerated => "Commit: Generated a public DH key",
            InfoCode::RespCommitReceived => "Responder: Commit received, preparing DHPart1",
            InfoCode::Dh1DhGenerated => "DH1Part: Generated a public DH key",
            InfoCode::InitDh1Received => "Initiator: DHPart1 received, preparing DHPart2",
            InfoCode::RespDh2Received => "Responder: DHPart2 received, preparing Confirm1",
            InfoCode::InitConf1Received => "Initiator: Confirm1 received, preparing Confirm2",
            InfoCode::RespConf2Received => "Responder: Confirm2 received, preparing Conf2Ack",
            InfoCode::RsMatchFound => "At least one retained secrets matches - security OK",
            InfoCode::SecureStateOn => "Entered secure state",
            InfoCode::SecureStateOff => "No more security for this session",
        }
    }
}

/// Recoverable conditions; the stream continues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarningCode {
    DhAesMismatch = 1,
    GoClearReceived = 2,
    DhShort = 3,
    NoRsMatch = 4,
    CrcMismatch = 5,
    SrtpAuthError = 6,
    SrtpReplayError = 7,
    NoExpectedRsMatch = 8,
}

impl WarningCode {
    pub fn description(&self) -> &'static str {
        match self {
            WarningCode::DhAesMismatch => {
                "Commit contains an AES256 cipher but does not offer a Diffie-Hellman 4096"
            }
            WarningCode::GoClearReceived => "Received a GoClear message",
            WarningCode::DhShort => {
                "Hello offers an AES256 cipher but does not offer a Diffie-Hellman 4096"
            }
            WarningCode::NoRsMatch => "No retained shared secrets available - must verify SAS",
            WarningCode::CrcMismatch => "Internal ZRTP packet checksum mismatch - packet dropped",
            WarningCode::SrtpAuthError => "Dropping packet because SRTP authentication failed",
            WarningCode::SrtpReplayError => "Dropping packet because SRTP replay check failed",
            WarningCode::NoExpectedRsMatch => {
                "Valid retained shared secrets available but no matches found - must verify SAS"
            }
        }
    }
}

/// Conditions that end the negotiation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SevereCode {
    HelloHmacFailed = 1,
    CommitHmacFailed = 2,
    Dh1HmacFailed = 3,
    Dh2HmacFailed = 4,
    CannotSend = 5,
    ProtocolError = 6,
    NoTimer = 7,
    TooMuchRetries = 8,
}

impl SevereCode {
    pub fn description(&self) -> &'static str {
        match self {
            SevereCode::HelloHmacFailed => "Hash HMAC check of Hello failed",
            SevereCode::CommitHmacFailed => "Hash HMAC check of Commit failed",
            SevereCode::Dh1HmacFailed => "Hash HMAC check of DHPart1 failed",
            SevereCode::Dh2HmacFailed => "Hash HMAC check of DHPart2 failed",
            SevereCode::CannotSend => "Cannot send data - connection or peer down?",
            SevereCode::ProtocolError => "Internal protocol error occurred",
            SevereCode::NoTimer => "Cannot start a timer - internal resources exhausted?",
            SevereCode::TooMuchRetries => {
                "Too much retries during ZRTP negotiation - connection or peer down?"
            }
        }
    }
}

/// A message with its severity and code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ZrtpMessage {
    Info(InfoCode),
    Warning(WarningCode),
    Severe(SevereCode),
    ZrtpError(i32),
}

impl ZrtpMessage {
    pub fn severity(&self) -> Severity {
        match self {
            ZrtpMessage::Info(_) => Severity::Info,
            ZrtpMessage::Warning(_) => Severity::Warning,
            ZrtpMessage::Severe(_) => Severity::Severe,
            ZrtpMessage::ZrtpError(_) => Severity::ZrtpError,
        }
    }

    /// Numeric sub code within the severity
    pub fn code(&self) -> i32 {
        match self {
            ZrtpMessage::Info(code) => *code as i32,
            ZrtpMessage::Warning(code) => *code as i32,
            ZrtpMessage::Severe(code) => *code as i32,
            ZrtpMessage::ZrtpError(code) => *code,
        }
    }
}

impl fmt::Display for ZrtpMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZrtpMessage::Info(code) => write!(f, "ZRTP info message: {}", code.description()),
            ZrtpMessage::Warning(code) => {
                write!(f, "ZRTP warning message: {}", code.description())
            }
            ZrtpMessage::Severe(code) => write!(f, "ZRTP severe message: {}", code.description()),
            ZrtpMessage::ZrtpError(code) => write!(f, "ZRTP error: subcode {:#x}", code),
        }
    }
}

impl From<InfoCode> for ZrtpMessage {
    fn from(code: InfoCode) -> Self {
        ZrtpMessage::Info(code)
    }
}

impl From<WarningCode> for ZrtpMessage {
    fn from(code: WarningCode) -> Self {
        ZrtpMessage::Warning(code)
    }
}

impl From<SevereCode> for ZrtpMessage {
    fn from(code: SevereCode) -> Self {
        ZrtpMessage::Severe(code)
    }
}
