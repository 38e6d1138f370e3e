//! Close codes for WebSocket connection termination, as defined in
//! [RFC 6455 Section 7.4.1](https://datatracker.ietf.org/doc/html/rfc6455#section-7.4.1).
//!
//! A close frame may carry a two-byte status code followed by an optional UTF-8
//! reason. The engine attaches a code to every close frame it emits: `Normal`
//! for orderly shutdown, `Protocol`/`Size`/`Unsupported` for the protocol
//! violation that forced the closure.

/// Status code contained in the first two bytes of a close frame payload.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CloseCode {
    /// 1000: normal closure, the purpose for which the connection was
    /// established has been fulfilled.
    Normal,
    /// 1001: the endpoint is going away (server shutdown, browser navigation).
    Away,
    /// 1002: the endpoint is terminating the connection due to a protocol error.
    Protocol,
    /// 1003: the endpoint received a data type it cannot accept.
    Unsupported,
    /// 1005: reserved; indicates no status code was present. Must not be sent.
    Status,
    /// 1006: reserved; abnormal closure without a close frame. Must not be sent.
    Abnormal,
    /// 1007: the received data was inconsistent with the message type
    /// (e.g. non-UTF-8 in a text message).
    Invalid,
    /// 1008: a message violated the endpoint's policy.
    Policy,
    /// 1009: a message was too big to process.
    Size,
    /// 1010: the client expected an extension the server didn't negotiate.
    Extension,
    /// 1011: the server encountered an unexpected condition.
    Error,
    /// 1012: the service is restarting.
    Restart,
    /// 1013: try again later.
    Again,
    /// 1015: reserved; TLS handshake failure. Must not be sent.
    Tls,
    /// 3000-4999: registered and private-use codes for libraries,
    /// frameworks and applications.
    Library(u16),
    /// Any code outside the ranges above.
    Other(u16),
}

impl CloseCode {
    /// Returns `true` if this code may legitimately appear on the wire.
    ///
    /// The reserved codes (1004-1006, 1015) and codes below 1000 are never
    /// valid in a transmitted close frame.
    pub fn is_allowed(&self) -> bool {
        !matches!(
            self,
            CloseCode::Status | CloseCode::Abnormal | CloseCode::Tls | CloseCode::Other(_)
        )
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        match code {
            1000 => Self::Normal,
            1001 => Self::Away,
            1002 => Self::Protocol,
            1003 => Self::Unsupported,
            1005 => Self::Status,
            1006 => Self::Abnormal,
            1007 => Self::Invalid,
            1008 => Self::Policy,
            1009 => Self::Size,
            1010 => Self::Extension,
            1011 => Self::Error,
            1012 => Self::Restart,
            1013 => Self::Again,
            1015 => Self::Tls,
            3000..=4999 => Self::Library(code),
            _ => Self::Other(code),
        }
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        match code {
            CloseCode::Normal => 1000,
            CloseCode::Away => 1001,
            CloseCode::Protocol => 1002,
            CloseCode::Unsupported => 1003,
            CloseCode::Status => 1005,
            CloseCode::Abnormal => 1006,
            CloseCode::Invalid => 1007,
            CloseCode::Policy => 1008,
            CloseCode::Size => 1009,
            CloseCode::Extension => 1010,
            CloseCode::Error => 1011,
            CloseCode::Restart => 1012,
            CloseCode::Again => 1013,
            CloseCode::Tls => 1015,
            CloseCode::Library(code) | CloseCode::Other(code) => code,
        }
    }
}
