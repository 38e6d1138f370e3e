//! # wschan
//! A server-side implementation of the WebSocket protocol (RFC 6455) that turns an
//! upgraded HTTP connection into a pair of callback-driven message channels, one for
//! text and one for binary payloads.
//!
//! The crate covers the three protocol layers:
//!
//! - **Handshake**: [`upgrade`](upgrade()) validates an inbound HTTP request and, when it is a
//!   well-formed upgrade request, computes the accept key and builds the `101 Switching
//!   Protocols` response. Requests that are not upgrade requests are passed through
//!   untouched so the surrounding HTTP stack can serve them normally.
//! - **Framing**: [`codec::Codec`] encodes and decodes RFC 6455 frames over any
//!   `AsyncRead + AsyncWrite` transport, including masking and the 7/16/64-bit
//!   length encodings.
//! - **Assembly**: [`assembler::Assembler`] is the per-connection state machine that
//!   orders decoded frames into whole application messages, replies to pings, and
//!   enforces fragmentation and UTF-8 rules.
//!
//! # Features
//! The crate provides several optional features that can be enabled in your `Cargo.toml`:
//!
//! - `logging`: Enables debug logging for handshake negotiation and connection
//!   teardown using the `log` crate.
//!
//! - `simd`: Uses `simdutf8` for fast UTF-8 validation of text payloads.
//!
//! - `json`: Adds [`TextChannel::send_json`](channel::TextChannel::send_json) for
//!   serializing values straight onto the text channel.
//!
//! # Server Example
//! ```no_run
//! use http_body_util::Empty;
//! use hyper::{body::{Bytes, Incoming}, Request, Response};
//! use wschan::UpgradeOutcome;
//!
//! async fn serve(mut req: Request<Incoming>) -> wschan::Result<Response<Empty<Bytes>>> {
//!     match wschan::upgrade(&mut req)? {
//!         UpgradeOutcome::Accepted { response, fut } => {
//!             tokio::spawn(async move {
//!                 if let Ok(ws) = fut.await {
//!                     let text = ws.text();
//!                     text.on_message(|msg| println!("got: {msg}"));
//!                     let _ = ws.run().await;
//!                 }
//!             });
//!             Ok(response)
//!         }
//!         UpgradeOutcome::PassThrough => {
//!             // not a websocket request; serve it as plain HTTP
//!             Ok(Response::new(Empty::new()))
//!         }
//!     }
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod assembler;
pub mod channel;
pub mod close;
pub mod codec;
mod connection;
pub mod frame;
mod mask;
mod upgrade;

use thiserror::Error;

pub use channel::{BinaryChannel, TextChannel};
pub use close::CloseCode;
pub use codec::Role;
pub use connection::{WebSocket, MAX_PAYLOAD_READ};
pub use frame::{Frame, FrameView, OpCode};
pub use upgrade::{
    upgrade, upgrade_with_options, HttpResponse, Options, UpgradeFut, UpgradeOutcome,
};

/// A result type for WebSocket operations, using `WebSocketError` as the error type.
///
/// This type alias simplifies function signatures within the crate by providing a
/// standard result type for operations that may return a `WebSocketError`.
pub type Result<T> = std::result::Result<T, WebSocketError>;

/// Represents errors that can occur during WebSocket operations.
///
/// The variants are broadly categorized into:
///
/// - Protocol violations (malformed frames, invalid fragmentation, invalid UTF-8).
///   These are always fatal to the connection; framing corruption cannot be
///   repaired mid-stream.
/// - Connection state errors (sending on a closed connection).
/// - I/O and HTTP-level errors from the underlying transport.
#[derive(Error, Debug)]
pub enum WebSocketError {
    /// Occurs when receiving a WebSocket fragment that violates the protocol
    /// specification, such as a new data frame arriving before the previous
    /// fragmented message was completed.
    #[error("Invalid fragment")]
    InvalidFragment,

    /// Indicates that a text payload contains invalid UTF-8 data. According to
    /// RFC 6455, all text payloads must be valid UTF-8.
    #[error("Invalid UTF-8")]
    InvalidUTF8,

    /// Occurs when receiving a continuation frame without a preceding initial
    /// data frame.
    #[error("Invalid continuation frame")]
    InvalidContinuationFrame,

    /// Returned when attempting to perform operations on a closed WebSocket
    /// connection. Once a connection is closed, no further communication is
    /// possible.
    #[error("Connection is closed")]
    ConnectionClosed,

    /// Indicates that a received close frame has an invalid format, such as
    /// containing a payload of 1 byte (close frames must be either empty or ≥2 bytes).
    #[error("Invalid close frame")]
    InvalidCloseFrame,

    /// Occurs when a close frame contains a status code that is not valid
    /// according to RFC 6455.
    #[error("Invalid close code")]
    InvalidCloseCode,

    /// Indicates that reserved bits in the WebSocket frame header are set. No
    /// extension is ever negotiated by this crate, so all RSV bits must be 0.
    #[error("Reserved bits are not zero")]
    ReservedBitsNotZero,

    /// Occurs when a control frame (ping, pong, or close) is received with the
    /// FIN bit not set. RFC 6455 requires that control frames must not be fragmented.
    #[error("Control frame must not be fragmented")]
    ControlFrameFragmented,

    /// Indicates that a received ping frame exceeds the maximum allowed size of
    /// 125 bytes as specified in RFC 6455.
    #[error("Ping frame too large")]
    PingFrameTooLarge,

    /// Occurs when a received frame's payload length exceeds the maximum
    /// configured size. This helps prevent memory exhaustion attacks.
    #[error("Frame too large")]
    FrameTooLarge,

    /// Indicates receipt of a frame with an invalid opcode value. RFC 6455
    /// reserves the ranges 0x3-0x7 and 0xB-0xF.
    #[error("Invalid opcode (byte={0})")]
    InvalidOpCode(u8),

    /// Wraps standard I/O errors that may occur during WebSocket communication,
    /// such as connection resets or network timeouts.
    #[error(transparent)]
    IoError(#[from] std::io::Error),

    /// Wraps errors from the hyper HTTP library that may occur while completing
    /// the connection upgrade.
    #[error(transparent)]
    HTTPError(#[from] hyper::Error),

    /// Occurs when serialization of JSON data fails.
    /// Only available when the `json` feature is enabled.
    #[cfg(feature = "json")]
    #[cfg_attr(docsrs, doc(cfg(feature = "json")))]
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
