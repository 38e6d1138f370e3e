//! The per-connection driver.
//!
//! [`WebSocket`] owns one upgraded byte stream and everything layered on it:
//! the framed codec, the message assembler and the outbound queue the
//! channels feed. [`WebSocket::run`] is the connection loop; it processes
//! frames strictly in arrival order and terminates when the peer closes, a
//! protocol rule is violated, or the transport fails.

use std::{collections::VecDeque, sync::Arc};

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
};
use tokio_util::codec::Framed;

use crate::{
    assembler::{Action, Assembler},
    channel::{channel_pair, BinaryChannel, FrameSender, TextChannel},
    close::CloseCode,
    codec::{Codec, Role},
    frame::{Frame, FrameView},
    Result, WebSocketError,
};

/// The maximum allowed payload size for reading, set to 1 MiB.
///
/// Frames with a payload size larger than this limit will be rejected to
/// ensure memory safety and prevent excessively large messages from impacting
/// performance.
pub const MAX_PAYLOAD_READ: usize = 1024 * 1024;

/// One event per loop iteration: either the application queued an outbound
/// message or the transport produced (or failed to produce) a frame.
enum Event {
    Outbound(Option<FrameView>),
    Inbound(Option<Result<Frame>>),
}

/// A live WebSocket connection over an upgraded byte stream.
///
/// Obtained from an [`UpgradeFut`](crate::UpgradeFut), or directly from
/// [`WebSocket::from_stream`] when the transport is established by other
/// means. Register callbacks on [`text`](Self::text) and
/// [`binary`](Self::binary) before calling [`run`](Self::run); the channels
/// stay valid (cloneable, sendable) while the loop runs and fail with
/// [`WebSocketError::ConnectionClosed`] once it has finished.
pub struct WebSocket<S> {
    stream: Framed<S, Codec>,
    assembler: Assembler,
    text: TextChannel,
    binary: BinaryChannel,
    rx: mpsc::UnboundedReceiver<FrameView>,
    obligated_sends: VecDeque<Frame>,
    // Keeps the channels' weak send handles alive for the lifetime of the loop.
    _outbound: Arc<FrameSender>,
}

impl<S> WebSocket<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(role: Role, stream: S, max_payload_read: usize) -> Self {
        let codec = Codec::new(role, max_payload_read);
        let (outbound, rx, text, binary) = channel_pair();

        Self {
            stream: Framed::new(stream, codec),
            assembler: Assembler::new(),
            text,
            binary,
            rx,
            obligated_sends: VecDeque::new(),
            _outbound: outbound,
        }
    }

    /// Creates a connection over an already-established byte stream, skipping
    /// the HTTP handshake. The caller is responsible for having negotiated the
    /// upgrade by other means.
    pub fn from_stream(role: Role, stream: S) -> Self {
        Self::new(role, stream, MAX_PAYLOAD_READ)
    }

    /// Returns a handle to the text channel of this connection.
    pub fn text(&self) -> TextChannel {
        self.text.clone()
    }

    /// Returns a handle to the binary channel of this connection.
    pub fn binary(&self) -> BinaryChannel {
        self.binary.clone()
    }

    /// Drives the connection until it terminates.
    ///
    /// The loop decodes inbound bytes into frames, dispatches them through the
    /// assembler (delivering payloads to the channel callbacks and queueing
    /// protocol-mandated replies such as pongs), and writes application
    /// messages queued by the channels back to the transport. Frame processing
    /// within the connection is strictly sequential.
    ///
    /// # Returns
    /// - `Ok(())` after an orderly close initiated by the peer.
    /// - `Err(_)` on protocol violations, transport failures or abrupt peer
    ///   disconnect. The same error is reported to the channel error callbacks
    ///   before this returns.
    pub async fn run(mut self) -> Result<()> {
        loop {
            // Protocol-mandated replies go out ahead of any new input.
            while let Some(frame) = self.obligated_sends.pop_front() {
                if let Err(err) = self.stream.send(frame).await {
                    return self.teardown(err).await;
                }
            }

            let event = tokio::select! {
                view = self.rx.recv() => Event::Outbound(view),
                frame = self.stream.next() => Event::Inbound(frame),
            };

            match event {
                Event::Outbound(Some(view)) => {
                    if let Err(err) = self.stream.send(Frame::from(view)).await {
                        return self.teardown(err).await;
                    }
                }
                // Cannot happen while `_outbound` is held, and harmless if it did.
                Event::Outbound(None) => continue,
                Event::Inbound(None) => {
                    // Peer went away without a close frame.
                    return self.teardown(WebSocketError::ConnectionClosed).await;
                }
                Event::Inbound(Some(Err(err))) => {
                    return self.teardown(err).await;
                }
                Event::Inbound(Some(Ok(frame))) => match self.assembler.accept(frame) {
                    Ok(Action::DeliverText(payload)) => match String::from_utf8(Vec::from(payload))
                    {
                        Ok(text) => self.text.deliver(text),
                        // The assembler validated the bytes already.
                        Err(_) => return self.teardown(WebSocketError::InvalidUTF8).await,
                    },
                    Ok(Action::DeliverBinary(payload)) => self.binary.deliver(payload),
                    Ok(Action::Pong(payload)) => {
                        self.obligated_sends.push_back(Frame::pong(&payload[..]));
                    }
                    Ok(Action::Close(payload)) => {
                        if let Err(err) = validate_close(&payload) {
                            return self.teardown(err).await;
                        }
                        return self.close(payload).await;
                    }
                    Ok(Action::Nothing) => {}
                    Err(err) => return self.teardown(err).await,
                },
            }
        }
    }

    /// Echoes the peer's close frame and shuts the transport down.
    async fn close(mut self, payload: Bytes) -> Result<()> {
        #[cfg(feature = "logging")]
        log::debug!("peer initiated close ({} byte payload)", payload.len());

        let _ = self.stream.send(Frame::close_raw(payload)).await;
        let _ = self.stream.close().await;

        Ok(())
    }

    /// Tears the connection down on a fatal error: sends a coded close frame
    /// on a best-effort basis, reports the error to both channel callbacks and
    /// propagates it.
    async fn teardown(mut self, err: WebSocketError) -> Result<()> {
        let code = match err {
            WebSocketError::FrameTooLarge => CloseCode::Size,
            WebSocketError::InvalidOpCode(_) => CloseCode::Unsupported,
            WebSocketError::InvalidUTF8 => CloseCode::Invalid,
            WebSocketError::ReservedBitsNotZero
            | WebSocketError::ControlFrameFragmented
            | WebSocketError::PingFrameTooLarge
            | WebSocketError::InvalidFragment
            | WebSocketError::InvalidContinuationFrame
            | WebSocketError::InvalidCloseFrame
            | WebSocketError::InvalidCloseCode => CloseCode::Protocol,
            _ => CloseCode::Error,
        };

        #[cfg(feature = "logging")]
        log::debug!("connection teardown: {err}");

        let _ = self.stream.send(Frame::close(code, err.to_string())).await;
        let _ = self.stream.close().await;

        self.text.report_error(&err);
        self.binary.report_error(&err);

        Err(err)
    }
}

/// Validates an inbound close frame payload: empty is fine, one byte is
/// malformed, otherwise the code must be allowed on the wire and the reason
/// must be UTF-8.
fn validate_close(payload: &Bytes) -> Result<()> {
    match payload.len() {
        0 => Ok(()),
        1 => Err(WebSocketError::InvalidCloseFrame),
        _ => {
            let code = CloseCode::from(u16::from_be_bytes([payload[0], payload[1]]));
            if !code.is_allowed() {
                return Err(WebSocketError::InvalidCloseCode);
            }
            std::str::from_utf8(&payload[2..])
                .map(|_| ())
                .map_err(|_| WebSocketError::InvalidUTF8)
        }
    }
}
