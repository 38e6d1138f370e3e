//! Message assembly state machine.
//!
//! The [`Assembler`] consumes decoded frames in arrival order and decides, for
//! each one, what the connection must do next: deliver a payload to the text
//! or binary channel, answer a ping, close, or nothing. Transitions are pure
//! functions of `(state, frame)`, which keeps the whole fragmentation protocol
//! testable without any transport.
//!
//! Fragmented messages use streaming delivery: each fragment's payload is
//! handed to the channel as it arrives rather than being buffered until the
//! final frame. The assembler only tracks which message kind the continuation
//! frames belong to. A consequence of this policy is that every text fragment
//! must be valid UTF-8 on its own; a multi-byte scalar split across fragment
//! boundaries is treated as a protocol violation.

use bytes::Bytes;

use crate::{
    frame::{Frame, OpCode},
    Result, WebSocketError,
};

/// The payload kind of an application message.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Binary,
}

/// Assembly state of one connection.
///
/// `Accumulating` means a fragmented message is in progress and carries the
/// opcode of its first frame; continuation frames inherit that kind.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AssemblerState {
    /// No fragmented message is in progress.
    Idle,
    /// A fragmented message of the given kind is being received.
    Accumulating(MessageKind),
}

/// What the connection must do with a processed frame.
#[derive(Debug, PartialEq)]
pub enum Action {
    /// Deliver the payload to the text channel. Validated UTF-8.
    DeliverText(Bytes),
    /// Deliver the payload to the binary channel.
    DeliverBinary(Bytes),
    /// Reply with a pong frame carrying the identical payload.
    Pong(Bytes),
    /// The peer requested closure; echo and tear the connection down.
    Close(Bytes),
    /// Nothing to do (e.g. an unsolicited pong).
    Nothing,
}

/// Per-connection frame-to-message state machine.
///
/// One assembler exists per connection and must see that connection's frames
/// strictly in arrival order; ping/pong and fragmentation semantics depend on
/// it. Control frames may interleave with a fragmented message and do not
/// disturb the accumulation state.
pub struct Assembler {
    state: AssemblerState,
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Assembler {
    pub fn new() -> Self {
        Self {
            state: AssemblerState::Idle,
        }
    }

    /// Returns the current assembly state.
    pub fn state(&self) -> AssemblerState {
        self.state
    }

    /// Processes the next decoded frame and returns the action it mandates.
    ///
    /// # Errors
    /// All errors are fatal to the connection:
    /// - [`WebSocketError::InvalidContinuationFrame`] for a continuation frame
    ///   while no fragmented message is in progress.
    /// - [`WebSocketError::InvalidFragment`] for a new data frame while a
    ///   fragmented message is still incomplete.
    /// - [`WebSocketError::InvalidUTF8`] for a text payload that fails UTF-8
    ///   validation on delivery.
    pub fn accept(&mut self, frame: Frame) -> Result<Action> {
        let fin = frame.fin;
        let opcode = frame.opcode;
        let payload = frame.payload.freeze();

        match opcode {
            OpCode::Text | OpCode::Binary => {
                if self.state != AssemblerState::Idle {
                    return Err(WebSocketError::InvalidFragment);
                }

                let kind = if opcode == OpCode::Text {
                    MessageKind::Text
                } else {
                    MessageKind::Binary
                };

                if !fin {
                    self.state = AssemblerState::Accumulating(kind);
                }

                deliver(kind, payload)
            }
            OpCode::Continuation => {
                let kind = match self.state {
                    AssemblerState::Accumulating(kind) => kind,
                    AssemblerState::Idle => {
                        return Err(WebSocketError::InvalidContinuationFrame);
                    }
                };

                if fin {
                    self.state = AssemblerState::Idle;
                }

                deliver(kind, payload)
            }
            OpCode::Ping => Ok(Action::Pong(payload)),
            OpCode::Pong => Ok(Action::Nothing),
            OpCode::Close => Ok(Action::Close(payload)),
        }
    }
}

/// Maps a payload to its delivery action, validating text chunks.
fn deliver(kind: MessageKind, payload: Bytes) -> Result<Action> {
    match kind {
        MessageKind::Text => {
            #[cfg(not(feature = "simd"))]
            if std::str::from_utf8(&payload).is_err() {
                return Err(WebSocketError::InvalidUTF8);
            }
            #[cfg(feature = "simd")]
            if simdutf8::basic::from_utf8(&payload).is_err() {
                return Err(WebSocketError::InvalidUTF8);
            }

            Ok(Action::DeliverText(payload))
        }
        MessageKind::Binary => Ok(Action::DeliverBinary(payload)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn data(opcode: OpCode, fin: bool, payload: &[u8]) -> Frame {
        Frame::new(fin, opcode, None, BytesMut::from(payload))
    }

    #[test]
    fn test_whole_text_message_delivered() {
        let mut assembler = Assembler::new();
        let action = assembler
            .accept(data(OpCode::Text, true, b"hello"))
            .unwrap();

        assert_eq!(action, Action::DeliverText(Bytes::from_static(b"hello")));
        assert_eq!(assembler.state(), AssemblerState::Idle);
    }

    #[test]
    fn test_whole_binary_message_delivered() {
        let mut assembler = Assembler::new();
        let action = assembler
            .accept(data(OpCode::Binary, true, &[0xDE, 0xAD]))
            .unwrap();

        assert_eq!(
            action,
            Action::DeliverBinary(Bytes::from_static(&[0xDE, 0xAD]))
        );
        assert_eq!(assembler.state(), AssemblerState::Idle);
    }

    #[test]
    fn test_streaming_text_fragments() {
        // [Text fin=false "Hel", Continuation fin=true "lo"] delivers each
        // chunk on arrival and ends back in Idle.
        let mut assembler = Assembler::new();

        let first = assembler.accept(data(OpCode::Text, false, b"Hel")).unwrap();
        assert_eq!(first, Action::DeliverText(Bytes::from_static(b"Hel")));
        assert_eq!(
            assembler.state(),
            AssemblerState::Accumulating(MessageKind::Text)
        );

        let second = assembler
            .accept(data(OpCode::Continuation, true, b"lo"))
            .unwrap();
        assert_eq!(second, Action::DeliverText(Bytes::from_static(b"lo")));
        assert_eq!(assembler.state(), AssemblerState::Idle);
    }

    #[test]
    fn test_multi_fragment_binary_message() {
        let mut assembler = Assembler::new();

        assembler
            .accept(data(OpCode::Binary, false, &[1, 2]))
            .unwrap();
        let middle = assembler
            .accept(data(OpCode::Continuation, false, &[3]))
            .unwrap();
        assert_eq!(middle, Action::DeliverBinary(Bytes::from_static(&[3])));
        assert_eq!(
            assembler.state(),
            AssemblerState::Accumulating(MessageKind::Binary)
        );

        let last = assembler
            .accept(data(OpCode::Continuation, true, &[4, 5]))
            .unwrap();
        assert_eq!(last, Action::DeliverBinary(Bytes::from_static(&[4, 5])));
        assert_eq!(assembler.state(), AssemblerState::Idle);
    }

    #[test]
    fn test_continuation_without_pending_type_is_fatal() {
        let mut assembler = Assembler::new();
        let err = assembler
            .accept(data(OpCode::Continuation, true, b"orphan"))
            .unwrap_err();

        assert!(matches!(err, WebSocketError::InvalidContinuationFrame));
    }

    #[test]
    fn test_new_data_frame_during_fragmented_message_is_fatal() {
        let mut assembler = Assembler::new();
        assembler.accept(data(OpCode::Text, false, b"part")).unwrap();

        let err = assembler
            .accept(data(OpCode::Text, true, b"interloper"))
            .unwrap_err();
        assert!(matches!(err, WebSocketError::InvalidFragment));
    }

    #[test]
    fn test_ping_answers_pong_without_touching_state() {
        let mut assembler = Assembler::new();
        assembler.accept(data(OpCode::Text, false, b"frag")).unwrap();

        let action = assembler.accept(data(OpCode::Ping, true, b"liveness")).unwrap();
        assert_eq!(action, Action::Pong(Bytes::from_static(b"liveness")));
        assert_eq!(
            assembler.state(),
            AssemblerState::Accumulating(MessageKind::Text)
        );

        // The fragmented message still completes normally afterwards.
        let tail = assembler
            .accept(data(OpCode::Continuation, true, b"ment"))
            .unwrap();
        assert_eq!(tail, Action::DeliverText(Bytes::from_static(b"ment")));
    }

    #[test]
    fn test_pong_is_ignored() {
        let mut assembler = Assembler::new();
        let action = assembler.accept(data(OpCode::Pong, true, b"late")).unwrap();
        assert_eq!(action, Action::Nothing);
        assert_eq!(assembler.state(), AssemblerState::Idle);
    }

    #[test]
    fn test_close_terminates_mid_message() {
        let mut assembler = Assembler::new();
        assembler.accept(data(OpCode::Text, false, b"unfini")).unwrap();

        let action = assembler.accept(data(OpCode::Close, true, &[])).unwrap();
        assert_eq!(action, Action::Close(Bytes::new()));
    }

    #[test]
    fn test_invalid_utf8_text_is_fatal() {
        let mut assembler = Assembler::new();
        let err = assembler
            .accept(data(OpCode::Text, true, &[0xFF, 0xFE]))
            .unwrap_err();
        assert!(matches!(err, WebSocketError::InvalidUTF8));
    }

    #[test]
    fn test_invalid_utf8_continuation_chunk_is_fatal() {
        // A code point split across fragments fails per-chunk validation
        // under the streaming delivery policy.
        let mut assembler = Assembler::new();
        let bytes = "é".as_bytes(); // two bytes

        assembler
            .accept(data(OpCode::Text, false, &bytes[..1]))
            .unwrap_err();
    }

    #[test]
    fn test_binary_fragments_skip_utf8_validation() {
        let mut assembler = Assembler::new();
        assembler
            .accept(data(OpCode::Binary, false, &[0xFF, 0xFE]))
            .unwrap();
        let action = assembler
            .accept(data(OpCode::Continuation, true, &[0xFD]))
            .unwrap();
        assert_eq!(action, Action::DeliverBinary(Bytes::from_static(&[0xFD])));
    }
}
