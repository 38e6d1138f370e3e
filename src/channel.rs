//! Application-facing message channels.
//!
//! Each upgraded connection exposes two independent channels layered over the
//! same transport: a [`TextChannel`] for UTF-8 messages and a [`BinaryChannel`]
//! for raw bytes. Channels are callback-driven: register an `on_message`
//! handler to receive inbound payloads (invoked from the connection's
//! processing context, in arrival order) and an `on_error` handler for
//! transport failures, which are reported there rather than thrown across the
//! channel boundary.
//!
//! Channels hold only a weak reference to the connection's outbound frame
//! queue. Once the connection loop terminates, the queue is dropped and every
//! subsequent `send` fails synchronously with
//! [`WebSocketError::ConnectionClosed`]; a channel never keeps a dead
//! connection's resources alive.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::{frame::FrameView, Result, WebSocketError};

/// Owning handle to the connection's outbound frame queue.
///
/// Held strongly by the connection loop and weakly by the channels; dropping
/// the loop therefore invalidates all channel send handles at once.
pub(crate) struct FrameSender {
    tx: mpsc::UnboundedSender<FrameView>,
}

impl FrameSender {
    fn send(&self, view: FrameView) -> Result<()> {
        self.tx
            .send(view)
            .map_err(|_| WebSocketError::ConnectionClosed)
    }
}

type MessageFn<T> = Box<dyn FnMut(T) + Send>;
type ErrorFn = Box<dyn FnMut(&WebSocketError) + Send>;

struct Handlers<T> {
    message: Option<MessageFn<T>>,
    error: Option<ErrorFn>,
}

struct ChannelCore<T> {
    handlers: Mutex<Handlers<T>>,
    outbound: Weak<FrameSender>,
}

impl<T> ChannelCore<T> {
    fn new(outbound: Weak<FrameSender>) -> Self {
        Self {
            handlers: Mutex::new(Handlers {
                message: None,
                error: None,
            }),
            outbound,
        }
    }

    fn handlers(&self) -> MutexGuard<'_, Handlers<T>> {
        // A poisoned lock only means a callback panicked; the handler table
        // itself is still usable.
        self.handlers.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn send(&self, view: FrameView) -> Result<()> {
        match self.outbound.upgrade() {
            Some(sender) => sender.send(view),
            None => Err(WebSocketError::ConnectionClosed),
        }
    }

    fn deliver(&self, message: T) {
        if let Some(callback) = self.handlers().message.as_mut() {
            callback(message);
        }
    }

    fn report_error(&self, err: &WebSocketError) {
        if let Some(callback) = self.handlers().error.as_mut() {
            callback(err);
        }
    }
}

/// The text endpoint of an upgraded connection.
///
/// Inbound text payloads (whole messages, or per-fragment chunks of a
/// fragmented message) arrive on the registered `on_message` callback as
/// validated `String`s. Outbound messages are sent as single text frames.
///
/// Cloning is cheap and clones share the same callbacks and connection.
#[derive(Clone)]
pub struct TextChannel {
    inner: Arc<ChannelCore<String>>,
}

impl TextChannel {
    /// Registers the inbound message callback, replacing any previous one.
    ///
    /// The callback is invoked once per delivered payload, in arrival order,
    /// from the connection's processing context. It is never invoked with a
    /// partial or invalid string.
    pub fn on_message(&self, callback: impl FnMut(String) + Send + 'static) {
        self.inner.handlers().message = Some(Box::new(callback));
    }

    /// Registers the error callback, replacing any previous one.
    ///
    /// Transport and protocol errors that tear the connection down are
    /// reported here.
    pub fn on_error(&self, callback: impl FnMut(&WebSocketError) + Send + 'static) {
        self.inner.handlers().error = Some(Box::new(callback));
    }

    /// Sends a whole text message as a single frame.
    ///
    /// # Errors
    /// Fails with [`WebSocketError::ConnectionClosed`] if the connection has
    /// already shut down.
    pub fn send(&self, text: impl Into<String>) -> Result<()> {
        self.inner.send(FrameView::text(text.into()))
    }

    /// Serializes `data` to JSON and sends it as a text message.
    #[cfg(feature = "json")]
    #[cfg_attr(docsrs, doc(cfg(feature = "json")))]
    pub fn send_json<T: serde::Serialize>(&self, data: &T) -> Result<()> {
        let bytes = serde_json::to_vec(data)?;
        self.inner.send(FrameView::text(bytes))
    }

    pub(crate) fn deliver(&self, message: String) {
        self.inner.deliver(message);
    }

    pub(crate) fn report_error(&self, err: &WebSocketError) {
        self.inner.report_error(err);
    }
}

/// The binary endpoint of an upgraded connection.
///
/// The counterpart of [`TextChannel`] for raw byte payloads; no content
/// validation is applied in either direction.
#[derive(Clone)]
pub struct BinaryChannel {
    inner: Arc<ChannelCore<Bytes>>,
}

impl BinaryChannel {
    /// Registers the inbound message callback, replacing any previous one.
    pub fn on_message(&self, callback: impl FnMut(Bytes) + Send + 'static) {
        self.inner.handlers().message = Some(Box::new(callback));
    }

    /// Registers the error callback, replacing any previous one.
    pub fn on_error(&self, callback: impl FnMut(&WebSocketError) + Send + 'static) {
        self.inner.handlers().error = Some(Box::new(callback));
    }

    /// Sends a whole binary message as a single frame.
    ///
    /// # Errors
    /// Fails with [`WebSocketError::ConnectionClosed`] if the connection has
    /// already shut down.
    pub fn send(&self, payload: impl Into<Bytes>) -> Result<()> {
        self.inner.send(FrameView::binary(payload.into()))
    }

    pub(crate) fn deliver(&self, message: Bytes) {
        self.inner.deliver(message);
    }

    pub(crate) fn report_error(&self, err: &WebSocketError) {
        self.inner.report_error(err);
    }
}

/// Creates the outbound queue and the channel pair referencing it weakly.
///
/// Returns the strong queue handle (owned by the connection loop), the queue
/// receiver, and the two channels.
pub(crate) fn channel_pair() -> (
    Arc<FrameSender>,
    mpsc::UnboundedReceiver<FrameView>,
    TextChannel,
    BinaryChannel,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sender = Arc::new(FrameSender { tx });

    let text = TextChannel {
        inner: Arc::new(ChannelCore::new(Arc::downgrade(&sender))),
    };
    let binary = BinaryChannel {
        inner: Arc::new(ChannelCore::new(Arc::downgrade(&sender))),
    };

    (sender, rx, text, binary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OpCode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_send_routes_through_queue() {
        let (_sender, mut rx, text, binary) = channel_pair();

        text.send("hello").unwrap();
        binary.send(Bytes::from_static(&[1, 2, 3])).unwrap();

        let first = rx.try_recv().unwrap();
        assert_eq!(first.opcode, OpCode::Text);
        assert_eq!(first.payload, Bytes::from_static(b"hello"));

        let second = rx.try_recv().unwrap();
        assert_eq!(second.opcode, OpCode::Binary);
        assert_eq!(second.payload, Bytes::from_static(&[1, 2, 3]));
    }

    #[test]
    fn test_send_after_connection_dropped() {
        let (sender, _rx, text, binary) = channel_pair();
        drop(sender);

        assert!(matches!(
            text.send("too late"),
            Err(WebSocketError::ConnectionClosed)
        ));
        assert!(matches!(
            binary.send(Bytes::new()),
            Err(WebSocketError::ConnectionClosed)
        ));
    }

    #[test]
    fn test_delivery_invokes_callback_in_order() {
        let (_sender, _rx, text, _binary) = channel_pair();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        text.on_message(move |msg| sink.lock().unwrap().push(msg));

        text.deliver("one".into());
        text.deliver("two".into());

        assert_eq!(*seen.lock().unwrap(), vec!["one", "two"]);
    }

    #[test]
    fn test_delivery_without_callback_is_dropped() {
        let (_sender, _rx, text, _binary) = channel_pair();
        // no callback registered; must not panic
        text.deliver("ignored".into());
    }

    #[test]
    fn test_error_callback() {
        let (_sender, _rx, _text, binary) = channel_pair();

        let count = Arc::new(AtomicUsize::new(0));
        let hits = Arc::clone(&count);
        binary.on_error(move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
        });

        binary.report_error(&WebSocketError::ConnectionClosed);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_send_json() {
        #[derive(serde::Serialize)]
        struct Ping {
            seq: u32,
        }

        let (_sender, mut rx, text, _binary) = channel_pair();
        text.send_json(&Ping { seq: 7 }).unwrap();

        let view = rx.try_recv().unwrap();
        assert_eq!(view.opcode, OpCode::Text);
        assert_eq!(view.as_str(), r#"{"seq":7}"#);
    }
}
