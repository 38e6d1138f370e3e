//! HTTP upgrade handshake.
//!
//! [`upgrade`] is the single entry point for inbound requests: it either
//! accepts the request as a WebSocket handshake (returning the `101 Switching
//! Protocols` response to send plus a future resolving to the live
//! connection), or signals that the request is not an upgrade request at all
//! and should be handled by whatever serves plain HTTP. Declining is a
//! pass-through, never an error.

use http_body_util::Empty;
use hyper::{body::Bytes, header, upgrade::Upgraded, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use pin_project::pin_project;
use sha1::{Digest, Sha1};

use std::{
    future::Future,
    pin::Pin,
    task::{ready, Context, Poll},
};

use crate::{
    codec::Role,
    connection::{WebSocket, MAX_PAYLOAD_READ},
    Result,
};

/// Type alias for HTTP responses used during WebSocket upgrade.
///
/// The body is empty, which is standard for WebSocket upgrades as the
/// connection transitions from HTTP to the WebSocket protocol once the
/// handshake response has been flushed.
pub type HttpResponse = Response<Empty<Bytes>>;

/// Configuration for an upgraded connection.
#[derive(Debug, Default, Clone)]
pub struct Options {
    /// Maximum accepted inbound frame payload size. Defaults to
    /// [`MAX_PAYLOAD_READ`](crate::MAX_PAYLOAD_READ).
    pub max_payload_read: Option<usize>,
}

impl Options {
    /// Sets the maximum accepted inbound frame payload size.
    pub fn max_payload_read(mut self, size: usize) -> Self {
        self.max_payload_read = Some(size);
        self
    }
}

/// Outcome of attempting to upgrade an inbound request.
pub enum UpgradeOutcome {
    /// The request is a valid WebSocket handshake. Send `response` to the
    /// client and await `fut` for the live connection.
    Accepted {
        response: HttpResponse,
        fut: UpgradeFut,
    },
    /// The request is not an upgrade request; hand it to the regular HTTP
    /// pipeline unmodified.
    PassThrough,
}

/// Attempts to upgrade an inbound HTTP request to a WebSocket connection.
///
/// Validates the handshake requirements (GET method, `Upgrade: websocket`,
/// `Connection: Upgrade`, an integral `Sec-WebSocket-Version` and a
/// `Sec-WebSocket-Key`). Any failed check yields
/// [`UpgradeOutcome::PassThrough`].
pub fn upgrade<B>(request: &mut Request<B>) -> Result<UpgradeOutcome> {
    upgrade_with_options(request, Options::default())
}

/// Like [`upgrade`], with explicit connection options.
pub fn upgrade_with_options<B>(
    request: &mut Request<B>,
    options: Options,
) -> Result<UpgradeOutcome> {
    if request.method() != Method::GET {
        return Ok(UpgradeOutcome::PassThrough);
    }

    let headers = request.headers();

    let upgrade_ok = headers
        .get(header::UPGRADE)
        .and_then(|h| h.to_str().ok())
        .map(|h| h.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);

    // `Connection` is matched verbatim, as the pre-RFC servers this handshake
    // stays compatible with did.
    let connection_ok = headers
        .get(header::CONNECTION)
        .and_then(|h| h.to_str().ok())
        .map(|h| h == "Upgrade")
        .unwrap_or(false);

    let version = headers
        .get(header::SEC_WEBSOCKET_VERSION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.parse::<i32>().ok());

    let key = headers.get(header::SEC_WEBSOCKET_KEY);

    let (Some(version), Some(key)) = (version, key) else {
        return Ok(UpgradeOutcome::PassThrough);
    };

    if !upgrade_ok || !connection_ok {
        return Ok(UpgradeOutcome::PassThrough);
    }

    let accept = sec_websocket_accept(key.as_bytes());

    #[cfg(feature = "logging")]
    log::debug!("accepting websocket handshake (version {version})");

    let builder = Response::builder()
        .status(StatusCode::SWITCHING_PROTOCOLS)
        .header(header::UPGRADE, "websocket")
        .header(header::CONNECTION, "Upgrade");

    // Clients announcing a version beyond 13 are answered in the legacy draft
    // style: the accept value travels in `Sec-WebSocket-Key` together with the
    // version the server actually speaks. Kept verbatim for compatibility.
    let response = if version > 13 {
        builder
            .header(header::SEC_WEBSOCKET_VERSION, "13")
            .header(header::SEC_WEBSOCKET_KEY, accept)
    } else {
        builder.header(header::SEC_WEBSOCKET_ACCEPT, accept)
    }
    .body(Empty::new())
    .expect("bug: failed to build response");

    let fut = UpgradeFut {
        inner: hyper::upgrade::on(request),
        max_payload_read: options.max_payload_read.unwrap_or(MAX_PAYLOAD_READ),
    };

    Ok(UpgradeOutcome::Accepted { response, fut })
}

/// Computes the `Sec-WebSocket-Accept` credential for a client key.
fn sec_websocket_accept(key: &[u8]) -> String {
    use base64::prelude::*;
    let mut sha1 = Sha1::new();
    sha1.update(key);
    sha1.update(b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11"); // magic string
    let result = sha1.finalize();
    BASE64_STANDARD.encode(&result[..])
}

/// Future that completes the WebSocket upgrade on the server, yielding the
/// live connection once the `101` response has been flushed and hyper has
/// handed over the raw byte stream.
///
/// # Example
/// ```no_run
/// use wschan::{UpgradeFut, UpgradeOutcome};
/// use hyper::{body::Incoming, Request};
///
/// async fn handle_client(fut: UpgradeFut) -> wschan::Result<()> {
///     let ws = fut.await?;
///     ws.text().on_message(|msg| println!("{msg}"));
///     ws.run().await
/// }
/// ```
#[pin_project]
#[derive(Debug)]
pub struct UpgradeFut {
    #[pin]
    inner: hyper::upgrade::OnUpgrade,
    max_payload_read: usize,
}

impl Future for UpgradeFut {
    type Output = Result<WebSocket<TokioIo<Upgraded>>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let upgraded = ready!(this.inner.poll(cx))?;

        Poll::Ready(Ok(WebSocket::new(
            Role::Server,
            TokioIo::new(upgraded),
            *this.max_payload_read,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Sample key and accept value from RFC 6455 section 1.3.
    const SAMPLE_KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";
    const SAMPLE_ACCEPT: &str = "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=";

    fn handshake_request(version: &str) -> Request<Empty<Bytes>> {
        Request::builder()
            .method(Method::GET)
            .uri("/ws")
            .header(header::UPGRADE, "websocket")
            .header(header::CONNECTION, "Upgrade")
            .header(header::SEC_WEBSOCKET_KEY, SAMPLE_KEY)
            .header(header::SEC_WEBSOCKET_VERSION, version)
            .body(Empty::new())
            .unwrap()
    }

    #[test]
    fn test_accept_key_computation() {
        assert_eq!(sec_websocket_accept(SAMPLE_KEY.as_bytes()), SAMPLE_ACCEPT);
    }

    #[test]
    fn test_upgrade_version_13_uses_accept_header() {
        let mut req = handshake_request("13");
        let UpgradeOutcome::Accepted { response, .. } = upgrade(&mut req).unwrap() else {
            panic!("expected handshake acceptance");
        };

        assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);
        let headers = response.headers();
        assert_eq!(headers.get(header::UPGRADE).unwrap(), "websocket");
        assert_eq!(headers.get(header::CONNECTION).unwrap(), "Upgrade");
        assert_eq!(
            headers.get(header::SEC_WEBSOCKET_ACCEPT).unwrap(),
            SAMPLE_ACCEPT
        );
        assert!(headers.get(header::SEC_WEBSOCKET_KEY).is_none());
        assert!(headers.get(header::SEC_WEBSOCKET_VERSION).is_none());
    }

    #[test]
    fn test_upgrade_legacy_version_branch() {
        // Versions beyond 13 get the draft-style response: the accept value
        // travels in Sec-WebSocket-Key alongside the supported version.
        let mut req = handshake_request("14");
        let UpgradeOutcome::Accepted { response, .. } = upgrade(&mut req).unwrap() else {
            panic!("expected handshake acceptance");
        };

        let headers = response.headers();
        assert_eq!(
            headers.get(header::SEC_WEBSOCKET_KEY).unwrap(),
            SAMPLE_ACCEPT
        );
        assert_eq!(headers.get(header::SEC_WEBSOCKET_VERSION).unwrap(), "13");
        assert!(headers.get(header::SEC_WEBSOCKET_ACCEPT).is_none());
    }

    #[test]
    fn test_old_draft_version_uses_accept_header() {
        let mut req = handshake_request("8");
        let UpgradeOutcome::Accepted { response, .. } = upgrade(&mut req).unwrap() else {
            panic!("expected handshake acceptance");
        };
        assert!(response.headers().get(header::SEC_WEBSOCKET_ACCEPT).is_some());
    }

    #[test]
    fn test_non_get_passes_through() {
        let mut req = handshake_request("13");
        *req.method_mut() = Method::POST;
        assert!(matches!(
            upgrade(&mut req).unwrap(),
            UpgradeOutcome::PassThrough
        ));
    }

    #[test]
    fn test_missing_key_passes_through() {
        let mut req = handshake_request("13");
        req.headers_mut().remove(header::SEC_WEBSOCKET_KEY);
        assert!(matches!(
            upgrade(&mut req).unwrap(),
            UpgradeOutcome::PassThrough
        ));
    }

    #[test]
    fn test_non_numeric_version_passes_through() {
        let mut req = handshake_request("latest");
        assert!(matches!(
            upgrade(&mut req).unwrap(),
            UpgradeOutcome::PassThrough
        ));
    }

    #[test]
    fn test_wrong_upgrade_header_passes_through() {
        let mut req = handshake_request("13");
        req.headers_mut()
            .insert(header::UPGRADE, "h2c".parse().unwrap());
        assert!(matches!(
            upgrade(&mut req).unwrap(),
            UpgradeOutcome::PassThrough
        ));
    }

    #[test]
    fn test_upgrade_header_is_case_insensitive() {
        let mut req = handshake_request("13");
        req.headers_mut()
            .insert(header::UPGRADE, "WebSocket".parse().unwrap());
        assert!(matches!(
            upgrade(&mut req).unwrap(),
            UpgradeOutcome::Accepted { .. }
        ));
    }

    #[test]
    fn test_connection_header_is_matched_verbatim() {
        let mut req = handshake_request("13");
        req.headers_mut()
            .insert(header::CONNECTION, "upgrade".parse().unwrap());
        assert!(matches!(
            upgrade(&mut req).unwrap(),
            UpgradeOutcome::PassThrough
        ));
    }
}
