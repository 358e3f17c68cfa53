//! The request boundary: what the hosting HTTP layer hands to this crate.
//!
//! The ingestion path depends on exactly four capabilities: a header
//! map, a readable body stream, the settings map and a localizer. They
//! are fixed here as an explicit struct instead of a framework request
//! type, so any host can construct one.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use http::{HeaderMap, header};
use tokio::io::{AsyncBufRead, AsyncRead, BufReader, ReadBuf};
use tokio_util::io::StreamReader;

use crate::config::Settings;

/// Translation capability supplied by the hosting application.
pub trait Localizer: Send + Sync {
    /// Translate a user-facing message into the request's locale.
    fn translate(&self, text: &str) -> String;
}

/// Pass-through localizer used when no translations are registered.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLocalizer;

impl Localizer for NullLocalizer {
    fn translate(&self, text: &str) -> String {
        text.to_owned()
    }
}

/// Readable request body, positioned at the start of the raw payload.
///
/// Hosts adapt whatever their framework produces: an `AsyncRead`, a
/// stream of [`Bytes`] chunks, or an in-memory buffer.
pub struct Body {
    inner: Pin<Box<dyn AsyncBufRead + Send>>,
}

impl Body {
    /// Wrap any async reader.
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Self {
            inner: Box::pin(BufReader::new(reader)),
        }
    }

    /// Wrap a stream of byte chunks, as produced by axum/hyper bodies.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        Self {
            inner: Box::pin(StreamReader::new(stream)),
        }
    }

    /// Wrap an in-memory buffer. Mostly useful in tests.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self::from_reader(io::Cursor::new(bytes.into()))
    }
}

impl AsyncRead for Body {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.inner.as_mut().poll_read(cx, buf)
    }
}

impl AsyncBufRead for Body {
    fn poll_fill_buf(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<&[u8]>> {
        self.get_mut().inner.as_mut().poll_fill_buf(cx)
    }

    fn consume(mut self: Pin<&mut Self>, amt: usize) {
        self.inner.as_mut().consume(amt);
    }
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Body").finish_non_exhaustive()
    }
}

/// A single inbound request, as constructed by the hosting application.
pub struct Request {
    /// Request headers; the ingestion path only reads `Content-Length`.
    pub headers: HeaderMap,
    /// Raw multipart body stream.
    pub body: Body,
    /// Service configuration attached to this request.
    pub settings: Settings,
    /// Translator for user-facing text.
    pub localizer: Arc<dyn Localizer>,
}

impl Request {
    /// Build a request with the pass-through localizer.
    pub fn new(headers: HeaderMap, body: Body, settings: Settings) -> Self {
        Self {
            headers,
            body,
            settings,
            localizer: Arc::new(NullLocalizer),
        }
    }

    /// Attach a localizer.
    pub fn with_localizer(mut self, localizer: Arc<dyn Localizer>) -> Self {
        self.localizer = localizer;
        self
    }

    /// The declared total body length, if the header is present and sane.
    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .get(header::CONTENT_LENGTH)?
            .to_str()
            .ok()?
            .parse()
            .ok()
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("headers", &self.headers)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Minimal response value produced inside this crate.
///
/// Only the body is decided here; status codes and headers are the
/// hosting application's call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub body: String,
}

impl Response {
    pub fn with_body(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }
}
