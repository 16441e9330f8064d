// ── HTML-string navigation ────────────────────────────────────────────────────
//
// `load_html` cannot hand a string to the control directly.  Instead the host
// navigates to a neutral placeholder, and once the placeholder document is
// ready it loads a `ContentSource` into it through the persist-from-moniker
// path.  The control then pulls the stored HTML as if it were the network
// response for the base URL.

use tracing::{debug, warn};

use crate::error::{BrowserError, Result};

/// Content type declared for every HTML-string load.
pub const HTML_MIME: &str = "text/html";

/// UTF-8 byte-order mark; lets the control sniff the charset.
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

// ── PendingLoad ───────────────────────────────────────────────────────────────

/// An outstanding `load_html` request.
///
/// At most one exists per host; a new `load_html`/`load_url` replaces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLoad {
    html: String,
    base_url: String,
    delivered: bool,
}

impl PendingLoad {
    pub fn new(html: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            base_url: base_url.into(),
            delivered: false,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_delivered(&self) -> bool {
        self.delivered
    }

    /// Hand the content out for delivery.  Returns `None` once it has been
    /// delivered; the load is consumed exactly once.
    pub fn take_for_delivery(&mut self, chunk_size: usize) -> Option<ContentSource> {
        if self.delivered {
            return None;
        }
        self.delivered = true;
        Some(ContentSource::new(
            Some((self.html.clone(), self.base_url.clone())),
            chunk_size,
        ))
    }
}

// ── ContentSource ─────────────────────────────────────────────────────────────

/// Declared metadata of the supplied stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentHeader {
    pub mime: &'static str,
    pub charset: &'static str,
    pub base_url: String,
}

/// Where a `ContentSource` is in its one-shot lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Streaming,
    Completed,
    Failed,
}

/// Pull-based supplier of the stored HTML.
///
/// `begin` → `next_chunk`* → `complete`; any step out of order moves the
/// source to `Failed` so a navigation aborts instead of hanging.
#[derive(Debug)]
pub struct ContentSource {
    content: Option<(String, String)>,
    chunk_size: usize,
    bytes: Vec<u8>,
    offset: usize,
    state: StreamState,
}

impl ContentSource {
    /// A source for `(html, base_url)`.  `None` models a source queried
    /// before any `load_html` happened.
    pub fn new(content: Option<(String, String)>, chunk_size: usize) -> Self {
        Self {
            content,
            chunk_size: chunk_size.max(1),
            bytes: Vec::new(),
            offset: 0,
            state: StreamState::Idle,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// The display name the control should treat as the document's address.
    pub fn base_url(&self) -> Option<&str> {
        self.content.as_ref().map(|(_, base)| base.as_str())
    }

    /// Start supplying bytes.  Emits the content-type declaration.
    pub fn begin(&mut self) -> Result<ContentHeader> {
        if self.state != StreamState::Idle {
            warn!(state = ?self.state, "content source restarted");
            self.state = StreamState::Failed;
            return Err(BrowserError::NoDocument);
        }
        let Some((html, base_url)) = self.content.as_ref() else {
            debug!("content source queried before load_html");
            self.state = StreamState::Failed;
            return Err(BrowserError::NoDocument);
        };

        let mut bytes = Vec::with_capacity(UTF8_BOM.len() + html.len());
        bytes.extend_from_slice(UTF8_BOM);
        bytes.extend_from_slice(html.as_bytes());
        self.bytes = bytes;
        self.offset = 0;
        self.state = StreamState::Streaming;

        Ok(ContentHeader {
            mime: HTML_MIME,
            charset: "utf-8",
            base_url: base_url.clone(),
        })
    }

    /// Next chunk of at most `chunk_size` bytes, or `None` when the stream is
    /// exhausted (or not streaming).
    pub fn next_chunk(&mut self) -> Option<&[u8]> {
        if self.state != StreamState::Streaming || self.offset >= self.bytes.len() {
            return None;
        }
        let end = (self.offset + self.chunk_size).min(self.bytes.len());
        let chunk = &self.bytes[self.offset..end];
        self.offset = end;
        Some(chunk)
    }

    /// Signal stream-complete.  Fails if called before every byte was pulled.
    pub fn complete(&mut self) -> Result<()> {
        if self.state != StreamState::Streaming || self.offset < self.bytes.len() {
            self.state = StreamState::Failed;
            return Err(BrowserError::NoDocument);
        }
        self.state = StreamState::Completed;
        Ok(())
    }

    /// Abort the stream.
    pub fn fail(&mut self) {
        self.state = StreamState::Failed;
    }

    /// Run the whole begin / supply / complete sequence into `sink`.
    pub fn drain_into(&mut self, sink: &mut Vec<u8>) -> Result<ContentHeader> {
        let header = self.begin()?;
        while let Some(chunk) = self.next_chunk() {
            sink.extend_from_slice(chunk);
        }
        self.complete()?;
        Ok(header)
    }
}

/// Strip the BOM `ContentSource` prefixes, for consumers that decode the
/// stream themselves.
pub fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn source(html: &str, chunk: usize) -> ContentSource {
        ContentSource::new(Some((html.to_owned(), "about:blank".to_owned())), chunk)
    }

    #[test]
    fn drains_html_with_bom_and_header() {
        let mut src = source("<p>héllo</p>", 4);
        let mut out = Vec::new();
        let header = src.drain_into(&mut out).unwrap();
        assert_eq!(header.mime, "text/html");
        assert_eq!(header.base_url, "about:blank");
        assert!(out.starts_with(UTF8_BOM));
        assert_eq!(std::str::from_utf8(strip_bom(&out)).unwrap(), "<p>héllo</p>");
        assert_eq!(src.state(), StreamState::Completed);
    }

    #[test]
    fn chunks_respect_chunk_size() {
        let mut src = source("abcdefgh", 4);
        src.begin().unwrap();
        let sizes: Vec<usize> = std::iter::from_fn(|| src.next_chunk().map(<[u8]>::len)).collect();
        // 3 BOM bytes + 8 content bytes.
        assert_eq!(sizes, vec![4, 4, 3]);
    }

    #[test]
    fn empty_source_fails_instead_of_hanging() {
        let mut src = ContentSource::new(None, 16);
        assert!(matches!(src.begin(), Err(BrowserError::NoDocument)));
        assert_eq!(src.state(), StreamState::Failed);
        assert!(src.next_chunk().is_none());
    }

    #[test]
    fn complete_before_exhausted_fails() {
        let mut src = source("abcdefgh", 2);
        src.begin().unwrap();
        let _ = src.next_chunk();
        assert!(src.complete().is_err());
        assert_eq!(src.state(), StreamState::Failed);
    }

    #[test]
    fn begin_twice_fails() {
        let mut src = source("x", 8);
        src.begin().unwrap();
        assert!(src.begin().is_err());
    }

    #[test]
    fn pending_load_is_delivered_once() {
        let mut pending = PendingLoad::new("<b>x</b>", "http://example.com/");
        assert!(!pending.is_delivered());
        let src = pending.take_for_delivery(64).unwrap();
        assert_eq!(src.base_url(), Some("http://example.com/"));
        assert!(pending.is_delivered());
        assert!(pending.take_for_delivery(64).is_none());
    }
}
