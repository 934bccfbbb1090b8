//! Envelope-decoding XML stream
//!
//! Some envelope schemas declare where the business body belongs through an
//! XPath-like body path, but actual instances frequently omit the deeper
//! levels or leave them empty. This decorator follows the matched ancestor
//! chain and, the first time the deepest matched element closes, injects the
//! missing path segments as nested elements so the body location always
//! exists. Decoding happens at most once per stream; empty elements are
//! always expanded to start/end tag pairs so injected content nests
//! correctly.

use crate::error::{Result, SluiceError};
use crate::io::{Backlog, BufferController, Stream};
use crate::xml::{split_qname, Binding, NsScopes};
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use std::io::{self, BufRead, Read};

/// One step of a body path: a local name qualified by a namespace URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodySegment {
    /// Element local name.
    pub local_name: String,
    /// Element namespace URI, possibly empty.
    pub namespace: String,
}

/// Parsed body path, a chain of [`BodySegment`]s from the document root.
#[derive(Debug, Clone)]
pub struct BodyPath {
    segments: Vec<BodySegment>,
}

// the local name must be a non-empty token; the namespace may be empty
const SEGMENT_PATTERN: &str =
    r"/\*\[local-name\(\)='([^'\s]+)'\s+and\s+namespace-uri\(\)='([^']*)'\]";

impl BodyPath {
    /// Parse the `/*[local-name()='N' and namespace-uri()='ns']…` grammar.
    /// The whole expression must consist of such segments, at least one.
    pub fn parse(expression: &str) -> Result<Self> {
        let regex = crate::cache::RegexCache::global().get(SEGMENT_PATTERN)?;
        let mut segments = Vec::new();
        let mut consumed = 0;
        for captures in regex.captures_iter(expression) {
            let whole = captures.get(0).expect("match has a group 0");
            if whole.start() != consumed {
                return Err(SluiceError::MalformedInput(format!(
                    "invalid body path {expression:?}"
                )));
            }
            consumed = whole.end();
            segments.push(BodySegment {
                local_name: captures[1].to_owned(),
                namespace: captures[2].to_owned(),
            });
        }
        if segments.is_empty() || consumed != expression.len() {
            return Err(SluiceError::MalformedInput(format!(
                "invalid body path {expression:?}"
            )));
        }
        Ok(Self { segments })
    }

    /// The segments, root first.
    pub fn segments(&self) -> &[BodySegment] {
        &self.segments
    }
}

/// Injects the missing levels of a body path while the document is read.
pub struct XmlEnvelopeDecodingStream<R: BufRead> {
    reader: Reader<R>,
    writer: Writer<Vec<u8>>,
    path: BodyPath,
    scopes: NsScopes,
    /// Emitted name and prefix of each open element, outermost first.
    open: Vec<(String, Option<String>)>,
    /// How many leading path segments the current ancestor chain matches.
    chain_depth: usize,
    decoded: bool,
    event_buf: Vec<u8>,
    backlog: Backlog,
    done: bool,
}

impl<R: BufRead> XmlEnvelopeDecodingStream<R> {
    /// Wrap `source`, decoding against `path`.
    pub fn new(source: R, path: BodyPath) -> Self {
        Self {
            reader: Reader::from_reader(source),
            writer: Writer::new(Vec::new()),
            path,
            scopes: NsScopes::new(),
            open: Vec::new(),
            chain_depth: 0,
            decoded: false,
            event_buf: Vec::new(),
            backlog: Backlog::new(),
            done: false,
        }
    }

    /// Whether the missing body levels have been reached or injected.
    pub fn is_decoded(&self) -> bool {
        self.decoded
    }

    fn step(&mut self) -> Result<()> {
        let mut buf = std::mem::take(&mut self.event_buf);
        let event = self.reader.read_event_into(&mut buf)?.into_owned();
        buf.clear();
        self.event_buf = buf;

        match event {
            Event::Eof => self.done = true,
            Event::Start(e) => self.open_element(e)?,
            Event::Empty(e) => {
                // expanded so injected segments can nest inside
                self.open_element(e)?;
                self.close_element()?;
            }
            Event::End(_) => self.close_element()?,
            other => self.writer.write_event(other)?,
        }
        Ok(())
    }

    fn open_element(&mut self, e: BytesStart<'static>) -> Result<()> {
        let (prefix, local) = split_qname(e.name().as_ref())?;
        let mut frame: Vec<Binding> = Vec::new();
        for attr in e.attributes() {
            let attr = attr?;
            let key = attr.key.as_ref();
            if key == b"xmlns" {
                frame.push((None, attr.unescape_value()?.into_owned()));
            } else if let Some(rest) = key.strip_prefix(b"xmlns:") {
                let decl_prefix = String::from_utf8(rest.to_vec()).map_err(|_| {
                    SluiceError::MalformedInput("non-UTF-8 namespace prefix".to_owned())
                })?;
                frame.push((Some(decl_prefix), attr.unescape_value()?.into_owned()));
            }
        }
        self.scopes.push_frame(frame);

        if !self.decoded && self.chain_depth == self.open.len() {
            let segment = &self.path.segments[self.chain_depth];
            let uri = self.scopes.resolve(prefix.as_deref());
            if local == segment.local_name && uri == segment.namespace {
                self.chain_depth += 1;
                if self.chain_depth == self.path.segments.len() {
                    // body level reached in the instance itself
                    self.decoded = true;
                }
            }
        }

        let name = match &prefix {
            Some(p) => format!("{p}:{local}"),
            None => local,
        };
        self.writer.write_event(Event::Start(e))?;
        self.open.push((name, prefix));
        Ok(())
    }

    fn close_element(&mut self) -> Result<()> {
        if !self.decoded && self.chain_depth == self.open.len() {
            self.inject_missing_segments()?;
            self.decoded = true;
        }
        let (name, _) = self.open.pop().ok_or_else(|| {
            SluiceError::MalformedInput("unbalanced closing tag".to_owned())
        })?;
        self.writer.write_event(Event::End(BytesEnd::new(name.as_str())))?;
        self.scopes.pop_frame();
        self.chain_depth = self.chain_depth.min(self.open.len());
        Ok(())
    }

    /// The deepest matched element is closing with path levels still missing:
    /// materialize them as nested empty-bodied elements, reusing the
    /// enclosing prefix and redeclaring it only where the in-scope URI
    /// differs.
    fn inject_missing_segments(&mut self) -> Result<()> {
        let prefix = self.open.last().and_then(|(_, p)| p.clone());
        let mut in_scope_uri = self.scopes.resolve(prefix.as_deref()).to_owned();
        log::debug!(
            "injecting {} missing body path segment(s)",
            self.path.segments.len() - self.chain_depth
        );
        let mut pending = Vec::new();
        for segment in &self.path.segments[self.chain_depth..] {
            let name = match &prefix {
                Some(p) => format!("{p}:{}", segment.local_name),
                None => segment.local_name.clone(),
            };
            let mut start = BytesStart::new(name.as_str());
            if in_scope_uri != segment.namespace {
                let decl_key = match &prefix {
                    Some(p) => format!("xmlns:{p}"),
                    None => "xmlns".to_owned(),
                };
                start.push_attribute((decl_key.as_str(), segment.namespace.as_str()));
                in_scope_uri = segment.namespace.clone();
            }
            self.writer.write_event(Event::Start(start))?;
            pending.push(name);
        }
        for name in pending.iter().rev() {
            self.writer.write_event(Event::End(BytesEnd::new(name.as_str())))?;
        }
        Ok(())
    }
}

impl<R: BufRead> Read for XmlEnvelopeDecodingStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut controller = BufferController::new(buf);
        controller.drain_backlog(&mut self.backlog);
        while controller.availability() > 0 && !self.done {
            self.step().map_err(SluiceError::into_io)?;
            let produced = std::mem::take(self.writer.get_mut());
            controller.append(&produced, &mut self.backlog);
        }
        Ok(controller.count())
    }
}

impl<R: BufRead> Stream for XmlEnvelopeDecodingStream<R> {}
