//! Namespace-translating XML stream
//!
//! Parses the source as XML and rewrites namespace URIs on the fly through a
//! [`TranslationSet`]. Element namespaces are always translated; attribute
//! namespaces only when opted in, matching the historically asymmetric
//! defaults of the wire formats this targets. A URI translated to the empty
//! string removes the namespace: its declaration is dropped and prefixes
//! resolving to it are stripped. A rule mapping the empty namespace onto a
//! real one introduces the missing default declaration.

use crate::error::{Result, SluiceError};
use crate::io::{Backlog, BufferController, Stream};
use crate::xml::{split_qname, Binding, NsScopes, TranslationSet};
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::name::QName;
use quick_xml::{Reader, Writer};
use std::borrow::Cow;
use std::io::{self, BufRead, Read};

/// Knobs of [`XmlTranslatorStream`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TranslationOptions {
    /// Also translate the namespaces of prefixed attributes. Off by default;
    /// unprefixed attributes carry no namespace and are never touched.
    pub translate_attribute_namespaces: bool,
    /// Drop the XML declaration instead of rewriting its encoding label.
    pub absorb_xml_declaration: bool,
}

enum ParsedAttr {
    DefaultDecl { uri: String },
    PrefixDecl { prefix: String, uri: String },
    Regular { key: Vec<u8>, value: Vec<u8> },
}

enum OutAttr {
    /// Key/value pair whose value still needs escaping.
    Escaped(String, String),
    /// Raw bytes passed through exactly as read.
    Raw(Vec<u8>, Vec<u8>),
}

/// Rewrites namespace URIs while the wrapped XML document is read.
pub struct XmlTranslatorStream<R: BufRead> {
    reader: Reader<R>,
    writer: Writer<Vec<u8>>,
    set: TranslationSet,
    options: TranslationOptions,
    scopes: NsScopes,
    /// Default namespace in force in the output, one entry per open element.
    out_defaults: Vec<String>,
    /// Emitted element names, so end tags match even after prefix stripping.
    open: Vec<String>,
    event_buf: Vec<u8>,
    backlog: Backlog,
    done: bool,
}

impl<R: BufRead> XmlTranslatorStream<R> {
    /// Wrap `source`, translating with `set` under default options.
    pub fn new(source: R, set: TranslationSet) -> Self {
        Self::with_options(source, set, TranslationOptions::default())
    }

    /// Wrap `source` with explicit [`TranslationOptions`].
    pub fn with_options(source: R, set: TranslationSet, options: TranslationOptions) -> Self {
        Self {
            reader: Reader::from_reader(source),
            writer: Writer::new(Vec::new()),
            set,
            options,
            scopes: NsScopes::new(),
            out_defaults: Vec::new(),
            open: Vec::new(),
            event_buf: Vec::new(),
            backlog: Backlog::new(),
            done: false,
        }
    }

    fn step(&mut self) -> Result<()> {
        let mut buf = std::mem::take(&mut self.event_buf);
        let event = self.reader.read_event_into(&mut buf)?.into_owned();
        buf.clear();
        self.event_buf = buf;

        match event {
            Event::Eof => self.done = true,
            Event::Decl(decl) => self.rewrite_declaration(&decl)?,
            Event::Start(e) => self.translate_element(e, false)?,
            Event::Empty(e) => self.translate_element(e, true)?,
            Event::End(_) => {
                let name = self.open.pop().ok_or_else(|| {
                    SluiceError::MalformedInput("unbalanced closing tag".to_owned())
                })?;
                self.writer.write_event(Event::End(BytesEnd::new(name.as_str())))?;
                self.scopes.pop_frame();
                self.out_defaults.pop();
            }
            other => self.writer.write_event(other)?,
        }
        Ok(())
    }

    fn rewrite_declaration(&mut self, decl: &BytesDecl<'_>) -> Result<()> {
        if self.options.absorb_xml_declaration {
            return Ok(());
        }
        let version = String::from_utf8_lossy(&decl.version()?).into_owned();
        let standalone = match decl.standalone() {
            Some(value) => Some(String::from_utf8_lossy(&value?).into_owned()),
            None => None,
        };
        // output is always serialized as UTF-8
        let out = BytesDecl::new(&version, Some("utf-8"), standalone.as_deref());
        self.writer.write_event(Event::Decl(out))?;
        Ok(())
    }

    fn translate_element(&mut self, e: BytesStart<'static>, empty: bool) -> Result<()> {
        let (prefix, local) = split_qname(e.name().as_ref())?;

        let mut parsed = Vec::new();
        for attr in e.attributes() {
            let attr = attr?;
            let key = attr.key.as_ref().to_vec();
            if key == b"xmlns" {
                parsed.push(ParsedAttr::DefaultDecl {
                    uri: attr.unescape_value()?.into_owned(),
                });
            } else if let Some(rest) = key.strip_prefix(b"xmlns:") {
                parsed.push(ParsedAttr::PrefixDecl {
                    prefix: String::from_utf8(rest.to_vec()).map_err(|_| {
                        SluiceError::MalformedInput("non-UTF-8 namespace prefix".to_owned())
                    })?,
                    uri: attr.unescape_value()?.into_owned(),
                });
            } else {
                parsed.push(ParsedAttr::Regular {
                    key,
                    value: attr.value.into_owned(),
                });
            }
        }

        // declarations bind for the element itself and everything below it,
        // regardless of attribute order
        let frame: Vec<Binding> = parsed
            .iter()
            .filter_map(|pa| match pa {
                ParsedAttr::DefaultDecl { uri } => Some((None, uri.clone())),
                ParsedAttr::PrefixDecl { prefix, uri } => Some((Some(prefix.clone()), uri.clone())),
                ParsedAttr::Regular { .. } => None,
            })
            .collect();
        self.scopes.push_frame(frame);

        // prefixes still referenced by attributes that keep their
        // qualification; their binding must survive namespace removal or the
        // output would use an undeclared prefix
        let mut retained_prefixes: Vec<String> = Vec::new();
        for pa in &parsed {
            if let ParsedAttr::Regular { key, .. } = pa {
                let (aprefix, _) = split_qname(key)?;
                let Some(aprefix) = aprefix else { continue };
                if aprefix == "xml" {
                    continue;
                }
                let keeps_prefix = !self.options.translate_attribute_namespaces
                    || !self
                        .set
                        .translate(self.scopes.resolve(Some(&aprefix)))
                        .is_empty();
                if keeps_prefix && !retained_prefixes.contains(&aprefix) {
                    retained_prefixes.push(aprefix);
                }
            }
        }

        let parent_default = self.out_defaults.last().cloned().unwrap_or_default();
        let mut out_default = parent_default.clone();
        let mut out_attrs = Vec::new();
        for pa in parsed {
            match pa {
                ParsedAttr::DefaultDecl { uri } => {
                    let translated = self.set.translate(&uri);
                    if translated.is_empty() {
                        // removal: only re-declare emptiness when a default
                        // was in force around this element
                        if !parent_default.is_empty() {
                            out_attrs.push(OutAttr::Escaped("xmlns".to_owned(), String::new()));
                        }
                    } else {
                        out_attrs.push(OutAttr::Escaped("xmlns".to_owned(), translated.clone()));
                    }
                    out_default = translated;
                }
                ParsedAttr::PrefixDecl { prefix, uri } => {
                    let translated = self.set.translate(&uri);
                    if !translated.is_empty() {
                        out_attrs.push(OutAttr::Escaped(format!("xmlns:{prefix}"), translated));
                    } else if retained_prefixes.contains(&prefix) {
                        // attributes left in the source namespace keep the
                        // original binding
                        out_attrs.push(OutAttr::Escaped(format!("xmlns:{prefix}"), uri));
                    }
                }
                ParsedAttr::Regular { key, value } => {
                    out_attrs.push(self.translate_attribute(key, value)?);
                }
            }
        }

        let elem_uri = self.scopes.resolve(prefix.as_deref()).to_owned();
        let elem_translated = if prefix.as_deref() == Some("xml") {
            elem_uri
        } else {
            self.set.translate(&elem_uri)
        };
        let name_out = match &prefix {
            Some(p) if !elem_translated.is_empty() => format!("{p}:{local}"),
            _ => local,
        };
        let unqualified = !name_out.contains(':');
        if unqualified && elem_translated != out_default {
            out_attrs.push(OutAttr::Escaped("xmlns".to_owned(), elem_translated.clone()));
            out_default = elem_translated;
        }

        let mut out = BytesStart::new(name_out.as_str());
        for attr in &out_attrs {
            match attr {
                OutAttr::Escaped(key, value) => out.push_attribute((key.as_str(), value.as_str())),
                OutAttr::Raw(key, value) => out.push_attribute(Attribute {
                    key: QName(key.as_slice()),
                    value: Cow::Borrowed(value.as_slice()),
                }),
            }
        }
        if empty {
            self.writer.write_event(Event::Empty(out))?;
            self.scopes.pop_frame();
        } else {
            self.writer.write_event(Event::Start(out))?;
            self.open.push(name_out);
            self.out_defaults.push(out_default);
        }
        Ok(())
    }

    fn translate_attribute(&self, key: Vec<u8>, value: Vec<u8>) -> Result<OutAttr> {
        if !self.options.translate_attribute_namespaces {
            return Ok(OutAttr::Raw(key, value));
        }
        let (prefix, local) = split_qname(&key)?;
        let Some(prefix) = prefix else {
            // unprefixed attributes live in no namespace
            return Ok(OutAttr::Raw(key, value));
        };
        if prefix == "xml" {
            return Ok(OutAttr::Raw(key, value));
        }
        let uri = self.scopes.resolve(Some(&prefix)).to_owned();
        if self.set.translate(&uri).is_empty() {
            Ok(OutAttr::Raw(local.into_bytes(), value))
        } else {
            Ok(OutAttr::Raw(key, value))
        }
    }
}

impl<R: BufRead> Read for XmlTranslatorStream<R> {
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

impl<R: BufRead> Stream for XmlTranslatorStream<R> {}
