/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

mod error;
mod namespaces;

use std::collections::VecDeque;

use crate::Element;
use crate::SaxElement;
use crate::SaxError;
use crate::SaxHandler;
use crate::SaxParser;

pub use error::StreamError;
use error::description;
use namespaces::NamespaceScope;
pub use namespaces::PrefixScoping;

/// Parsed stream unit.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StreamEvent {
    /// The stream root is opened. The element has its attributes but no
    /// children.
    Start(Element),

    /// A complete top level element (a stanza, stream features, SASL and
    /// TLS negotiation elements) with its whole subtree.
    Stanza(Element),

    /// The stream root is closed.
    End,
}

struct StreamBuilder {
    default_namespace: String,
    scope: NamespaceScope,
    defaults: Vec<String>,
    open_names: Vec<String>,
    stack: Vec<Element>,
    pending_name: String,
    pending_attributes: Vec<(String, String)>,
    pending: VecDeque<StreamEvent>,
    events: VecDeque<StreamEvent>,
}

impl StreamBuilder {
    fn new(default_namespace: &str, scoping: PrefixScoping) -> Self {
        StreamBuilder {
            default_namespace: default_namespace.to_string(),
            scope: NamespaceScope::new(scoping),
            defaults: Vec::new(),
            open_names: Vec::new(),
            stack: Vec::new(),
            pending_name: String::new(),
            pending_attributes: Vec::new(),
            pending: VecDeque::new(),
            events: VecDeque::new(),
        }
    }

    fn reset(&mut self) {
        self.scope.reset();
        self.defaults.clear();
        self.open_names.clear();
        self.stack.clear();
        self.pending_name.clear();
        self.pending_attributes.clear();
        self.pending.clear();
        self.events.clear();
    }

    fn open_element(&mut self) -> Result<(), SaxError> {
        self.scope.open();
        let mut explicit_default = None;
        for (name, value) in &self.pending_attributes {
            if name == "xmlns" {
                explicit_default = Some(value.clone());
            } else if let Some(prefix) = name.strip_prefix("xmlns:") {
                self.scope.declare(prefix, value);
            }
        }
        let default = explicit_default
            .or_else(|| self.defaults.last().cloned())
            .unwrap_or_else(|| self.default_namespace.clone());

        let (namespace, local_name) = match self.pending_name.split_once(':') {
            Some((prefix, local_name)) => match self.scope.resolve(prefix) {
                Some(uri) => (uri.to_string(), local_name),
                None => return Err(SaxError::BadXml(description::PREFIX_UNBOUND)),
            },
            None => (default.clone(), self.pending_name.as_str()),
        };

        let mut element = Element::new(local_name, namespace);
        for (name, value) in self.pending_attributes.drain(..) {
            element.set_attribute(name, value);
        }
        if self.stack.is_empty() {
            self.pending.push_back(StreamEvent::Start(element.clone()));
        }
        self.stack.push(element);
        self.defaults.push(default);
        self.open_names.push(std::mem::take(&mut self.pending_name));
        Ok(())
    }

    fn close_element(&mut self) {
        let Some(element) = self.stack.pop() else {
            return;
        };
        self.defaults.pop();
        self.open_names.pop();
        self.scope.close();
        match self.stack.len() {
            0 => self.pending.push_back(StreamEvent::End),
            1 => {
                if let Some(root) = self.stack.first_mut() {
                    root.clear_children();
                }
                self.pending.push_back(StreamEvent::Stanza(element));
            }
            _ => {
                if let Some(parent) = self.stack.last_mut() {
                    parent.append_child(element);
                }
            }
        }
    }
}

impl SaxHandler for StreamBuilder {
    fn handle_element(&mut self, element: &SaxElement) -> Result<(), SaxError> {
        match element {
            SaxElement::StartTag(name) => {
                self.pending_name.clear();
                self.pending_name.push_str(name);
                self.pending_attributes.clear();
            }
            SaxElement::Attribute(name, value) => {
                self.pending_attributes
                    .push((name.to_string(), value.to_string()));
            }
            SaxElement::StartTagContent => self.open_element()?,
            SaxElement::StartTagEmpty => {
                self.open_element()?;
                self.close_element();
            }
            SaxElement::EndTag(name) => {
                if self.open_names.last().map(String::as_str) != Some(*name) {
                    return Err(SaxError::BadXml(description::TAG_NAME_MISMATCH));
                }
                self.close_element();
            }
            SaxElement::CData(cdata) => {
                // Whitespace between the stanzas is not kept on the root.
                if self.stack.len() > 1
                    && let Some(current) = self.stack.last_mut()
                {
                    current.append_text(cdata);
                }
            }
        }
        Ok(())
    }

    fn tag_closed(&mut self) -> bool {
        if self.pending.is_empty() {
            return false;
        }
        self.events.append(&mut self.pending);
        true
    }
}

/// Incremental parser turning the received bytes into stream events.
///
/// Each element is built with its namespace resolved: an explicit `xmlns`
/// attribute wins, otherwise the default namespace is inherited from the
/// parent, and the configured default applies at the top. Prefixed names
/// use the namespace bound to the prefix.
///
/// ```
/// use iksxmpp::{PrefixScoping, StreamEvent, StreamParser};
///
/// let mut parser = StreamParser::new("jabber:client", PrefixScoping::Lexical);
/// let bytes = b"<stream:stream xmlns:stream='http://etherx.jabber.org/streams'><stream:features/>";
/// let events: Vec<StreamEvent> = parser
///     .events(bytes)
///     .collect::<Result<Vec<_>, _>>()
///     .unwrap();
/// assert_eq!(events.len(), 2);
/// if let StreamEvent::Stanza(features) = &events[1] {
///     assert_eq!(features.name(), "features");
///     assert_eq!(features.namespace(), "http://etherx.jabber.org/streams");
/// }
/// ```
pub struct StreamParser {
    parser: SaxParser,
    builder: StreamBuilder,
}

impl StreamParser {
    pub fn new(default_namespace: &str, scoping: PrefixScoping) -> Self {
        Self {
            parser: SaxParser::new(),
            builder: StreamBuilder::new(default_namespace, scoping),
        }
    }

    /// Parses bytes until the next stream event.
    ///
    /// Returns the event and the number of bytes consumed to produce it.
    /// The rest of the bytes must be passed in the next call. `None` means
    /// all bytes are consumed without completing an event.
    pub fn parse_bytes(
        &mut self,
        bytes: &[u8],
    ) -> Result<Option<(StreamEvent, usize)>, StreamError> {
        if let Some(event) = self.builder.events.pop_front() {
            return Ok(Some((event, 0)));
        }
        let consumed = self.parser.parse_bytes(&mut self.builder, bytes)?;
        Ok(self
            .builder
            .events
            .pop_front()
            .map(|event| (event, consumed)))
    }

    /// Iterates over the events in the given bytes.
    pub fn events<'a>(&'a mut self, bytes: &'a [u8]) -> StreamEvents<'a> {
        StreamEvents {
            parser: self,
            bytes,
            bytes_parsed: 0,
            failed: false,
        }
    }

    /// Forgets the stream state for a new stream on the same connection.
    pub fn reset(&mut self) {
        self.parser.reset();
        self.builder.reset();
    }

    /// Number of open elements including the stream root.
    pub fn depth(&self) -> usize {
        self.builder.stack.len()
    }

    /// Root of the current stream, if it is opened.
    pub fn stream_root(&self) -> Option<&Element> {
        self.builder.stack.first()
    }

    pub fn location(&self) -> crate::Location {
        self.parser.location()
    }
}

pub struct StreamEvents<'a> {
    parser: &'a mut StreamParser,
    bytes: &'a [u8],
    bytes_parsed: usize,
    failed: bool,
}

impl Iterator for StreamEvents<'_> {
    type Item = Result<StreamEvent, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.parser.parse_bytes(&self.bytes[self.bytes_parsed..]) {
            Ok(Some((event, consumed))) => {
                self.bytes_parsed += consumed;
                Some(Ok(event))
            }
            Ok(None) => {
                self.bytes_parsed = self.bytes.len();
                None
            }
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}
