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
mod location;

pub use error::SaxError;
use error::description;
pub use location::Location;

/// A token returned from the stream tokenizer.
#[derive(Debug, Eq, PartialEq)]
pub enum SaxElement<'a> {
    /// A start tag or empty element tag.
    ///
    /// The argument is the full name of the tag including any prefix. This
    /// element is sent as soon as the name is parsed, before the attributes.
    StartTag(&'a str),

    /// A tag attribute for the last StartTag.
    ///
    /// References in the value are already replaced with the characters.
    Attribute(&'a str, &'a str),

    /// The last StartTag is complete and its content follows.
    StartTagContent,

    /// The last StartTag was an empty element tag, no content and no end
    /// tag will follow.
    StartTagEmpty,

    /// An end tag. The argument is the full name of the tag.
    EndTag(&'a str),

    /// Character data.
    ///
    /// A continuous block of text might arrive in several parts, either
    /// because the input came in multiple chunks or because a reference
    /// was substituted. Handlers must concatenate them.
    CData(&'a str),
}

pub trait SaxHandler {
    fn handle_element(&mut self, element: &SaxElement) -> Result<(), SaxError>;

    /// Called after the closing `>` of any tag is consumed.
    ///
    /// Returning true stops the running
    /// [parse_bytes()](SaxParser::parse_bytes) call right after that byte.
    fn tag_closed(&mut self) -> bool {
        false
    }
}

/// Incremental tokenizer for the XML subset used on XMPP streams.
///
/// Input can be split at any byte, including in the middle of a tag name,
/// a reference or a multi-byte UTF-8 character. Partial constructs are kept
/// in internal buffers until the rest arrives, so a call never waits for
/// more input.
///
/// XMPP restricts the XML which can be sent over a stream (RFC 6120
/// section 11.1). Comments, document type declarations, and processing
/// instructions after the stream root are rejected as syntax errors.
///
/// ```
/// use iksxmpp::{SaxElement, SaxError, SaxHandler, SaxParser};
///
/// struct Counter {
///     tags: usize,
/// }
///
/// impl SaxHandler for Counter {
///     fn handle_element(&mut self, element: &SaxElement) -> Result<(), SaxError> {
///         if let SaxElement::StartTag(_) = element {
///             self.tags += 1;
///         }
///         Ok(())
///     }
/// }
///
/// let mut counter = Counter { tags: 0 };
/// let mut parser = SaxParser::new();
/// parser.parse_bytes(&mut counter, b"<stream><mess").unwrap();
/// parser.parse_bytes(&mut counter, b"age/>").unwrap();
/// assert_eq!(counter.tags, 2);
/// assert_eq!(parser.depth(), 1);
/// ```
pub struct SaxParser {
    state: State,
    uni_len: u32,
    uni_left: u32,
    uni_char: u32,
    depth: usize,
    is_end_tag: bool,
    is_apos_value: bool,
    seen_content: bool,
    value_pos: usize,
    buffer: Vec<u8>,
    ref_buffer: Vec<u8>,
    char_ref_value: u32,
    is_value_ref: bool,
    utf8_carry: Vec<u8>,
    location: Location,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum State {
    Prolog,
    TagStart,
    PI,
    PIEnd,
    Markup,
    CDataSectionStart(usize),
    CDataSectionBody,
    CDataSectionMaybeEnd,
    CDataSectionMaybeEnd2,
    TagName,
    EndTagWhitespace,
    EmptyTagEnd,
    AttributeWhitespace,
    AttributeName,
    AttributeEq,
    AttributeValueStart,
    AttributeValue,
    CData,
    Reference,
    Entity,
    CharReference,
    CharReferenceBody,
    HexCharReference,
    Epilog,
}

const INITIAL_BUFFER_CAPACITY: usize = 128;

const REF_BUFFER_SIZE: usize = 8;

const CDATA_SECTION_START: &[u8] = b"CDATA[";

macro_rules! whitespace {
    () => {
        b' ' | b'\t' | b'\r' | b'\n'
    };
}

macro_rules! xml_error {
    ($a:ident) => {
        return Err(SaxError::BadXml(description::$a))
    };
}

fn is_valid_xml_char(c: u32) -> bool {
    matches!(
        c,
        0x09 | 0x0a | 0x0d | 0x20..=0xd7ff | 0xe000..=0xfffd | 0x10000..=0x10ffff
    )
}

impl SaxParser {
    pub fn new() -> SaxParser {
        SaxParser {
            state: State::Prolog,
            uni_len: 0,
            uni_left: 0,
            uni_char: 0,
            depth: 0,
            is_end_tag: false,
            is_apos_value: false,
            seen_content: false,
            value_pos: 0,
            buffer: Vec::with_capacity(INITIAL_BUFFER_CAPACITY),
            ref_buffer: Vec::with_capacity(REF_BUFFER_SIZE),
            char_ref_value: 0,
            is_value_ref: false,
            utf8_carry: Vec::new(),
            location: Location::new(),
        }
    }

    /// Resets the parser for a new stream.
    pub fn reset(&mut self) {
        self.state = State::Prolog;
        self.uni_len = 0;
        self.uni_left = 0;
        self.uni_char = 0;
        self.depth = 0;
        self.is_end_tag = false;
        self.is_apos_value = false;
        self.seen_content = false;
        self.value_pos = 0;
        self.buffer.clear();
        self.ref_buffer.clear();
        self.char_ref_value = 0;
        self.is_value_ref = false;
        self.utf8_carry.clear();
        self.location = Location::new();
    }

    /// Current element nesting depth, the stream root being depth one.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn location(&self) -> Location {
        self.location
    }

    fn push_buffer(&mut self, bytes: &[u8]) -> Result<(), SaxError> {
        if self.buffer.try_reserve(bytes.len()).is_err() {
            return Err(SaxError::NoMemory);
        }
        self.buffer.extend_from_slice(bytes);
        Ok(())
    }

    fn send_char_reference(&mut self, handler: &mut impl SaxHandler) -> Result<(), SaxError> {
        if !is_valid_xml_char(self.char_ref_value) {
            xml_error!(CHAR_INVALID);
        }
        let Some(c) = char::from_u32(self.char_ref_value) else {
            xml_error!(CHAR_INVALID);
        };
        let mut utf8 = [0u8; 4];
        let s = c.encode_utf8(&mut utf8);
        if self.is_value_ref {
            self.push_buffer(s.as_bytes())
        } else {
            handler.handle_element(&SaxElement::CData(s))
        }
    }

    fn close_tag(&mut self, pos: usize, back: &mut usize) -> Result<(), SaxError> {
        if self.depth == 0 {
            xml_error!(TAG_CLOSE_WITHOUT_OPEN);
        }
        self.depth -= 1;
        if self.depth == 0 {
            self.state = State::Epilog;
        } else {
            *back = pos + 1;
            self.state = State::CData;
        }
        Ok(())
    }

    fn after_reference(&mut self) {
        self.state = if self.is_value_ref {
            State::AttributeValue
        } else {
            State::CData
        };
    }

    /// Parses the given chunk of the stream.
    ///
    /// Returns the number of bytes consumed. This is the whole chunk unless
    /// the handler asked for a pause from [SaxHandler::tag_closed], in
    /// which case the remaining bytes must be passed again later (or
    /// dropped if the stream is restarted).
    pub fn parse_bytes(
        &mut self,
        handler: &mut impl SaxHandler,
        bytes: &[u8],
    ) -> Result<usize, SaxError> {
        let mut pos: usize = 0;
        let mut back: usize = 0;

        while pos < bytes.len() {
            let mut redo = false;
            let mut tag_closed = false;
            let c = bytes[pos];

            if self.uni_left > 0 {
                if c & 0xc0 != 0x80 {
                    xml_error!(UTF8_INVALID_CONT_BYTE);
                }
                self.uni_char = (self.uni_char << 6) | (c as u32 & 0x3f);
                self.uni_left -= 1;
                if self.uni_left == 0 {
                    // Sequences longer than the actual character codepoint
                    // size are security hazards.
                    if (self.uni_len == 2 && self.uni_char <= 0x7f)
                        || (self.uni_len == 3 && self.uni_char <= 0x7ff)
                        || (self.uni_len == 4 && self.uni_char <= 0xffff)
                    {
                        xml_error!(UTF8_OVERLONG_SEQUENCE);
                    }
                    if !is_valid_xml_char(self.uni_char) {
                        xml_error!(CHAR_INVALID);
                    }
                    if !self.utf8_carry.is_empty() {
                        // Character started in the previous chunk.
                        self.utf8_carry.extend_from_slice(&bytes[back..=pos]);
                        let s = unsafe { std::str::from_utf8_unchecked(&self.utf8_carry) };
                        handler.handle_element(&SaxElement::CData(s))?;
                        self.utf8_carry.clear();
                        back = pos + 1;
                    }
                }
            } else if c & 0x80 == 0x80 {
                if c & 0xe0 == 0xc0 {
                    self.uni_len = 2;
                    self.uni_left = 1;
                    self.uni_char = c as u32 & 0x1f;
                } else if c & 0xf0 == 0xe0 {
                    self.uni_len = 3;
                    self.uni_left = 2;
                    self.uni_char = c as u32 & 0x0f;
                } else if c & 0xf8 == 0xf0 {
                    self.uni_len = 4;
                    self.uni_left = 3;
                    self.uni_char = c as u32 & 0x07;
                } else {
                    xml_error!(UTF8_INVALID_PREFIX_BYTE);
                }
            } else if c < 0x20 && !matches!(c, b'\t' | b'\n' | b'\r') {
                xml_error!(CHAR_INVALID);
            }

            match self.state {
                State::Prolog => match c {
                    b'<' => self.state = State::TagStart,
                    whitespace!() => (),
                    _ => xml_error!(DOC_CDATA_WITHOUT_PARENT),
                },

                State::TagStart => match c {
                    b'!' => self.state = State::Markup,
                    b'?' => {
                        if self.seen_content {
                            xml_error!(PI_RESTRICTED);
                        }
                        self.state = State::PI;
                    }
                    b'/' => {
                        if self.depth == 0 {
                            xml_error!(TAG_CLOSE_WITHOUT_OPEN);
                        }
                        back = pos + 1;
                        self.is_end_tag = true;
                        self.state = State::TagName;
                    }
                    whitespace!() => xml_error!(TAG_WHITESPACE_START),
                    b'>' => xml_error!(TAG_EMPTY_NAME),
                    _ => {
                        if self.depth == 0 && self.seen_content {
                            xml_error!(TAG_OUTSIDE_ROOT);
                        }
                        self.depth += 1;
                        back = pos;
                        self.is_end_tag = false;
                        self.seen_content = true;
                        self.state = State::TagName;
                    }
                },

                State::PI => {
                    if c == b'?' {
                        self.state = State::PIEnd;
                    }
                }

                State::PIEnd => match c {
                    b'>' => self.state = State::Prolog,
                    b'?' => (),
                    _ => self.state = State::PI,
                },

                State::Markup => match c {
                    b'[' => {
                        if self.depth == 0 {
                            xml_error!(MARKUP_CDATA_SECTION_OUTSIDE_ROOT);
                        }
                        self.state = State::CDataSectionStart(0);
                    }
                    _ => xml_error!(MARKUP_RESTRICTED),
                },

                State::CDataSectionStart(matched) => {
                    if c != CDATA_SECTION_START[matched] {
                        xml_error!(MARKUP_CDATA_SECTION_BAD_START);
                    }
                    if matched + 1 == CDATA_SECTION_START.len() {
                        back = pos + 1;
                        self.state = State::CDataSectionBody;
                    } else {
                        self.state = State::CDataSectionStart(matched + 1);
                    }
                }

                State::CDataSectionBody => {
                    if c == b']' {
                        if back < pos {
                            let s = unsafe { std::str::from_utf8_unchecked(&bytes[back..pos]) };
                            handler.handle_element(&SaxElement::CData(s))?;
                        }
                        self.state = State::CDataSectionMaybeEnd;
                    }
                }

                State::CDataSectionMaybeEnd => match c {
                    b']' => self.state = State::CDataSectionMaybeEnd2,
                    _ => {
                        handler.handle_element(&SaxElement::CData("]"))?;
                        back = pos;
                        self.state = State::CDataSectionBody;
                    }
                },

                State::CDataSectionMaybeEnd2 => match c {
                    b'>' => {
                        back = pos + 1;
                        self.state = State::CData;
                    }
                    b']' => handler.handle_element(&SaxElement::CData("]"))?,
                    _ => {
                        handler.handle_element(&SaxElement::CData("]]"))?;
                        back = pos;
                        self.state = State::CDataSectionBody;
                    }
                },

                State::TagName => match c {
                    b'/' | b'>' | whitespace!() => {
                        if back < pos {
                            self.push_buffer(&bytes[back..pos])?;
                        }
                        if self.buffer.is_empty() {
                            xml_error!(TAG_EMPTY_NAME);
                        }
                        if self.is_end_tag && c == b'/' {
                            xml_error!(TAG_DOUBLE_END);
                        }
                        {
                            let name = unsafe { std::str::from_utf8_unchecked(&self.buffer) };
                            if self.is_end_tag {
                                handler.handle_element(&SaxElement::EndTag(name))?;
                            } else {
                                handler.handle_element(&SaxElement::StartTag(name))?;
                            }
                        }
                        self.buffer.clear();
                        match c {
                            b'/' => {
                                handler.handle_element(&SaxElement::StartTagEmpty)?;
                                self.state = State::EmptyTagEnd;
                            }
                            b'>' => {
                                if self.is_end_tag {
                                    self.close_tag(pos, &mut back)?;
                                } else {
                                    handler.handle_element(&SaxElement::StartTagContent)?;
                                    back = pos + 1;
                                    self.state = State::CData;
                                }
                                tag_closed = true;
                            }
                            _ => {
                                self.state = if self.is_end_tag {
                                    State::EndTagWhitespace
                                } else {
                                    State::AttributeWhitespace
                                };
                            }
                        }
                    }
                    _ => (),
                },

                State::EmptyTagEnd => match c {
                    b'>' => {
                        self.close_tag(pos, &mut back)?;
                        tag_closed = true;
                    }
                    _ => xml_error!(TAG_EMPTY_TAG_MISSING_END),
                },

                State::EndTagWhitespace => match c {
                    b'>' => {
                        self.close_tag(pos, &mut back)?;
                        tag_closed = true;
                    }
                    whitespace!() => (),
                    _ => xml_error!(TAG_END_TAG_ATTRIBUTES),
                },

                State::AttributeWhitespace => match c {
                    whitespace!() => (),
                    b'/' => {
                        handler.handle_element(&SaxElement::StartTagEmpty)?;
                        self.state = State::EmptyTagEnd;
                    }
                    b'>' => {
                        handler.handle_element(&SaxElement::StartTagContent)?;
                        back = pos + 1;
                        self.state = State::CData;
                        tag_closed = true;
                    }
                    _ => {
                        back = pos;
                        self.state = State::AttributeName;
                        redo = true;
                    }
                },

                State::AttributeName => match c {
                    b'=' | whitespace!() => {
                        if back < pos {
                            self.push_buffer(&bytes[back..pos])?;
                        }
                        self.state = if c == b'=' {
                            State::AttributeValueStart
                        } else {
                            State::AttributeEq
                        };
                    }
                    b'/' | b'>' | b'<' => xml_error!(TAG_ATTRIBUTE_BAD_NAME),
                    _ => (),
                },

                State::AttributeEq => match c {
                    b'=' => self.state = State::AttributeValueStart,
                    whitespace!() => (),
                    _ => xml_error!(TAG_ATTRIBUTE_WITHOUT_EQUAL),
                },

                State::AttributeValueStart => match c {
                    b'"' | b'\'' => {
                        self.is_apos_value = c == b'\'';
                        self.value_pos = self.buffer.len();
                        back = pos + 1;
                        self.state = State::AttributeValue;
                    }
                    whitespace!() => (),
                    _ => xml_error!(TAG_ATTRIBUTE_WITHOUT_QUOTE),
                },

                State::AttributeValue => {
                    if (self.is_apos_value && c == b'\'') || (!self.is_apos_value && c == b'"') {
                        if back < pos {
                            self.push_buffer(&bytes[back..pos])?;
                        }
                        {
                            let (name, value) = self.buffer.split_at(self.value_pos);
                            let name = unsafe { std::str::from_utf8_unchecked(name) };
                            let value = unsafe { std::str::from_utf8_unchecked(value) };
                            handler.handle_element(&SaxElement::Attribute(name, value))?;
                        }
                        self.buffer.clear();
                        self.state = State::AttributeWhitespace;
                    } else if c == b'&' {
                        if back < pos {
                            self.push_buffer(&bytes[back..pos])?;
                        }
                        self.ref_buffer.clear();
                        self.is_value_ref = true;
                        self.state = State::Reference;
                    } else if c == b'<' {
                        xml_error!(TAG_ATTRIBUTE_BAD_VALUE);
                    }
                }

                State::CData => match c {
                    b'<' => {
                        if back < pos {
                            let s = unsafe { std::str::from_utf8_unchecked(&bytes[back..pos]) };
                            handler.handle_element(&SaxElement::CData(s))?;
                        }
                        self.state = State::TagStart;
                    }
                    b'&' => {
                        if back < pos {
                            let s = unsafe { std::str::from_utf8_unchecked(&bytes[back..pos]) };
                            handler.handle_element(&SaxElement::CData(s))?;
                        }
                        self.ref_buffer.clear();
                        self.is_value_ref = false;
                        self.state = State::Reference;
                    }
                    _ => (),
                },

                State::Reference => match c {
                    b'#' => {
                        self.char_ref_value = 0;
                        self.state = State::CharReference;
                    }
                    b';' => xml_error!(REFERENCE_CUSTOM_ENTITY),
                    _ => {
                        self.ref_buffer.push(c);
                        self.state = State::Entity;
                    }
                },

                State::Entity => match c {
                    b';' => {
                        let ent = match self.ref_buffer.as_slice() {
                            b"amp" => "&",
                            b"lt" => "<",
                            b"gt" => ">",
                            b"quot" => "\"",
                            b"apos" => "'",
                            _ => xml_error!(REFERENCE_CUSTOM_ENTITY),
                        };
                        back = pos + 1;
                        if self.is_value_ref {
                            self.push_buffer(ent.as_bytes())?;
                        } else {
                            handler.handle_element(&SaxElement::CData(ent))?;
                        }
                        self.after_reference();
                    }
                    _ => {
                        if self.ref_buffer.len() >= REF_BUFFER_SIZE {
                            xml_error!(REFERENCE_CUSTOM_ENTITY);
                        }
                        self.ref_buffer.push(c);
                    }
                },

                State::CharReference => match c {
                    b'x' => self.state = State::HexCharReference,
                    b'0'..=b'9' => {
                        self.char_ref_value = (c - b'0') as u32;
                        self.state = State::CharReferenceBody;
                    }
                    _ => xml_error!(REFERENCE_INVALID_DECIMAL),
                },

                State::CharReferenceBody => match c {
                    b';' => {
                        self.send_char_reference(handler)?;
                        back = pos + 1;
                        self.after_reference();
                    }
                    b'0'..=b'9' => {
                        self.char_ref_value = self.char_ref_value * 10 + (c - b'0') as u32;
                        if self.char_ref_value > 0x10ffff {
                            xml_error!(CHAR_INVALID);
                        }
                    }
                    _ => xml_error!(REFERENCE_INVALID_DECIMAL),
                },

                State::HexCharReference => {
                    let digit = match c {
                        b';' => {
                            self.send_char_reference(handler)?;
                            back = pos + 1;
                            self.after_reference();
                            None
                        }
                        b'0'..=b'9' => Some(c - b'0'),
                        b'a'..=b'f' => Some(c - b'a' + 10),
                        b'A'..=b'F' => Some(c - b'A' + 10),
                        _ => xml_error!(REFERENCE_INVALID_HEX),
                    };
                    if let Some(digit) = digit {
                        self.char_ref_value = self.char_ref_value * 16 + digit as u32;
                        if self.char_ref_value > 0x10ffff {
                            xml_error!(CHAR_INVALID);
                        }
                    }
                }

                State::Epilog => match c {
                    b'<' => self.state = State::TagStart,
                    whitespace!() => (),
                    _ => xml_error!(DOC_CDATA_WITHOUT_PARENT),
                },
            }

            if !redo {
                pos += 1;
                self.location.advance(c);
                if tag_closed && handler.tag_closed() {
                    break;
                }
            }
        }

        if back < pos {
            match self.state {
                State::TagName | State::AttributeName | State::AttributeValue => {
                    self.push_buffer(&bytes[back..pos])?;
                }
                State::CData | State::CDataSectionBody => {
                    if !self.utf8_carry.is_empty() {
                        // Still inside a character which began in an earlier chunk.
                        self.utf8_carry.extend_from_slice(&bytes[back..pos]);
                    } else {
                        let partial = if self.uni_left > 0 {
                            (self.uni_len - self.uni_left) as usize
                        } else {
                            0
                        };
                        let end = pos - partial;
                        if back < end {
                            let s = unsafe { std::str::from_utf8_unchecked(&bytes[back..end]) };
                            handler.handle_element(&SaxElement::CData(s))?;
                        }
                        self.utf8_carry.extend_from_slice(&bytes[end.max(back)..pos]);
                    }
                }
                _ => (),
            }
        }

        Ok(pos)
    }
}

impl Default for SaxParser {
    fn default() -> Self {
        Self::new()
    }
}
