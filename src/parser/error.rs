/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::error::Error;
use std::fmt::Display;

/// Type of the error which happened while tokenizing the stream.
///
/// The categories are kept to the distinct actions a caller might take.
/// Position of a syntax error is available via
/// [location()](super::SaxParser::location).
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum SaxError {
    /// Parser could not allocate the memory needed for its buffers.
    NoMemory,

    /// A syntax error, or a construct not allowed on an XMPP stream.
    ///
    /// The argument describes the actual issue.
    BadXml(&'static str),

    /// Element handler asked to stop the processing.
    ///
    /// This lets the caller's handler abort while signalling that the
    /// interruption is not caused by the tokenizer itself.
    HandlerAbort,
}

impl Display for SaxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SaxError::NoMemory => write!(f, "not enough memory"),
            SaxError::BadXml(msg) => write!(f, "invalid XML syntax: {msg}"),
            SaxError::HandlerAbort => write!(f, "aborted by the element handler"),
        }
    }
}

impl Error for SaxError {}

pub(super) mod description {
    pub(in super::super) const UTF8_INVALID_CONT_BYTE: &str = "invalid UTF8 continuation byte";
    pub(in super::super) const UTF8_OVERLONG_SEQUENCE: &str = "overlong UTF8 sequence";
    pub(in super::super) const UTF8_INVALID_PREFIX_BYTE: &str = "invalid UTF8 prefix byte";
    pub(in super::super) const CHAR_INVALID: &str = "invalid XML character";
    pub(in super::super) const DOC_CDATA_WITHOUT_PARENT: &str =
        "character data not allowed outside of the stream root";
    pub(in super::super) const TAG_CLOSE_WITHOUT_OPEN: &str = "close tag without open";
    pub(in super::super) const TAG_WHITESPACE_START: &str = "tag cannot start with whitespace";
    pub(in super::super) const TAG_OUTSIDE_ROOT: &str = "tags cannot be outside of the stream root";
    pub(in super::super) const TAG_EMPTY_NAME: &str = "tag has no name";
    pub(in super::super) const TAG_DOUBLE_END: &str = "end tag has standalone ending too";
    pub(in super::super) const TAG_END_TAG_ATTRIBUTES: &str = "end tag cannot have attributes";
    pub(in super::super) const TAG_EMPTY_TAG_MISSING_END: &str =
        "empty element tags must end after the '/'";
    pub(in super::super) const TAG_ATTRIBUTE_WITHOUT_EQUAL: &str =
        "tag attributes must have '=' before the value";
    pub(in super::super) const TAG_ATTRIBUTE_WITHOUT_QUOTE: &str =
        "tag attribute value must be in double or single quotes";
    pub(in super::super) const TAG_ATTRIBUTE_BAD_NAME: &str =
        "tag attribute names cannot have '/', '<' or '>'";
    pub(in super::super) const TAG_ATTRIBUTE_BAD_VALUE: &str =
        "tag attribute value cannot have '<' character without a reference";
    pub(in super::super) const REFERENCE_INVALID_DECIMAL: &str =
        "non digit in decimal character reference";
    pub(in super::super) const REFERENCE_INVALID_HEX: &str =
        "non hex digit in hexadecimal character reference";
    pub(in super::super) const REFERENCE_CUSTOM_ENTITY: &str =
        "non-predefined entity references are not allowed";
    pub(in super::super) const MARKUP_CDATA_SECTION_BAD_START: &str =
        "character data sections must start with '[CDATA['";
    pub(in super::super) const MARKUP_CDATA_SECTION_OUTSIDE_ROOT: &str =
        "character data sections cannot be outside of the stream root";
    pub(in super::super) const MARKUP_RESTRICTED: &str =
        "comments and document type declarations are not allowed on a stream";
    pub(in super::super) const PI_RESTRICTED: &str =
        "processing instructions are only allowed before the stream root";
}
