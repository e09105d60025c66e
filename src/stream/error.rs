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

use crate::SaxError;

/// Errors from the stream parser. All of them are fatal for the stream.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum StreamError {
    NoMemory,
    BadXml(&'static str),
    BadStream(&'static str),
}

impl Display for StreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamError::NoMemory => write!(f, "not enough memory"),
            StreamError::BadXml(msg) => write!(f, "invalid XML syntax: {msg}"),
            StreamError::BadStream(msg) => write!(f, "invalid stream protocol: {msg}"),
        }
    }
}

impl Error for StreamError {}

impl From<SaxError> for StreamError {
    fn from(err: SaxError) -> Self {
        match err {
            SaxError::NoMemory => StreamError::NoMemory,
            SaxError::BadXml(msg) => StreamError::BadXml(msg),
            SaxError::HandlerAbort => StreamError::BadStream(description::HANDLER_ABORT),
        }
    }
}

pub(super) mod description {
    pub(in super::super) const TAG_NAME_MISMATCH: &str = "end tag name does not match the start tag";
    pub(in super::super) const PREFIX_UNBOUND: &str = "element prefix is not bound to a namespace";
    pub(in super::super) const HANDLER_ABORT: &str = "stream element handler aborted";
}
