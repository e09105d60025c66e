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

use crate::StreamError;

use super::BadJid;

#[derive(Debug)]
pub enum XmppClientError {
    /// Could not connect to the server before the timeout.
    Connection(String),
    /// The connection failed while reading or writing.
    Io(std::io::Error),
    /// The server sent malformed XML, the stream cannot continue.
    Parse(StreamError),
    /// The server rejected the credentials.
    Authentication,
    Tls(rustls::Error),
    BadJid(BadJid),
}

impl Display for XmppClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            XmppClientError::Connection(msg) => write!(f, "cannot connect: {msg}"),
            XmppClientError::Io(err) => write!(f, "connection error: {err}"),
            XmppClientError::Parse(err) => err.fmt(f),
            XmppClientError::Authentication => write!(f, "authentication failed"),
            XmppClientError::Tls(err) => write!(f, "TLS error: {err}"),
            XmppClientError::BadJid(err) => err.fmt(f),
        }
    }
}

impl Error for XmppClientError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            XmppClientError::Io(err) => Some(err),
            XmppClientError::Parse(err) => Some(err),
            XmppClientError::Tls(err) => Some(err),
            XmppClientError::BadJid(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StreamError> for XmppClientError {
    fn from(err: StreamError) -> Self {
        XmppClientError::Parse(err)
    }
}

impl From<std::io::Error> for XmppClientError {
    fn from(err: std::io::Error) -> Self {
        XmppClientError::Io(err)
    }
}

impl From<rustls::Error> for XmppClientError {
    fn from(err: rustls::Error) -> Self {
        XmppClientError::Tls(err)
    }
}

impl From<BadJid> for XmppClientError {
    fn from(err: BadJid) -> Self {
        XmppClientError::BadJid(err)
    }
}
