/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

mod dispatch;
mod element;
mod entities;
mod parser;
mod stream;
#[cfg(feature = "xmpp")]
pub mod xmpp;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use entities::escape;
pub use entities::escape_fmt;
pub use entities::escaped_size;

pub use element::ANY_NAME;
pub use element::Element;

pub use parser::Location;
pub use parser::SaxElement;
pub use parser::SaxError;
pub use parser::SaxHandler;
pub use parser::SaxParser;

pub use stream::PrefixScoping;
pub use stream::StreamError;
pub use stream::StreamEvent;
pub use stream::StreamEvents;
pub use stream::StreamParser;

pub use dispatch::BadPath;
pub use dispatch::Dispatcher;
pub use dispatch::EventCallback;
pub use dispatch::EventPayload;
pub use dispatch::HandlerDepth;
pub use dispatch::Path;
pub use dispatch::PathStep;
pub use dispatch::Receiver;
pub use dispatch::StanzaCallback;
pub use dispatch::WaitId;

#[cfg(feature = "xmpp")]
pub use xmpp::BadJid;
#[cfg(feature = "xmpp")]
pub use xmpp::Jid;
#[cfg(feature = "xmpp")]
pub use xmpp::XmppClient;
#[cfg(feature = "xmpp")]
pub use xmpp::XmppClientBuilder;
#[cfg(feature = "xmpp")]
pub use xmpp::XmppClientError;
#[cfg(feature = "xmpp")]
pub use xmpp::XmppClientProtocol;
