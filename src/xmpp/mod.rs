/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

mod client;
pub mod constants;
mod error;
mod jid;
mod protocol;
mod roster;
pub mod sasl;
pub mod stanza;
mod transport;

pub use client::XmppClient;
pub use client::XmppClientBuilder;
pub use error::XmppClientError;
pub use jid::BadJid;
pub use jid::Jid;
pub use protocol::ProtocolConfig;
pub use protocol::ProtocolOutput;
pub use protocol::SessionState;
pub use protocol::XmppClientProtocol;
pub use roster::Contact;
pub use roster::NOT_IN_ROSTER;
pub use roster::Presence;
pub use roster::Roster;
pub use sasl::Mechanism;

#[cfg(test)]
mod tests;
