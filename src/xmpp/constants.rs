/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

pub const CLIENT_PORT: u16 = 5222;

pub const CLIENT_NS: &str = "jabber:client";

pub const STREAM_NS: &str = "http://etherx.jabber.org/streams";

pub const TLS_NS: &str = "urn:ietf:params:xml:ns:xmpp-tls";

pub const SASL_NS: &str = "urn:ietf:params:xml:ns:xmpp-sasl";

pub const BIND_NS: &str = "urn:ietf:params:xml:ns:xmpp-bind";

pub const SESSION_NS: &str = "urn:ietf:params:xml:ns:xmpp-session";

pub const ROSTER_NS: &str = "jabber:iq:roster";

pub const VCARD_NS: &str = "vcard-temp";

pub const STREAM_END: &[u8] = b"</stream:stream>";

pub mod events {
    pub const MESSAGE: &str = "message";
    pub const PRESENCE: &str = "presence";
    pub const SUBSCRIPTION_REQUESTED: &str = "subscription_requested";
    pub const SUBSCRIPTION_ACCEPTED: &str = "subscription_accepted";
    pub const SESSION_START: &str = "session_start";
    pub const ROSTER_RECEIVED: &str = "roster_received";
    pub const VCARD: &str = "vcard";
    pub const RECONNECT: &str = "reconnect";
    pub const END_STREAM: &str = "end_stream";
}
