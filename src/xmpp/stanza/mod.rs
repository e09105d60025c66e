/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

//! Builders for the outgoing stream elements.
//!
//! Stanzas are created without a namespace so they inherit the default
//! namespace of the stream. All user supplied text is escaped.

use crate::Element;
use crate::entities::escape;

use super::constants::BIND_NS;
use super::constants::ROSTER_NS;
use super::constants::SASL_NS;
use super::constants::SESSION_NS;
use super::constants::STREAM_NS;
use super::constants::TLS_NS;
use super::constants::VCARD_NS;

pub fn stream_open(to: &str, default_namespace: &str) -> String {
    let mut out = String::with_capacity(160);
    out.push_str("<?xml version='1.0'?><stream:stream to='");
    escape(to, &mut out);
    out.push_str("' xmlns:stream='");
    out.push_str(STREAM_NS);
    out.push_str("' xmlns='");
    escape(default_namespace, &mut out);
    out.push_str("' version='1.0'>");
    out
}

pub fn starttls() -> String {
    Element::new("starttls", TLS_NS)
        .with_child(Element::new("required", TLS_NS))
        .to_string()
}

pub fn auth(mechanism: &str, payload: Option<&str>) -> String {
    let mut auth = Element::new("auth", SASL_NS).with_attribute("mechanism", mechanism);
    if let Some(payload) = payload {
        auth = auth.with_text(payload);
    }
    auth.to_string()
}

/// Response to a SASL challenge, `None` sends an empty response.
pub fn sasl_response(payload: Option<&str>) -> String {
    let mut response = Element::new("response", SASL_NS);
    if let Some(payload) = payload {
        response = response.with_text(payload);
    }
    response.to_string()
}

pub fn bind(id: &str, resource: &str) -> String {
    let mut bind = Element::new("bind", BIND_NS);
    if !resource.is_empty() {
        bind = bind.with_child(Element::new("resource", BIND_NS).with_text(resource));
    }
    Element::new("iq", "")
        .with_attribute("type", "set")
        .with_attribute("id", id)
        .with_child(bind)
        .to_string()
}

pub fn session(id: &str) -> String {
    Element::new("iq", "")
        .with_attribute("type", "set")
        .with_attribute("id", id)
        .with_child(Element::new("session", SESSION_NS))
        .to_string()
}

pub fn roster_get(id: &str) -> String {
    Element::new("iq", "")
        .with_attribute("type", "get")
        .with_attribute("id", id)
        .with_child(Element::new("query", ROSTER_NS))
        .to_string()
}

/// Acknowledges a roster push.
pub fn iq_result(id: &str, to: Option<&str>) -> String {
    let mut iq = Element::new("iq", "")
        .with_attribute("type", "result")
        .with_attribute("id", id);
    if let Some(to) = to {
        iq = iq.with_attribute("to", to);
    }
    iq.to_string()
}

pub fn vcard_get(id: &str, to: Option<&str>) -> String {
    let mut iq = Element::new("iq", "")
        .with_attribute("type", "get")
        .with_attribute("id", id);
    if let Some(to) = to {
        iq = iq.with_attribute("to", to);
    }
    iq.with_child(Element::new("vCard", VCARD_NS)).to_string()
}

/// Message stanza. Types other than `groupchat` are sent as `chat`.
pub fn message(from: &str, to: &str, body: &str, kind: &str, subject: Option<&str>) -> String {
    let kind = match kind {
        "groupchat" => "groupchat",
        _ => "chat",
    };
    let mut message = Element::new("message", "");
    if !from.is_empty() {
        message = message.with_attribute("from", from);
    }
    message = message.with_attribute("to", to).with_attribute("type", kind);
    if let Some(subject) = subject {
        message = message.with_child(Element::new("subject", "").with_text(subject));
    }
    message
        .with_child(Element::new("body", "").with_text(body))
        .to_string()
}

/// Presence stanza.
///
/// A `show` of `available` is the default state and is not sent, a
/// `show` of `unavailable` turns into the presence type.
pub fn presence(
    status: Option<&str>,
    show: &str,
    to: Option<&str>,
    kind: &str,
    priority: i32,
) -> String {
    let mut presence = Element::new("presence", "");
    if let Some(to) = to {
        presence = presence.with_attribute("to", to);
    }
    let kind = if show == "unavailable" { "unavailable" } else { kind };
    if !kind.is_empty() && kind != "available" {
        presence = presence.with_attribute("type", kind);
    }
    if show != "available" && show != "unavailable" {
        presence = presence.with_child(Element::new("show", "").with_text(show));
    }
    if let Some(status) = status {
        presence = presence.with_child(Element::new("status", "").with_text(status));
    }
    if priority != 0 {
        presence =
            presence.with_child(Element::new("priority", "").with_text(priority.to_string()));
    }
    presence.to_string()
}

/// Subscription request (`subscribe`) or approval (`subscribed`).
pub fn subscription(kind: &str, to: &str, from: &str) -> String {
    let mut presence = Element::new("presence", "")
        .with_attribute("type", kind)
        .with_attribute("to", to);
    if !from.is_empty() {
        presence = presence.with_attribute("from", from);
    }
    presence.to_string()
}

#[cfg(test)]
mod tests;
