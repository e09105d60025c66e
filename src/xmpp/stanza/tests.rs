/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use super::*;

#[test]
fn stream_header() {
    assert_eq!(
        stream_open("capulet.lit", "jabber:client"),
        "<?xml version='1.0'?><stream:stream to='capulet.lit' xmlns:stream='http://etherx.jabber.org/streams' xmlns='jabber:client' version='1.0'>"
    );
}

#[test]
fn handshake_elements() {
    assert_eq!(
        starttls(),
        "<starttls xmlns='urn:ietf:params:xml:ns:xmpp-tls'><required/></starttls>"
    );
    assert_eq!(
        auth("PLAIN", Some("AGEAYg==")),
        "<auth xmlns='urn:ietf:params:xml:ns:xmpp-sasl' mechanism='PLAIN'>AGEAYg==</auth>"
    );
    assert_eq!(
        sasl_response(None),
        "<response xmlns='urn:ietf:params:xml:ns:xmpp-sasl'/>"
    );
    assert_eq!(
        bind("1", "balcony"),
        "<iq type='set' id='1'><bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'><resource>balcony</resource></bind></iq>"
    );
    assert_eq!(
        session("2"),
        "<iq type='set' id='2'><session xmlns='urn:ietf:params:xml:ns:xmpp-session'/></iq>"
    );
}

#[test]
fn messages_escaped() {
    assert_eq!(
        message("", "romeo@montague.lit", "a < b & c", "normal", None),
        "<message to='romeo@montague.lit' type='chat'><body>a &lt; b &amp; c</body></message>"
    );
    assert_eq!(
        message("j@c/b", "room@muc", "hi", "groupchat", Some("'topic'")),
        "<message from='j@c/b' to='room@muc' type='groupchat'><subject>&apos;topic&apos;</subject><body>hi</body></message>"
    );
}

#[test]
fn presences() {
    assert_eq!(presence(None, "available", None, "available", 0), "<presence/>");
    assert_eq!(
        presence(Some("Out & about"), "away", Some("romeo@montague.lit"), "available", 5),
        "<presence to='romeo@montague.lit'><show>away</show><status>Out &amp; about</status><priority>5</priority></presence>"
    );
    assert_eq!(
        presence(None, "unavailable", None, "available", 0),
        "<presence type='unavailable'/>"
    );
    assert_eq!(
        subscription("subscribed", "romeo@montague.lit", "juliet@capulet.lit/balcony"),
        "<presence type='subscribed' to='romeo@montague.lit' from='juliet@capulet.lit/balcony'/>"
    );
}

#[test]
fn iqs() {
    assert_eq!(
        roster_get("3"),
        "<iq type='get' id='3'><query xmlns='jabber:iq:roster'/></iq>"
    );
    assert_eq!(
        iq_result("push1", Some("juliet@capulet.lit")),
        "<iq type='result' id='push1' to='juliet@capulet.lit'/>"
    );
    assert_eq!(
        vcard_get("4", None),
        "<iq type='get' id='4'><vCard xmlns='vcard-temp'/></iq>"
    );
}
