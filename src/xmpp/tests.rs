/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::cell::RefCell;
use std::io::Read;
use std::io::Write;
use std::net::TcpListener;
use std::net::TcpStream;
use std::rc::Rc;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use super::constants::STREAM_END;
use super::*;
use crate::EventPayload;
use crate::StreamError;

const SERVER_HEADER: &str = "<?xml version='1.0'?><stream:stream xmlns='jabber:client' \
    xmlns:stream='http://etherx.jabber.org/streams' id='s1' from='capulet.lit' version='1.0'>";

fn protocol(password: Option<&str>, use_encryption: bool) -> XmppClientProtocol {
    let mut config = ProtocolConfig::new(Jid::new("juliet@capulet.lit/balcony").unwrap());
    config.password = password.map(str::to_string);
    config.use_encryption = use_encryption;
    XmppClientProtocol::new(config)
}

fn drain(protocol: &mut XmppClientProtocol) -> Vec<ProtocolOutput> {
    let mut outputs = Vec::new();
    while let Some(output) = protocol.next_output() {
        outputs.push(output);
    }
    outputs
}

fn feed(protocol: &mut XmppClientProtocol, text: &str) -> Vec<ProtocolOutput> {
    let bytes = text.as_bytes();
    let mut consumed = 0;
    let mut outputs = Vec::new();
    while let Some(processed) = protocol.receive_bytes(&bytes[consumed..]).unwrap() {
        consumed += processed;
        outputs.extend(drain(protocol));
    }
    outputs
}

fn sent(outputs: &[ProtocolOutput]) -> Vec<String> {
    outputs
        .iter()
        .filter_map(|output| match output {
            ProtocolOutput::Send(bytes) => Some(String::from_utf8(bytes.clone()).unwrap()),
            _ => None,
        })
        .collect()
}

type Recorded = Rc<RefCell<Vec<(String, EventPayload)>>>;

fn record(protocol: &mut XmppClientProtocol, names: &[&str]) -> Recorded {
    let recorded: Recorded = Rc::new(RefCell::new(Vec::new()));
    for name in names {
        let recorded = Rc::clone(&recorded);
        let event = name.to_string();
        protocol.add_event_handler(name, move |_, payload| {
            recorded.borrow_mut().push((event.clone(), payload.clone()));
        });
    }
    recorded
}

fn authenticate_plain(protocol: &mut XmppClientProtocol) {
    protocol.open_stream();
    drain(protocol);
    assert!(feed(protocol, SERVER_HEADER).is_empty());
    let outputs = feed(
        protocol,
        "<stream:features><mechanisms xmlns='urn:ietf:params:xml:ns:xmpp-sasl'>\
         <mechanism>PLAIN</mechanism></mechanisms></stream:features>",
    );
    assert_eq!(
        sent(&outputs),
        ["<auth xmlns='urn:ietf:params:xml:ns:xmpp-sasl' mechanism='PLAIN'>AGp1bGlldAByMG0zMA==</auth>"]
    );
    assert_eq!(protocol.state(), SessionState::Authenticating(Mechanism::Plain));

    let outputs = feed(protocol, "<success xmlns='urn:ietf:params:xml:ns:xmpp-sasl'/>");
    assert_eq!(
        sent(&outputs),
        [stanza::stream_open("capulet.lit", "jabber:client")]
    );
    assert_eq!(protocol.state(), SessionState::Authenticated);
}

#[test]
fn plain_session_handshake() {
    let mut protocol = protocol(Some("r0m30"), false);
    let recorded = record(&mut protocol, &["session_start"]);
    authenticate_plain(&mut protocol);

    assert!(feed(&mut protocol, SERVER_HEADER).is_empty());
    let outputs = feed(
        &mut protocol,
        "<stream:features><bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'/>\
         <session xmlns='urn:ietf:params:xml:ns:xmpp-session'/></stream:features>",
    );
    assert_eq!(
        sent(&outputs),
        ["<iq type='set' id='1'><bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'><resource>balcony</resource></bind></iq>"]
    );
    assert_eq!(protocol.state(), SessionState::AwaitingBind);

    let outputs = feed(
        &mut protocol,
        "<iq type='result' id='1'><bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'>\
         <jid>juliet@capulet.lit/balcony-42</jid></bind></iq>",
    );
    assert_eq!(
        sent(&outputs),
        ["<iq type='set' id='2'><session xmlns='urn:ietf:params:xml:ns:xmpp-session'/></iq>"]
    );
    assert_eq!(protocol.jid().full(), "juliet@capulet.lit/balcony-42");
    assert!(recorded.borrow().is_empty());

    assert!(feed(&mut protocol, "<iq type='result' id='2'/>").is_empty());
    assert_eq!(protocol.state(), SessionState::Established);
    assert_eq!(recorded.borrow().len(), 1);

    // the session id handler is gone
    feed(&mut protocol, "<iq type='result' id='2'/>");
    assert_eq!(recorded.borrow().len(), 1);
}

#[test]
fn starttls_negotiation() {
    let mut protocol = protocol(Some("r0m30"), true);
    protocol.open_stream();
    drain(&mut protocol);
    feed(&mut protocol, SERVER_HEADER);
    let outputs = feed(
        &mut protocol,
        "<stream:features><starttls xmlns='urn:ietf:params:xml:ns:xmpp-tls'><required/></starttls>\
         <mechanisms xmlns='urn:ietf:params:xml:ns:xmpp-sasl'><mechanism>PLAIN</mechanism></mechanisms>\
         </stream:features>",
    );
    assert_eq!(sent(&outputs), [stanza::starttls()]);
    assert_eq!(protocol.state(), SessionState::AwaitingTls);

    let outputs = feed(&mut protocol, "<proceed xmlns='urn:ietf:params:xml:ns:xmpp-tls'/>");
    assert_eq!(outputs, [ProtocolOutput::StartTls]);

    protocol.tls_established();
    assert!(protocol.is_tls_active());
    assert_eq!(
        sent(&drain(&mut protocol)),
        [stanza::stream_open("capulet.lit", "jabber:client")]
    );

    // no second upgrade on the new stream
    feed(&mut protocol, SERVER_HEADER);
    let outputs = feed(
        &mut protocol,
        "<stream:features><starttls xmlns='urn:ietf:params:xml:ns:xmpp-tls'/>\
         <mechanisms xmlns='urn:ietf:params:xml:ns:xmpp-sasl'><mechanism>PLAIN</mechanism></mechanisms>\
         </stream:features>",
    );
    assert!(sent(&outputs)[0].starts_with("<auth "));
}

fn decoded_response(output: &str) -> String {
    let start = output.find('>').unwrap() + 1;
    let end = output.rfind("</response>").unwrap();
    String::from_utf8(STANDARD.decode(&output[start..end]).unwrap()).unwrap()
}

#[test]
fn digest_md5_exchange() {
    let mut protocol = protocol(Some("r0m30"), false);
    protocol.open_stream();
    drain(&mut protocol);
    feed(&mut protocol, SERVER_HEADER);
    let outputs = feed(
        &mut protocol,
        "<stream:features><mechanisms xmlns='urn:ietf:params:xml:ns:xmpp-sasl'>\
         <mechanism>PLAIN</mechanism><mechanism>DIGEST-MD5</mechanism></mechanisms></stream:features>",
    );
    assert_eq!(
        sent(&outputs),
        ["<auth xmlns='urn:ietf:params:xml:ns:xmpp-sasl' mechanism='DIGEST-MD5'/>"]
    );

    let challenge = STANDARD.encode(
        "realm=\"capulet.lit\",nonce=\"abc123\",qop=\"auth\",charset=utf-8,algorithm=md5-sess",
    );
    let outputs = feed(
        &mut protocol,
        &format!("<challenge xmlns='urn:ietf:params:xml:ns:xmpp-sasl'>{challenge}</challenge>"),
    );
    let response = decoded_response(&sent(&outputs)[0]);
    assert!(response.starts_with(
        "username=\"juliet\",realm=\"capulet.lit\",nonce=\"abc123\",cnonce=\""
    ));
    assert!(response.contains(",nc=00000001,qop=auth,digest-uri=\"xmpp/capulet.lit\",response="));

    let rspauth = STANDARD.encode("rspauth=ea40f60335c427b5527b84dbabcdfffd");
    let outputs = feed(
        &mut protocol,
        &format!("<challenge xmlns='urn:ietf:params:xml:ns:xmpp-sasl'>{rspauth}</challenge>"),
    );
    assert_eq!(
        sent(&outputs),
        ["<response xmlns='urn:ietf:params:xml:ns:xmpp-sasl'/>"]
    );

    let junk = STANDARD.encode("realm=\"x\"");
    let outputs = feed(
        &mut protocol,
        &format!("<challenge xmlns='urn:ietf:params:xml:ns:xmpp-sasl'>{junk}</challenge>"),
    );
    assert!(outputs.is_empty());
}

#[test]
fn anonymous_and_unsupported_mechanisms() {
    let mut anonymous = protocol(None, false);
    feed(&mut anonymous, SERVER_HEADER);
    let outputs = feed(
        &mut anonymous,
        "<stream:features><mechanisms xmlns='urn:ietf:params:xml:ns:xmpp-sasl'>\
         <mechanism>ANONYMOUS</mechanism></mechanisms></stream:features>",
    );
    assert_eq!(
        sent(&outputs),
        ["<auth xmlns='urn:ietf:params:xml:ns:xmpp-sasl' mechanism='ANONYMOUS'/>"]
    );

    let mut unsupported = protocol(Some("r0m30"), false);
    feed(&mut unsupported, SERVER_HEADER);
    let outputs = feed(
        &mut unsupported,
        "<stream:features><mechanisms xmlns='urn:ietf:params:xml:ns:xmpp-sasl'>\
         <mechanism>SCRAM-SHA-1</mechanism></mechanisms></stream:features>",
    );
    assert!(outputs.is_empty());
    assert_eq!(unsupported.state(), SessionState::Connected);
}

#[test]
fn empty_password_logs_in_anonymously() {
    let mut protocol = protocol(Some(""), false);
    feed(&mut protocol, SERVER_HEADER);
    let outputs = feed(
        &mut protocol,
        "<stream:features><mechanisms xmlns='urn:ietf:params:xml:ns:xmpp-sasl'>\
         <mechanism>PLAIN</mechanism><mechanism>ANONYMOUS</mechanism></mechanisms></stream:features>",
    );
    assert_eq!(
        sent(&outputs),
        ["<auth xmlns='urn:ietf:params:xml:ns:xmpp-sasl' mechanism='ANONYMOUS'/>"]
    );

    let client = XmppClient::build(Jid::new("juliet@capulet.lit").unwrap())
        .password("")
        .build();
    assert_eq!(client.protocol().config().password, None);
}

#[test]
fn authentication_failure() {
    let mut protocol = protocol(Some("wrong"), false);
    feed(&mut protocol, SERVER_HEADER);
    feed(
        &mut protocol,
        "<stream:features><mechanisms xmlns='urn:ietf:params:xml:ns:xmpp-sasl'>\
         <mechanism>PLAIN</mechanism></mechanisms></stream:features>",
    );
    let outputs = feed(
        &mut protocol,
        "<failure xmlns='urn:ietf:params:xml:ns:xmpp-sasl'><not-authorized/></failure>",
    );
    assert_eq!(outputs, [ProtocolOutput::AuthFailed]);
    assert_eq!(protocol.state(), SessionState::Failed);
}

#[test]
fn message_then_end_of_stream() {
    let mut protocol = protocol(None, false);
    let recorded = record(&mut protocol, &["message", "end_stream"]);

    feed(
        &mut protocol,
        "<stream:stream xmlns='jabber:client' xmlns:stream='http://etherx.jabber.org/streams'>",
    );
    feed(
        &mut protocol,
        "<message from=\"a@b/c\" type=\"chat\"><body>hi</body></message>",
    );
    {
        let recorded = recorded.borrow();
        assert_eq!(recorded.len(), 1);
        let (name, payload) = &recorded[0];
        assert_eq!(name, "message");
        assert_eq!(payload.get("type"), Some("chat"));
        assert_eq!(payload.get("from"), Some("a@b/c"));
        assert_eq!(payload.get("body"), Some("hi"));
        assert_eq!(payload.stanza().map(|stanza| stanza.name()), Some("message"));
    }

    let outputs = feed(&mut protocol, "</stream:stream>");
    assert_eq!(
        outputs,
        [
            ProtocolOutput::Send(STREAM_END.to_vec()),
            ProtocolOutput::Closed
        ]
    );
    let recorded = recorded.borrow();
    assert_eq!(recorded.len(), 2);
    assert_eq!(recorded[1].0, "end_stream");
    assert!(recorded[1].1.is_empty());
}

#[test]
fn message_defaults() {
    let mut protocol = protocol(None, false);
    let recorded = record(&mut protocol, &["message"]);
    feed(&mut protocol, SERVER_HEADER);
    feed(&mut protocol, "<message from='romeo@montague.lit'><subject>x</subject></message>");
    let recorded = recorded.borrow();
    assert_eq!(recorded[0].1.get("type"), Some("chat"));
    assert_eq!(recorded[0].1.get("body"), Some(""));
}

#[test]
fn presence_tracking() {
    let mut protocol = protocol(None, false);
    let recorded = record(
        &mut protocol,
        &["presence", "subscription_requested", "subscription_accepted"],
    );
    feed(&mut protocol, SERVER_HEADER);
    feed(
        &mut protocol,
        "<presence from='romeo@montague.lit/orchard'><show>chat</show>\
         <status>Under the window</status><priority>5</priority></presence>",
    );
    feed(&mut protocol, "<presence from='romeo@montague.lit/home'><show>away</show></presence>");

    let best = protocol.roster().get_presence("romeo@montague.lit").unwrap();
    assert_eq!(best.resource, "orchard");
    assert_eq!(best.priority, 5);
    assert_eq!(best.status, "Under the window");

    feed(&mut protocol, "<presence from='nurse@capulet.lit' type='subscribed'/>");
    let outputs = feed(&mut protocol, "<presence from='tybalt@capulet.lit' type='subscribe'/>");
    assert!(outputs.is_empty());

    let recorded = recorded.borrow();
    let names: Vec<&str> = recorded.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(
        names,
        [
            "presence",
            "presence",
            "subscription_accepted",
            "subscription_requested"
        ]
    );
    let first = &recorded[0].1;
    assert_eq!(first.get("type"), Some("available"));
    assert_eq!(first.get("show"), Some("chat"));
    assert_eq!(first.get("priority"), Some("5"));
    assert_eq!(recorded[2].1.get("show"), Some("subscribed"));
}

#[test]
fn auto_subscribe() {
    let mut config = ProtocolConfig::new(Jid::new("juliet@capulet.lit/balcony").unwrap());
    config.auto_subscribe = true;
    config.track_presence = false;
    let mut protocol = XmppClientProtocol::new(config);
    feed(&mut protocol, SERVER_HEADER);
    let outputs = feed(&mut protocol, "<presence from='romeo@montague.lit' type='subscribe'/>");
    assert_eq!(
        sent(&outputs),
        [
            "<presence type='subscribed' to='romeo@montague.lit' from='juliet@capulet.lit/balcony'/>",
            "<presence type='subscribe' to='romeo@montague.lit' from='juliet@capulet.lit/balcony'/>",
        ]
    );
    assert!(!protocol.roster().is_contact("romeo@montague.lit"));
}

#[test]
fn roster_result_and_push() {
    let mut protocol = protocol(None, false);
    let recorded = record(&mut protocol, &["roster_received"]);
    feed(&mut protocol, SERVER_HEADER);

    protocol.request_roster();
    assert_eq!(
        sent(&drain(&mut protocol)),
        ["<iq type='get' id='1'><query xmlns='jabber:iq:roster'/></iq>"]
    );

    let outputs = feed(
        &mut protocol,
        "<iq type='result' id='1'><query xmlns='jabber:iq:roster'>\
         <item jid='romeo@montague.lit' name='Romeo' subscription='both'><group>Friends</group></item>\
         <item jid='nurse@capulet.lit' subscription='to'/>\
         </query></iq>",
    );
    assert!(outputs.is_empty());
    let romeo = protocol.roster().get_contact("romeo@montague.lit").unwrap();
    assert_eq!(romeo.name, "Romeo");
    assert_eq!(romeo.subscription, "both");
    assert_eq!(romeo.groups, ["Friends"]);
    assert!(protocol.roster().is_contact("nurse@capulet.lit"));
    assert_eq!(recorded.borrow()[0].1.get("count"), Some("2"));

    let outputs = feed(
        &mut protocol,
        "<iq type='set' id='push1'><query xmlns='jabber:iq:roster'>\
         <item jid='benvolio@montague.lit' subscription='none'/></query></iq>",
    );
    assert_eq!(sent(&outputs), ["<iq type='result' id='push1'/>"]);
    assert!(protocol.roster().is_contact("benvolio@montague.lit"));

    // a query with foreign children is not applied
    feed(
        &mut protocol,
        "<iq type='result' id='3'><query xmlns='jabber:iq:roster'>\
         <item jid='tybalt@capulet.lit'/><bogus/></query></iq>",
    );
    assert!(!protocol.roster().is_contact("tybalt@capulet.lit"));
    assert_eq!(recorded.borrow().len(), 2);
}

#[test]
fn vcard_request() {
    let mut protocol = protocol(None, false);
    feed(&mut protocol, SERVER_HEADER);
    let wait = protocol.add_wait(&["vcard"]);

    protocol.request_vcard(Some("romeo@montague.lit"));
    assert_eq!(
        sent(&drain(&mut protocol)),
        ["<iq type='get' id='1' to='romeo@montague.lit'><vCard xmlns='vcard-temp'/></iq>"]
    );
    assert!(!protocol.wait_matched(wait));

    feed(
        &mut protocol,
        "<iq type='result' id='1' from='romeo@montague.lit'><vCard xmlns='vcard-temp'>\
         <FN>Romeo Montague</FN><N><FAMILY>Montague</FAMILY><GIVEN>Romeo</GIVEN></N>\
         </vCard></iq>",
    );
    assert!(protocol.wait_matched(wait));
    let events = protocol.take_wait(wait);
    assert_eq!(events.len(), 1);
    let vcard = &events[0].1;
    assert_eq!(vcard.get("FN"), Some("Romeo Montague"));
    assert_eq!(vcard.get("N/FAMILY"), Some("Montague"));
    assert_eq!(vcard.get("N/GIVEN"), Some("Romeo"));
    assert_eq!(vcard.get("from"), Some("romeo@montague.lit"));
    assert!(protocol.take_wait(wait).is_empty());
}

#[test]
fn external_handlers() {
    let mut protocol = protocol(None, false);
    let seen = Rc::new(RefCell::new(Vec::new()));

    let log = Rc::clone(&seen);
    protocol
        .add_path_handler("{jabber:client}iq/{jabber:iq:version}query", move |protocol, iq| {
            log.borrow_mut().push("version".to_string());
            let id = iq.attribute("id").unwrap_or_default().to_string();
            let log = Rc::clone(&log);
            protocol.add_id_handler("later", move |_, _| {
                log.borrow_mut().push("later".to_string());
            });
            protocol.send(stanza::iq_result(&id, None));
        })
        .unwrap();
    let log = Rc::clone(&seen);
    protocol.add_handler("ping", Some("urn:xmpp:ping"), crate::HandlerDepth::Any, move |_, _| {
        log.borrow_mut().push("ping".to_string());
    });
    assert!(protocol.add_path_handler("{}iq", |_, _| {}).is_err());

    feed(&mut protocol, SERVER_HEADER);
    let outputs = feed(
        &mut protocol,
        "<iq type='get' id='v1'><query xmlns='jabber:iq:version'/></iq>",
    );
    assert_eq!(sent(&outputs), ["<iq type='result' id='v1'/>"]);
    feed(&mut protocol, "<iq type='get' id='p1'><ping xmlns='urn:xmpp:ping'/></iq>");
    feed(&mut protocol, "<iq type='result' id='later'/>");
    feed(&mut protocol, "<iq type='result' id='later'/>");
    assert_eq!(*seen.borrow(), ["version", "ping", "later"]);
}

#[test]
fn outgoing_helpers() {
    let mut protocol = protocol(None, false);
    protocol.send_message("romeo@montague.lit", "Parting is such sweet sorrow", "chat", None);
    protocol.send_presence(Some("On the balcony"), "away", None, "available", 1);
    protocol.subscribe("romeo@montague.lit");
    assert_eq!(
        sent(&drain(&mut protocol)),
        [
            "<message from='juliet@capulet.lit/balcony' to='romeo@montague.lit' type='chat'><body>Parting is such sweet sorrow</body></message>",
            "<presence><show>away</show><status>On the balcony</status><priority>1</priority></presence>",
            "<presence type='subscribe' to='romeo@montague.lit' from='juliet@capulet.lit/balcony'/>",
        ]
    );
    assert_eq!(protocol.get_id(), "1");
    assert_eq!(protocol.get_id(), "2");
}

#[test]
fn malformed_stream() {
    let mut protocol = protocol(None, false);
    feed(&mut protocol, SERVER_HEADER);
    let result = protocol.receive_bytes(b"<message><body></message>");
    assert!(matches!(result, Err(StreamError::BadXml(_))));
}

#[test]
fn server_role_reset() {
    let mut config = ProtocolConfig::new(Jid::new("capulet.lit").unwrap());
    config.server_role = true;
    let mut protocol = XmppClientProtocol::new(config);
    protocol.reset_stream();
    assert!(drain(&mut protocol).is_empty());
}

// Loopback server tests

fn listen() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap().to_string();
    (listener, address)
}

fn client_builder(address: &str) -> XmppClientBuilder {
    XmppClient::build(Jid::new("juliet@capulet.lit/balcony").unwrap())
        .server(Some(address.to_string()))
        .use_encryption(false)
        .reconnect(false)
        .connection_timeout(Duration::from_secs(2))
}

/// Reads until the marker arrives, returns the text up to and including it.
fn expect(stream: &mut TcpStream, pending: &mut String, marker: &str) -> String {
    let mut buf = [0u8; 1024];
    loop {
        if let Some(pos) = pending.find(marker) {
            let end = pos + marker.len();
            let text = pending[..end].to_string();
            pending.replace_range(..end, "");
            return text;
        }
        let nr_read = stream.read(&mut buf).unwrap();
        assert!(nr_read > 0, "client closed while waiting for {marker}");
        pending.push_str(std::str::from_utf8(&buf[..nr_read]).unwrap());
    }
}

#[test]
fn wait_until_times_out() {
    let (listener, address) = listen();
    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut buf = [0u8; 1024];
        while stream.read(&mut buf).map(|nr_read| nr_read > 0).unwrap_or(false) {}
    });

    let mut client = client_builder(&address).connect().unwrap();
    let start = Instant::now();
    let events = client
        .wait_until(&["session_start"], Some(Duration::from_secs(1)))
        .unwrap();
    let elapsed = start.elapsed();
    assert!(events.is_empty());
    assert!(elapsed >= Duration::from_secs(1));
    assert!(elapsed < Duration::from_secs(3));

    let start = Instant::now();
    client.process(Some(Duration::ZERO)).unwrap();
    assert!(start.elapsed() < Duration::from_millis(500));
    assert!(!client.is_disconnected());

    drop(client);
    server.join().unwrap();
}

#[test]
fn connection_refused() {
    let (listener, address) = listen();
    drop(listener);
    let result = client_builder(&address)
        .connection_timeout(Duration::from_millis(200))
        .connect();
    assert!(matches!(result, Err(XmppClientError::Connection(_))));
}

#[test]
fn session_over_loopback() {
    let (listener, address) = listen();
    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut pending = String::new();

        let open = expect(&mut stream, &mut pending, "version='1.0'>");
        assert!(open.contains("to='capulet.lit'"));
        stream
            .write_all(
                format!(
                    "{SERVER_HEADER}<stream:features><mechanisms xmlns='urn:ietf:params:xml:ns:xmpp-sasl'>\
                     <mechanism>PLAIN</mechanism></mechanisms></stream:features>"
                )
                .as_bytes(),
            )
            .unwrap();

        let auth = expect(&mut stream, &mut pending, "</auth>");
        assert!(auth.contains("AGp1bGlldAByMG0zMA=="));
        stream
            .write_all(b"<success xmlns='urn:ietf:params:xml:ns:xmpp-sasl'/>")
            .unwrap();

        expect(&mut stream, &mut pending, "version='1.0'>");
        stream
            .write_all(
                format!(
                    "{SERVER_HEADER}<stream:features><bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'/>\
                     <session xmlns='urn:ietf:params:xml:ns:xmpp-session'/></stream:features>"
                )
                .as_bytes(),
            )
            .unwrap();

        let bind = expect(&mut stream, &mut pending, "</iq>");
        assert!(bind.contains("<resource>balcony</resource>"));
        stream
            .write_all(
                b"<iq type='result' id='1'><bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'>\
                  <jid>juliet@capulet.lit/balcony</jid></bind></iq>",
            )
            .unwrap();

        let session = expect(&mut stream, &mut pending, "</iq>");
        assert!(session.contains("id='2'"));
        stream.write_all(b"<iq type='result' id='2'/>").unwrap();

        let message = expect(&mut stream, &mut pending, "</message>");
        assert!(message.contains("<body>hi &amp; bye</body>"));
        expect(&mut stream, &mut pending, "</stream:stream>");
        stream.write_all(b"</stream:stream>").unwrap();
    });

    let mut client = client_builder(&address).password("r0m30").connect().unwrap();
    let events = client
        .wait_until(&["session_start"], Some(Duration::from_secs(5)))
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0, "session_start");
    assert_eq!(client.protocol().state(), SessionState::Established);

    client
        .message("romeo@montague.lit", "hi & bye", "chat", None)
        .unwrap();
    client.disconnect().unwrap();
    assert!(client.is_disconnected());
    server.join().unwrap();
}

#[test]
fn reconnect_after_server_closes_stream() {
    let (listener, address) = listen();
    let server = thread::spawn(move || {
        let (mut first, _) = listener.accept().unwrap();
        let mut pending = String::new();
        expect(&mut first, &mut pending, "version='1.0'>");
        first
            .write_all(format!("{SERVER_HEADER}</stream:stream>").as_bytes())
            .unwrap();
        expect(&mut first, &mut pending, "</stream:stream>");
        drop(first);

        let (mut second, _) = listener.accept().unwrap();
        let mut pending = String::new();
        let open = expect(&mut second, &mut pending, "version='1.0'>");
        second
            .write_all(
                format!(
                    "{SERVER_HEADER}<message from='romeo@montague.lit'><body>again</body></message>"
                )
                .as_bytes(),
            )
            .unwrap();
        let rest = expect(&mut second, &mut pending, "</stream:stream>");
        second.write_all(b"</stream:stream>").unwrap();
        format!("{open}{rest}")
    });

    let mut client = client_builder(&address)
        .reconnect(true)
        .reconnect_timeout(Duration::from_millis(50))
        .connect()
        .unwrap();
    let reconnects = Rc::new(RefCell::new(0));
    let counter = Rc::clone(&reconnects);
    client.add_event_handler("reconnect", move |_, _| *counter.borrow_mut() += 1);

    let events = client
        .wait_until(&["message"], Some(Duration::from_secs(5)))
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].1.get("body"), Some("again"));
    assert_eq!(*reconnects.borrow(), 1);
    assert!(!client.is_disconnected());

    client.disconnect().unwrap();
    let transcript = server.join().unwrap();
    assert_eq!(transcript.matches("<stream:stream ").count(), 1);
}

#[test]
fn wait_survives_failed_write() {
    let (listener, address) = listen();
    let server = thread::spawn(move || {
        let (mut first, _) = listener.accept().unwrap();
        let mut pending = String::new();
        expect(&mut first, &mut pending, "version='1.0'>");
        first
            .write_all(
                format!(
                    "{SERVER_HEADER}<message from='romeo@montague.lit'><body>flood</body></message>"
                )
                .as_bytes(),
            )
            .unwrap();

        // the first socket is no longer read, so the flood times out
        let (mut second, _) = listener.accept().unwrap();
        let mut pending = String::new();
        expect(&mut second, &mut pending, "version='1.0'>");
        second
            .write_all(format!("{SERVER_HEADER}<presence from='romeo@montague.lit/orchard'/>").as_bytes())
            .unwrap();
        expect(&mut second, &mut pending, "</stream:stream>");
        second.write_all(b"</stream:stream>").unwrap();
        drop(first);
    });

    let mut client = client_builder(&address)
        .reconnect(true)
        .reconnect_timeout(Duration::from_millis(50))
        .connection_timeout(Duration::from_millis(500))
        .connect()
        .unwrap();
    client.add_event_handler("message", |protocol, _| {
        protocol.send(vec![b' '; 32 << 20]);
    });

    let events = client
        .wait_until(&["presence"], Some(Duration::from_secs(10)))
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].1.get("from"), Some("romeo@montague.lit/orchard"));
    assert!(!client.is_disconnected());

    client.disconnect().unwrap();
    server.join().unwrap();
}
