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
use std::collections::VecDeque;
use std::rc::Rc;

use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::BadPath;
use crate::Dispatcher;
use crate::Element;
use crate::EventCallback;
use crate::EventPayload;
use crate::HandlerDepth;
use crate::Location;
use crate::Path;
use crate::PathStep;
use crate::PrefixScoping;
use crate::Receiver;
use crate::StanzaCallback;
use crate::StreamError;
use crate::StreamEvent;
use crate::StreamParser;
use crate::WaitId;

use super::Jid;
use super::Roster;
use super::constants::BIND_NS;
use super::constants::CLIENT_NS;
use super::constants::ROSTER_NS;
use super::constants::SASL_NS;
use super::constants::STREAM_END;
use super::constants::STREAM_NS;
use super::constants::TLS_NS;
use super::constants::VCARD_NS;
use super::constants::events;
use super::sasl;
use super::sasl::Challenge;
use super::sasl::DigestMd5;
use super::sasl::Mechanism;
use super::stanza;

/// What the connection has to do on behalf of the protocol.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ProtocolOutput {
    /// Write the bytes to the server.
    Send(Vec<u8>),
    /// Upgrade the connection to TLS and call
    /// [XmppClientProtocol::tls_established].
    StartTls,
    /// The server closed the stream.
    Closed,
    /// The server rejected the credentials.
    AuthFailed,
}

/// Progress of the session negotiation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionState {
    Connected,
    AwaitingTls,
    Authenticating(Mechanism),
    Authenticated,
    AwaitingBind,
    AwaitingSession,
    Established,
    Failed,
}

/// Settings of the session negotiation.
#[derive(Clone, Debug)]
pub struct ProtocolConfig {
    pub jid: Jid,
    /// Authentication name, the local part of the JID by default.
    pub username: String,
    /// `None` or an empty password authenticates anonymously.
    pub password: Option<String>,
    /// Resource to bind, empty lets the server pick one.
    pub resource: String,
    /// Domain the stream is opened to.
    pub server: String,
    pub use_encryption: bool,
    pub auto_subscribe: bool,
    pub track_presence: bool,
    pub default_namespace: String,
    pub prefix_scoping: PrefixScoping,
    /// Server role streams do not send their own open tag on resets.
    pub server_role: bool,
}

impl ProtocolConfig {
    pub fn new(jid: Jid) -> Self {
        ProtocolConfig {
            username: jid.localpart().unwrap_or_default().to_string(),
            password: None,
            resource: jid.resourcepart().unwrap_or_default().to_string(),
            server: jid.domainpart().to_string(),
            use_encryption: true,
            auto_subscribe: false,
            track_presence: true,
            default_namespace: CLIENT_NS.to_string(),
            prefix_scoping: PrefixScoping::default(),
            server_role: false,
            jid,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Action {
    Features,
    TlsProceed,
    SaslChallenge,
    SaslSuccess,
    SaslFailure,
    Message,
    Presence,
    RosterQuery,
    ResourceBind,
    SessionStart,
    VCard,
}

/// Sans-IO XMPP client session.
///
/// Bytes received from the server are fed with
/// [receive_bytes](Self::receive_bytes), the resulting work is collected
/// with [next_output](Self::next_output). Handlers registered here are
/// called with the protocol itself, so they can send stanzas and
/// register further handlers.
pub struct XmppClientProtocol {
    config: ProtocolConfig,
    parser: StreamParser,
    dispatcher: Dispatcher<XmppClientProtocol, Action>,
    roster: Roster,
    state: SessionState,
    authenticated: bool,
    tls_active: bool,
    bound_jid: Option<Jid>,
    outputs: VecDeque<ProtocolOutput>,
    last_id: u64,
    close_sent: bool,
}

impl XmppClientProtocol {
    pub fn new(config: ProtocolConfig) -> Self {
        let mut dispatcher = Dispatcher::new(&config.default_namespace);
        let default_ns = config.default_namespace.as_str();
        let builtins = [
            (vec![(STREAM_NS, "features")], Action::Features),
            (vec![(TLS_NS, "proceed")], Action::TlsProceed),
            (vec![(SASL_NS, "challenge")], Action::SaslChallenge),
            (vec![(SASL_NS, "success")], Action::SaslSuccess),
            (vec![(SASL_NS, "failure")], Action::SaslFailure),
            (vec![(default_ns, "message")], Action::Message),
            (vec![(default_ns, "presence")], Action::Presence),
            (
                vec![(default_ns, "iq"), (ROSTER_NS, "query")],
                Action::RosterQuery,
            ),
        ];
        for (steps, action) in builtins {
            let steps = steps
                .into_iter()
                .map(|(namespace, name)| PathStep::new(Some(namespace), name))
                .collect();
            dispatcher.add_path_handler(Path::from_steps(steps), Receiver::Owner(action));
        }

        XmppClientProtocol {
            parser: StreamParser::new(&config.default_namespace, config.prefix_scoping),
            config,
            dispatcher,
            roster: Roster::new(),
            state: SessionState::Connected,
            authenticated: false,
            tls_active: false,
            bound_jid: None,
            outputs: VecDeque::new(),
            last_id: 0,
            close_sent: false,
        }
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Full JID of the session, as bound by the server if it is bound.
    pub fn jid(&self) -> &Jid {
        self.bound_jid.as_ref().unwrap_or(&self.config.jid)
    }

    /// Position of the parser in the current stream.
    pub fn location(&self) -> Location {
        self.parser.location()
    }

    pub fn is_tls_active(&self) -> bool {
        self.tls_active
    }

    /// Next unique stanza id.
    pub fn get_id(&mut self) -> String {
        self.last_id += 1;
        self.last_id.to_string()
    }

    pub fn next_output(&mut self) -> Option<ProtocolOutput> {
        self.outputs.pop_front()
    }

    /// Queues bytes to be sent.
    pub fn send(&mut self, bytes: impl Into<Vec<u8>>) {
        self.outputs.push_back(ProtocolOutput::Send(bytes.into()));
    }

    /// Queues the stream open tag.
    pub fn open_stream(&mut self) {
        self.close_sent = false;
        let open = stanza::stream_open(&self.config.server, &self.config.default_namespace);
        self.send(open);
    }

    /// Queues the stream close tag, if not sent already.
    pub fn close_stream(&mut self) {
        if !self.close_sent {
            self.close_sent = true;
            self.send(STREAM_END);
        }
    }

    /// Starts a new stream on the same connection.
    ///
    /// Parser state and namespace bindings are forgotten. Unless in
    /// server role, a fresh stream open tag is queued.
    pub fn reset_stream(&mut self) {
        self.parser.reset();
        if !self.config.server_role {
            self.open_stream();
        }
    }

    /// Forgets the negotiation state for a new connection.
    pub fn reset_session(&mut self, tls_active: bool) {
        self.parser.reset();
        self.state = SessionState::Connected;
        self.authenticated = false;
        self.tls_active = tls_active;
        self.bound_jid = None;
        self.close_sent = false;
        self.outputs.clear();
    }

    /// Must be called after the connection is upgraded to TLS.
    pub fn tls_established(&mut self) {
        self.tls_active = true;
        self.state = SessionState::Connected;
        self.reset_stream();
    }

    /// Feeds received bytes until the next stream event is handled.
    ///
    /// Returns the number of bytes consumed for that event, the rest must
    /// be fed again after collecting the outputs. `None` means all bytes
    /// are consumed without completing an event.
    pub fn receive_bytes(&mut self, bytes: &[u8]) -> Result<Option<usize>, StreamError> {
        match self.parser.parse_bytes(bytes)? {
            Some((event, consumed)) => {
                self.handle_event(event);
                Ok(Some(consumed))
            }
            None => Ok(None),
        }
    }

    fn handle_event(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Start(root) => {
                debug!(
                    id = root.attribute("id").unwrap_or_default(),
                    from = root.attribute("from").unwrap_or_default(),
                    "stream opened"
                );
            }
            StreamEvent::Stanza(stanza) => self.dispatch(&stanza),
            StreamEvent::End => {
                debug!("stream closed by server");
                self.close_stream();
                self.outputs.push_back(ProtocolOutput::Closed);
                self.raise_event(events::END_STREAM, EventPayload::new());
            }
        }
    }

    fn dispatch(&mut self, stanza: &Element) {
        let receivers = self.dispatcher.dispatch(stanza);
        if receivers.is_empty() {
            debug!(name = stanza.name(), ns = stanza.namespace(), "unhandled stanza");
        }
        for receiver in receivers {
            match receiver {
                Receiver::Owner(action) => self.perform(action, stanza),
                Receiver::External(callback) => {
                    let Ok(mut handler) = callback.try_borrow_mut() else {
                        warn!(name = stanza.name(), "handler is already running");
                        continue;
                    };
                    (*handler)(self, stanza);
                }
            }
        }
    }

    /// Calls the handlers of the event and queues it for the waits.
    pub fn raise_event(&mut self, name: &str, payload: EventPayload) {
        debug!(event = name, "event raised");
        for callback in self.dispatcher.event_callbacks(name) {
            let Ok(mut handler) = callback.try_borrow_mut() else {
                warn!(event = name, "event handler is already running");
                continue;
            };
            (*handler)(self, &payload);
        }
        self.dispatcher.notify_waits(name, &payload);
    }

    /// Registers a handler for the stanzas with the given name.
    ///
    /// A `None` namespace means the default namespace of the stream.
    pub fn add_handler<F>(&mut self, name: &str, namespace: Option<&str>, depth: HandlerDepth, f: F)
    where
        F: FnMut(&mut XmppClientProtocol, &Element) + 'static,
    {
        let callback: StanzaCallback<XmppClientProtocol> = Rc::new(RefCell::new(f));
        self.dispatcher
            .add_handler(name, namespace, depth, Receiver::External(callback));
    }

    /// Registers a handler for the stanzas matching the path.
    pub fn add_path_handler<F>(&mut self, path: &str, f: F) -> Result<(), BadPath>
    where
        F: FnMut(&mut XmppClientProtocol, &Element) + 'static,
    {
        let path = Path::new(path)?;
        let callback: StanzaCallback<XmppClientProtocol> = Rc::new(RefCell::new(f));
        self.dispatcher
            .add_path_handler(path, Receiver::External(callback));
        Ok(())
    }

    /// Registers a handler for the next stanza with the id.
    pub fn add_id_handler<F>(&mut self, id: &str, f: F)
    where
        F: FnMut(&mut XmppClientProtocol, &Element) + 'static,
    {
        let callback: StanzaCallback<XmppClientProtocol> = Rc::new(RefCell::new(f));
        self.dispatcher.add_id_handler(id, Receiver::External(callback));
    }

    pub fn add_event_handler<F>(&mut self, name: &str, f: F)
    where
        F: FnMut(&mut XmppClientProtocol, &EventPayload) + 'static,
    {
        let callback: EventCallback<XmppClientProtocol> = Rc::new(RefCell::new(f));
        self.dispatcher.add_event_handler(name, callback);
    }

    pub fn add_wait(&mut self, names: &[&str]) -> WaitId {
        self.dispatcher.add_wait(names)
    }

    pub fn wait_matched(&self, id: WaitId) -> bool {
        self.dispatcher.wait_matched(id)
    }

    pub fn take_wait(&mut self, id: WaitId) -> Vec<(String, EventPayload)> {
        self.dispatcher.take_wait(id)
    }

    /// Sends a chat message from the session JID.
    pub fn send_message(&mut self, to: &str, body: &str, kind: &str, subject: Option<&str>) {
        let message = stanza::message(self.jid().full(), to, body, kind, subject);
        self.send(message);
    }

    pub fn send_presence(
        &mut self,
        status: Option<&str>,
        show: &str,
        to: Option<&str>,
        kind: &str,
        priority: i32,
    ) {
        let presence = stanza::presence(status, show, to, kind, priority);
        self.send(presence);
    }

    /// Asks for the presence of the contact.
    pub fn subscribe(&mut self, to: &str) {
        let presence = stanza::subscription("subscribe", to, self.jid().full());
        self.send(presence);
    }

    /// Asks the server for the roster, `roster_received` is raised when
    /// it arrives.
    pub fn request_roster(&mut self) {
        let id = self.get_id();
        self.send(stanza::roster_get(&id));
    }

    /// Asks for a vCard, our own if `to` is `None`. The `vcard` event
    /// carries the result.
    pub fn request_vcard(&mut self, to: Option<&str>) {
        let id = self.get_id();
        self.dispatcher
            .add_id_handler(&id, Receiver::Owner(Action::VCard));
        self.send(stanza::vcard_get(&id, to));
    }

    fn perform(&mut self, action: Action, stanza: &Element) {
        match action {
            Action::Features => self.on_features(stanza),
            Action::TlsProceed => {
                info!("starting TLS");
                self.outputs.push_back(ProtocolOutput::StartTls);
            }
            Action::SaslChallenge => self.on_challenge(stanza),
            Action::SaslSuccess => {
                info!("authenticated");
                self.authenticated = true;
                self.state = SessionState::Authenticated;
                self.reset_stream();
            }
            Action::SaslFailure => {
                let reason = stanza
                    .children()
                    .first()
                    .map(Element::name)
                    .unwrap_or_default();
                error!(reason, "authentication failed");
                self.state = SessionState::Failed;
                self.outputs.push_back(ProtocolOutput::AuthFailed);
            }
            Action::Message => self.on_message(stanza),
            Action::Presence => self.on_presence(stanza),
            Action::RosterQuery => self.on_roster(stanza),
            Action::ResourceBind => self.on_bind(stanza),
            Action::SessionStart => {
                info!(jid = self.jid().full(), "session started");
                self.state = SessionState::Established;
                self.raise_event(events::SESSION_START, EventPayload::new());
            }
            Action::VCard => self.on_vcard(stanza),
        }
    }

    fn has_password(&self) -> bool {
        self.config
            .password
            .as_deref()
            .is_some_and(|password| !password.is_empty())
    }

    fn on_features(&mut self, features: &Element) {
        if features.has_child("starttls", Some(TLS_NS))
            && self.config.use_encryption
            && !self.tls_active
        {
            self.state = SessionState::AwaitingTls;
            self.send(stanza::starttls());
        } else if self.authenticated {
            if !features.has_child("bind", Some(BIND_NS)) {
                warn!("server does not offer resource binding");
                return;
            }
            let id = self.get_id();
            self.dispatcher
                .add_id_handler(&id, Receiver::Owner(Action::ResourceBind));
            self.state = SessionState::AwaitingBind;
            let bind = stanza::bind(&id, &self.config.resource);
            self.send(bind);
        } else {
            let offered: Vec<&str> = features
                .child("mechanisms", Some(SASL_NS))
                .map(|mechanisms| {
                    mechanisms
                        .children()
                        .iter()
                        .filter(|child| child.name() == "mechanism")
                        .map(Element::text)
                        .collect()
                })
                .unwrap_or_default();
            let Some(mechanism) =
                sasl::choose_mechanism(&offered, self.has_password())
            else {
                warn!(?offered, "no supported SASL mechanism");
                return;
            };
            info!(mechanism = mechanism.name(), "authenticating");
            let payload = match (mechanism, &self.config.password) {
                (Mechanism::Plain, Some(password)) => {
                    Some(sasl::plain_payload(&self.config.username, password))
                }
                _ => None,
            };
            self.state = SessionState::Authenticating(mechanism);
            self.send(stanza::auth(mechanism.name(), payload.as_deref()));
        }
    }

    fn on_challenge(&mut self, stanza: &Element) {
        let Some(text) = sasl::decode_challenge(stanza.text()) else {
            warn!("undecodable SASL challenge");
            return;
        };
        let challenge = Challenge::parse(&text);
        if challenge.get("nonce").is_some() {
            let digest = DigestMd5 {
                username: &self.config.username,
                password: self.config.password.as_deref().unwrap_or_default(),
                server: &self.config.server,
            };
            if let Some(response) = digest.respond(&challenge, &sasl::generate_cnonce()) {
                let encoded = sasl::encode_response(&response);
                self.send(stanza::sasl_response(Some(&encoded)));
            }
        } else if challenge.get("rspauth").is_some() {
            self.send(stanza::sasl_response(None));
        } else {
            error!(challenge = %text, "unexpected SASL challenge");
        }
    }

    fn on_bind(&mut self, result: &Element) {
        if result.attribute("type") == Some("result") {
            let bound = result
                .child("bind", Some(BIND_NS))
                .and_then(|bind| bind.child_text("jid", Some(BIND_NS)));
            match bound.map(Jid::new) {
                Some(Ok(jid)) => {
                    info!(jid = jid.full(), "resource bound");
                    self.bound_jid = Some(jid);
                }
                Some(Err(err)) => warn!(%err, "server bound an invalid JID"),
                None => warn!("bind result without a JID"),
            }
        } else {
            warn!(kind = result.attribute("type"), "resource binding failed");
        }
        let id = self.get_id();
        self.dispatcher
            .add_id_handler(&id, Receiver::Owner(Action::SessionStart));
        self.state = SessionState::AwaitingSession;
        self.send(stanza::session(&id));
    }

    fn on_message(&mut self, message: &Element) {
        let payload = EventPayload::new()
            .with_field("type", message.attribute("type").unwrap_or("chat"))
            .with_field("from", message.attribute("from").unwrap_or_default())
            .with_field("body", message.child_text("body", None).unwrap_or_default())
            .with_stanza(message.clone());
        debug!(
            from = payload.get("from"),
            body = payload.get("body"),
            "message"
        );
        self.raise_event(events::MESSAGE, payload);
    }

    fn on_presence(&mut self, presence: &Element) {
        let kind = presence.attribute("type").unwrap_or("available");
        let show = presence.child_text("show", None).unwrap_or(kind);
        let from = presence.attribute("from").unwrap_or_default();
        let status = presence.child_text("status", None).unwrap_or_default();
        let priority: i32 = presence
            .child_text("priority", None)
            .and_then(|priority| priority.trim().parse().ok())
            .unwrap_or(0);

        if self.config.track_presence {
            self.roster.set_presence(from, priority, show, status);
        }
        debug!(from, show, status, "presence");

        let payload = EventPayload::new()
            .with_field("type", kind)
            .with_field("show", show)
            .with_field("from", from)
            .with_field("status", status)
            .with_field("priority", priority.to_string())
            .with_stanza(presence.clone());

        match presence.attribute("type") {
            Some("subscribe") => {
                if self.config.auto_subscribe {
                    let jid = self.jid().full().to_string();
                    self.send(stanza::subscription("subscribed", from, &jid));
                    self.send(stanza::subscription("subscribe", from, &jid));
                }
                self.raise_event(events::SUBSCRIPTION_REQUESTED, payload);
            }
            Some("subscribed") => self.raise_event(events::SUBSCRIPTION_ACCEPTED, payload),
            _ => self.raise_event(events::PRESENCE, payload),
        }
    }

    fn on_roster(&mut self, iq: &Element) {
        let Some(query) = iq.child("query", Some(ROSTER_NS)) else {
            return;
        };
        let mut contacts = Vec::new();
        let mut valid = true;
        for item in query.children() {
            if item.name() != "item" {
                valid = false;
                continue;
            }
            let Some(jid) = item.attribute("jid") else {
                valid = false;
                continue;
            };
            let groups: Vec<String> = item
                .children()
                .iter()
                .filter(|child| child.name() == "group")
                .map(|group| group.text().to_string())
                .collect();
            contacts.push((
                jid,
                item.attribute("subscription").unwrap_or_default(),
                item.attribute("name").unwrap_or_default(),
                groups,
            ));
        }
        if valid {
            debug!(count = contacts.len(), "roster items");
            let count = contacts.len();
            for (jid, subscription, name, groups) in contacts {
                self.roster.add_contact(jid, subscription, name, groups);
            }
            self.raise_event(
                events::ROSTER_RECEIVED,
                EventPayload::new()
                    .with_field("count", count.to_string())
                    .with_stanza(iq.clone()),
            );
        } else {
            warn!("malformed roster query ignored");
        }
        if iq.attribute("type") == Some("set") {
            let id = iq.attribute("id").unwrap_or_default();
            self.send(stanza::iq_result(id, iq.attribute("from")));
        }
    }

    fn on_vcard(&mut self, iq: &Element) {
        if iq.attribute("type") == Some("error") {
            warn!(from = iq.attribute("from"), "vCard request failed");
            return;
        }
        let mut payload = EventPayload::new();
        if let Some(vcard) = iq.child("vCard", Some(VCARD_NS)) {
            for field in vcard.children() {
                if field.children().is_empty() {
                    payload.set(field.name(), field.text());
                } else {
                    for sub in field.children() {
                        payload.set(format!("{}/{}", field.name(), sub.name()), sub.text());
                    }
                }
            }
        }
        payload.set("from", iq.attribute("from").unwrap_or_default());
        self.raise_event(events::VCARD, payload.with_stanza(iq.clone()));
    }
}
