/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::io;
use std::thread::sleep;
use std::time::Duration;
use std::time::Instant;

use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::BadPath;
use crate::Element;
use crate::EventPayload;
use crate::HandlerDepth;
use crate::PrefixScoping;
use crate::WaitId;

use super::Jid;
use super::ProtocolConfig;
use super::ProtocolOutput;
use super::Roster;
use super::XmppClientError;
use super::XmppClientProtocol;
use super::constants::CLIENT_PORT;
use super::constants::events;
use super::transport::Transport;

const RETRY_DELAY: Duration = Duration::from_secs(5);
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct XmppClientBuilder {
    config: ProtocolConfig,
    host: Option<String>,
    port: u16,
    connection_timeout: Duration,
    reconnect_timeout: Duration,
    use_ssl: bool,
    reconnect: bool,
}

impl XmppClientBuilder {
    pub fn new(jid: Jid) -> Self {
        XmppClientBuilder {
            config: ProtocolConfig::new(jid),
            host: None,
            port: CLIENT_PORT,
            connection_timeout: Duration::from_secs(30),
            reconnect_timeout: Duration::from_secs(30),
            use_ssl: false,
            reconnect: true,
        }
    }

    /// Host to connect to instead of the JID domain. It may include a port.
    pub fn server(mut self, server: Option<String>) -> Self {
        self.host = server;
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Password for the SASL authentication. Without one, or with an
    /// empty one, the client logs in anonymously.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        let password = password.into();
        self.config.password = (!password.is_empty()).then_some(password);
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.config.username = username.into();
        self
    }

    pub fn resource(mut self, resource: impl Into<String>) -> Self {
        self.config.resource = resource.into();
        self
    }

    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Delay before connecting again after the connection is lost.
    pub fn reconnect_timeout(mut self, timeout: Duration) -> Self {
        self.reconnect_timeout = timeout;
        self
    }

    /// Upgrade to TLS when the server offers STARTTLS.
    pub fn use_encryption(mut self, enabled: bool) -> Self {
        self.config.use_encryption = enabled;
        self
    }

    /// Use TLS from the start of the connection.
    pub fn use_ssl(mut self, enabled: bool) -> Self {
        self.use_ssl = enabled;
        self
    }

    pub fn reconnect(mut self, enabled: bool) -> Self {
        self.reconnect = enabled;
        self
    }

    pub fn server_role(mut self, enabled: bool) -> Self {
        self.config.server_role = enabled;
        self
    }

    /// Accept every subscription request and subscribe back.
    pub fn auto_subscribe(mut self, enabled: bool) -> Self {
        self.config.auto_subscribe = enabled;
        self
    }

    pub fn track_presence(mut self, enabled: bool) -> Self {
        self.config.track_presence = enabled;
        self
    }

    pub fn prefix_scoping(mut self, scoping: PrefixScoping) -> Self {
        self.config.prefix_scoping = scoping;
        self
    }

    pub fn default_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.default_namespace = namespace.into();
        self
    }

    /// Creates the client without connecting.
    pub fn build(self) -> XmppClient {
        let host = self
            .host
            .unwrap_or_else(|| self.config.jid.domainpart().to_string());
        XmppClient {
            protocol: XmppClientProtocol::new(self.config),
            transport: None,
            host,
            port: self.port,
            connection_timeout: self.connection_timeout,
            reconnect_timeout: self.reconnect_timeout,
            use_ssl: self.use_ssl,
            reconnect: self.reconnect,
            read_buffer: [0; 4096],
            consumed: 0,
            read: 0,
        }
    }

    /// Connects and opens the stream.
    pub fn connect(self) -> Result<XmppClient, XmppClientError> {
        let mut client = self.build();
        client.connect(true)?;
        Ok(client)
    }
}

/// Blocking XMPP client connection.
///
/// The client owns the socket and the [XmppClientProtocol] session. Input
/// is only read while one of [process](Self::process) or
/// [wait_until](Self::wait_until) runs, and the handlers are called from
/// there.
///
/// ```no_run
/// use iksxmpp::XmppClient;
///
/// let jid = "juliet@capulet.lit/balcony".parse().unwrap();
/// let mut client = XmppClient::build(jid).password("r0m30").connect().unwrap();
/// client.wait_until(&["session_start"], None).unwrap();
/// client.presence(None, "available", None, "available", 0).unwrap();
/// client.message("romeo@montague.lit", "Wherefore art thou?", "chat", None).unwrap();
/// client.disconnect().unwrap();
/// ```
pub struct XmppClient {
    protocol: XmppClientProtocol,
    transport: Option<Transport>,
    host: String,
    port: u16,
    connection_timeout: Duration,
    reconnect_timeout: Duration,
    use_ssl: bool,
    reconnect: bool,
    read_buffer: [u8; 4096],
    consumed: usize,
    read: usize,
}

fn not_connected() -> XmppClientError {
    XmppClientError::Io(io::Error::new(io::ErrorKind::NotConnected, "not connected"))
}

impl XmppClient {
    pub fn build(jid: Jid) -> XmppClientBuilder {
        XmppClientBuilder::new(jid)
    }

    /// Connects to the server, trying again until the connection timeout
    /// is over.
    pub fn connect(&mut self, send_open_tag: bool) -> Result<(), XmppClientError> {
        let start = Instant::now();
        let server = self.protocol.config().server.clone();
        let transport = loop {
            match Transport::connect(
                &self.host,
                self.port,
                self.connection_timeout,
                self.use_ssl,
                &server,
            ) {
                Ok(transport) => break transport,
                Err(err) => {
                    let elapsed = start.elapsed();
                    if elapsed >= self.connection_timeout {
                        error!(host = %self.host, %err, "giving up connecting");
                        return Err(XmppClientError::Connection(format!(
                            "{}:{}: {err}",
                            self.host, self.port
                        )));
                    }
                    warn!(host = %self.host, %err, "connection attempt failed");
                    sleep(RETRY_DELAY.min(self.connection_timeout - elapsed));
                }
            }
        };
        info!(host = %self.host, port = self.port, tls = transport.is_tls(), "connected");
        self.transport = Some(transport);
        self.read = 0;
        self.consumed = 0;
        self.protocol.reset_session(self.use_ssl);
        if send_open_tag {
            self.protocol.open_stream();
        }
        self.flush_outputs()
    }

    /// Connects again after the reconnect timeout and starts a new
    /// session. Does nothing in server role.
    pub fn reconnect(&mut self) -> Result<(), XmppClientError> {
        if self.protocol.config().server_role {
            return Ok(());
        }
        self.close();
        info!(delay = ?self.reconnect_timeout, "reconnecting");
        sleep(self.reconnect_timeout);
        self.connect(false)?;
        self.protocol.reset_stream();
        self.protocol
            .raise_event(events::RECONNECT, EventPayload::new());
        self.flush_outputs()
    }

    /// Closes the stream and waits a little for the server to close its
    /// side.
    pub fn disconnect(&mut self) -> Result<(), XmppClientError> {
        self.reconnect = false;
        if self.transport.is_none() {
            return Ok(());
        }
        info!("disconnecting");
        self.protocol.close_stream();
        self.flush_outputs()?;
        if let Err(err) = self.wait_until(&[events::END_STREAM], Some(DISCONNECT_TIMEOUT)) {
            debug!(%err, "error while closing the stream");
        }
        self.close();
        Ok(())
    }

    pub fn is_disconnected(&self) -> bool {
        self.transport.is_none()
    }

    fn close(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.shutdown();
        }
        self.read = 0;
        self.consumed = 0;
    }

    /// Reads and handles input for the given time.
    ///
    /// A zero duration only handles what is already available, `None`
    /// runs until the connection is closed.
    pub fn process(&mut self, budget: Option<Duration>) -> Result<(), XmppClientError> {
        self.poll(budget, None)
    }

    pub fn process_time(&mut self, budget: Duration) -> Result<(), XmppClientError> {
        self.poll(Some(budget), None)
    }

    /// Handles input until one of the events is raised.
    ///
    /// Returns the raised events with their payloads, which is empty if
    /// the timeout passed or the connection is closed before any of them.
    /// A `None` timeout waits forever.
    pub fn wait_until(
        &mut self,
        names: &[&str],
        timeout: Option<Duration>,
    ) -> Result<Vec<(String, EventPayload)>, XmppClientError> {
        let wait = self.protocol.add_wait(names);
        let result = self.poll(timeout, Some(wait));
        let events = self.protocol.take_wait(wait);
        match result {
            Ok(()) => Ok(events),
            Err(XmppClientError::Io(err)) => {
                debug!(%err, "connection lost while waiting");
                Ok(events)
            }
            Err(err) => Err(err),
        }
    }

    fn poll(&mut self, budget: Option<Duration>, wait: Option<WaitId>) -> Result<(), XmppClientError> {
        let deadline = budget.map(|budget| Instant::now() + budget);
        loop {
            if let Some(wait) = wait
                && self.protocol.wait_matched(wait)
            {
                return Ok(());
            }
            if self.transport.is_none() {
                return match wait {
                    Some(_) => Ok(()),
                    None => Err(not_connected()),
                };
            }
            let remaining = deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()));
            match self.read_chunk(remaining) {
                Ok(()) => (),
                // A failed write which reconnected leaves a live transport
                Err(XmppClientError::Io(err)) if self.transport.is_some() => {
                    debug!(%err, "connection reestablished after an error");
                }
                Err(err) => return Err(err),
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Ok(());
            }
        }
    }

    fn read_chunk(&mut self, timeout: Option<Duration>) -> Result<(), XmppClientError> {
        let Some(transport) = self.transport.as_mut() else {
            return Err(not_connected());
        };
        match transport.read(&mut self.read_buffer, timeout) {
            Ok(None) => Ok(()),
            Ok(Some(nr_read)) => {
                trace!(
                    bytes = %String::from_utf8_lossy(&self.read_buffer[..nr_read]),
                    "RECV"
                );
                self.read = nr_read;
                self.consumed = 0;
                self.feed()
            }
            Err(err) => self.connection_lost(err),
        }
    }

    fn connection_lost(&mut self, err: io::Error) -> Result<(), XmppClientError> {
        warn!(%err, "connection lost");
        if self.reconnect && !self.protocol.config().server_role {
            self.reconnect()
        } else {
            self.close();
            Err(XmppClientError::Io(err))
        }
    }

    fn feed(&mut self) -> Result<(), XmppClientError> {
        while self.consumed < self.read && self.transport.is_some() {
            match self
                .protocol
                .receive_bytes(&self.read_buffer[self.consumed..self.read])
            {
                Ok(Some(processed)) => {
                    self.consumed += processed;
                    self.flush_outputs()?;
                }
                Ok(None) => self.consumed = self.read,
                Err(err) => {
                    let location = self.protocol.location();
                    error!(%err, line = location.lines, column = location.column, "bad stream");
                    self.close();
                    return Err(XmppClientError::Parse(err));
                }
            }
        }
        Ok(())
    }

    fn flush_outputs(&mut self) -> Result<(), XmppClientError> {
        let mut auth_failed = false;
        while let Some(output) = self.protocol.next_output() {
            match output {
                ProtocolOutput::Send(bytes) => {
                    self.send(&bytes, Some(self.connection_timeout))?;
                }
                ProtocolOutput::StartTls => self.enable_tls()?,
                ProtocolOutput::Closed => {
                    if self.reconnect && !self.protocol.config().server_role {
                        self.reconnect()?;
                    } else {
                        self.close();
                    }
                }
                ProtocolOutput::AuthFailed => {
                    self.reconnect = false;
                    self.protocol.close_stream();
                    auth_failed = true;
                }
            }
        }
        if auth_failed {
            self.close();
            return Err(XmppClientError::Authentication);
        }
        Ok(())
    }

    /// Writes the bytes to the server.
    ///
    /// On failure the connection is reestablished if reconnection is
    /// enabled, and the error is returned either way.
    pub fn send(&mut self, bytes: &[u8], timeout: Option<Duration>) -> Result<usize, XmppClientError> {
        let Some(transport) = self.transport.as_mut() else {
            return Err(not_connected());
        };
        trace!(bytes = %String::from_utf8_lossy(bytes), "SENT");
        match transport.write(bytes, timeout) {
            Ok(written) => Ok(written),
            Err(err) => {
                warn!(%err, "send failed");
                if self.reconnect && !self.protocol.config().server_role {
                    self.reconnect()?;
                } else {
                    self.close();
                }
                Err(XmppClientError::Io(err))
            }
        }
    }

    /// Upgrades the connection to TLS and starts a new stream over it.
    pub fn enable_tls(&mut self) -> Result<(), XmppClientError> {
        let Some(transport) = self.transport.as_mut() else {
            return Err(not_connected());
        };
        transport.start_tls(&self.protocol.config().server, self.connection_timeout)?;
        // Anything after the proceed belongs to the old stream
        self.read = 0;
        self.consumed = 0;
        self.protocol.tls_established();
        Ok(())
    }

    pub fn protocol(&self) -> &XmppClientProtocol {
        &self.protocol
    }

    pub fn protocol_mut(&mut self) -> &mut XmppClientProtocol {
        &mut self.protocol
    }

    pub fn roster(&self) -> &Roster {
        self.protocol.roster()
    }

    pub fn jid(&self) -> &Jid {
        self.protocol.jid()
    }

    pub fn get_id(&mut self) -> String {
        self.protocol.get_id()
    }

    pub fn add_event_handler<F>(&mut self, name: &str, f: F)
    where
        F: FnMut(&mut XmppClientProtocol, &EventPayload) + 'static,
    {
        self.protocol.add_event_handler(name, f);
    }

    pub fn add_handler<F>(&mut self, name: &str, namespace: Option<&str>, depth: HandlerDepth, f: F)
    where
        F: FnMut(&mut XmppClientProtocol, &Element) + 'static,
    {
        self.protocol.add_handler(name, namespace, depth, f);
    }

    pub fn add_path_handler<F>(&mut self, path: &str, f: F) -> Result<(), BadPath>
    where
        F: FnMut(&mut XmppClientProtocol, &Element) + 'static,
    {
        self.protocol.add_path_handler(path, f)
    }

    pub fn add_id_handler<F>(&mut self, id: &str, f: F)
    where
        F: FnMut(&mut XmppClientProtocol, &Element) + 'static,
    {
        self.protocol.add_id_handler(id, f);
    }

    /// Sends a message, `kind` is `chat` or `groupchat`.
    pub fn message(
        &mut self,
        to: &str,
        body: &str,
        kind: &str,
        subject: Option<&str>,
    ) -> Result<(), XmppClientError> {
        self.protocol.send_message(to, body, kind, subject);
        self.flush_outputs()
    }

    pub fn presence(
        &mut self,
        status: Option<&str>,
        show: &str,
        to: Option<&str>,
        kind: &str,
        priority: i32,
    ) -> Result<(), XmppClientError> {
        self.protocol
            .send_presence(status, show, to, kind, priority);
        self.flush_outputs()
    }

    pub fn subscribe(&mut self, jid: &str) -> Result<(), XmppClientError> {
        self.protocol.subscribe(jid);
        self.flush_outputs()
    }

    pub fn get_roster(&mut self) -> Result<(), XmppClientError> {
        self.protocol.request_roster();
        self.flush_outputs()
    }

    pub fn get_vcard(&mut self, jid: Option<&str>) -> Result<(), XmppClientError> {
        self.protocol.request_vcard(jid);
        self.flush_outputs()
    }
}
