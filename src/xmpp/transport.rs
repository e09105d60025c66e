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
use std::io::Read;
use std::io::Write;
use std::net::Shutdown;
use std::net::SocketAddr;
use std::net::TcpStream;
use std::net::ToSocketAddrs;
use std::sync::Arc;
use std::time::Duration;

use rustls::ClientConfig;
use rustls::ClientConnection;
use rustls::RootCertStore;
use rustls::StreamOwned;
use rustls::pki_types::ServerName;
use tracing::debug;

use super::XmppClientError;

enum Socket {
    Plain(TcpStream),
    Tls(Box<StreamOwned<ClientConnection, TcpStream>>),
}

/// Byte channel to the server, plain TCP or TLS over TCP.
pub(super) struct Transport {
    socket: Socket,
}

fn resolve(host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
    // The resolver requires a port but has no way to give a default one
    let colon_pos = host.rfind(':');
    let bracket_pos = host.find(']');
    let need_port = match (colon_pos, bracket_pos) {
        (None, _) => true,
        (Some(_), None) => host.matches(':').count() > 1,
        (Some(colon), Some(bracket)) => colon < bracket,
    };
    let addresses = if need_port {
        (host.trim_start_matches('[').trim_end_matches(']'), port).to_socket_addrs()?
    } else {
        host.to_socket_addrs()?
    };
    Ok(addresses.collect())
}

fn tls_config() -> Arc<ClientConfig> {
    let roots = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.into(),
    };
    Arc::new(
        ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth(),
    )
}

impl Transport {
    /// Opens a connection, trying each address of the host in turn.
    ///
    /// With `use_ssl` the TLS handshake is done right away for the
    /// `server` name.
    pub(super) fn connect(
        host: &str,
        port: u16,
        timeout: Duration,
        use_ssl: bool,
        server: &str,
    ) -> Result<Transport, XmppClientError> {
        let mut last_err = None;
        for address in resolve(host, port)? {
            debug!(%address, "connecting");
            match TcpStream::connect_timeout(&address, timeout) {
                Ok(tcp) => {
                    tcp.set_nodelay(true)?;
                    let mut transport = Transport {
                        socket: Socket::Plain(tcp),
                    };
                    if use_ssl {
                        transport.start_tls(server, timeout)?;
                    }
                    return Ok(transport);
                }
                Err(err) => last_err = Some(err),
            }
        }
        match last_err {
            Some(err) => Err(XmppClientError::Io(err)),
            None => Err(XmppClientError::Connection(format!(
                "no address found for {host}"
            ))),
        }
    }

    fn tcp(&self) -> &TcpStream {
        match &self.socket {
            Socket::Plain(tcp) => tcp,
            Socket::Tls(stream) => &stream.sock,
        }
    }

    pub(super) fn is_tls(&self) -> bool {
        matches!(self.socket, Socket::Tls(_))
    }

    /// Upgrades the connection to TLS in place.
    pub(super) fn start_tls(&mut self, server: &str, timeout: Duration) -> Result<(), XmppClientError> {
        let Socket::Plain(plain) = &self.socket else {
            return Ok(());
        };
        let name = ServerName::try_from(server.to_string()).map_err(|_| {
            XmppClientError::Connection(format!("invalid TLS server name {server}"))
        })?;
        let mut conn = ClientConnection::new(tls_config(), name)?;
        let mut tcp = plain.try_clone()?;
        tcp.set_nonblocking(false)?;
        tcp.set_read_timeout(Some(timeout))?;
        tcp.set_write_timeout(Some(timeout))?;
        while conn.is_handshaking() {
            conn.complete_io(&mut tcp)?;
        }
        debug!(
            version = ?conn.protocol_version(),
            suite = ?conn.negotiated_cipher_suite().map(|suite| suite.suite()),
            "TLS established"
        );
        self.socket = Socket::Tls(Box::new(StreamOwned::new(conn, tcp)));
        Ok(())
    }

    /// Reads whatever is available within the timeout.
    ///
    /// A zero timeout polls without blocking, `None` blocks until data
    /// arrives. Returns `None` if nothing arrived in time. A closed
    /// connection is reported as an `UnexpectedEof` error.
    pub(super) fn read(
        &mut self,
        buf: &mut [u8],
        timeout: Option<Duration>,
    ) -> io::Result<Option<usize>> {
        let nonblocking = timeout.is_some_and(|timeout| timeout.is_zero());
        self.tcp().set_nonblocking(nonblocking)?;
        if !nonblocking {
            self.tcp().set_read_timeout(timeout)?;
        }
        let result = match &mut self.socket {
            Socket::Plain(tcp) => tcp.read(buf),
            Socket::Tls(stream) => stream.read(buf),
        };
        if nonblocking {
            self.tcp().set_nonblocking(false)?;
        }
        match result {
            Ok(0) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed by peer",
            )),
            Ok(nr_read) => Ok(Some(nr_read)),
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Writes all bytes, failing if that takes longer than the timeout.
    pub(super) fn write(&mut self, bytes: &[u8], timeout: Option<Duration>) -> io::Result<usize> {
        self.tcp()
            .set_write_timeout(timeout.filter(|timeout| !timeout.is_zero()))?;
        match &mut self.socket {
            Socket::Plain(tcp) => {
                tcp.write_all(bytes)?;
                tcp.flush()?;
            }
            Socket::Tls(stream) => {
                stream.write_all(bytes)?;
                stream.flush()?;
            }
        }
        Ok(bytes.len())
    }

    pub(super) fn shutdown(&mut self) {
        if let Socket::Tls(stream) = &mut self.socket {
            stream.conn.send_close_notify();
            let _ = stream.flush();
        }
        let _ = self.tcp().shutdown(Shutdown::Both);
    }
}
