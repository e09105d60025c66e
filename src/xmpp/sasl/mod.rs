/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::fmt::Write;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use md5::Digest;
use md5::Md5;

/// SASL mechanisms supported by the client.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Mechanism {
    Plain,
    DigestMd5,
    Anonymous,
}

impl Mechanism {
    pub fn name(&self) -> &'static str {
        match self {
            Mechanism::Plain => "PLAIN",
            Mechanism::DigestMd5 => "DIGEST-MD5",
            Mechanism::Anonymous => "ANONYMOUS",
        }
    }
}

/// Picks the mechanism to use from the ones the server offers.
///
/// DIGEST-MD5 is preferred over PLAIN. PLAIN is assumed when the server
/// advertises nothing. Without a password only ANONYMOUS is possible.
/// Returns `None` if no offered mechanism is supported.
pub fn choose_mechanism(offered: &[&str], has_password: bool) -> Option<Mechanism> {
    if !has_password {
        return Some(Mechanism::Anonymous);
    }
    if offered.is_empty() {
        return Some(Mechanism::Plain);
    }
    if offered.contains(&Mechanism::DigestMd5.name()) {
        return Some(Mechanism::DigestMd5);
    }
    if offered.contains(&Mechanism::Plain.name()) {
        return Some(Mechanism::Plain);
    }
    None
}

/// Base64 encoded PLAIN credentials with an empty authorization identity.
pub fn plain_payload(username: &str, password: &str) -> String {
    let mut raw = Vec::with_capacity(username.len() + password.len() + 2);
    raw.push(0);
    raw.extend_from_slice(username.as_bytes());
    raw.push(0);
    raw.extend_from_slice(password.as_bytes());
    STANDARD.encode(raw)
}

/// Decodes the base64 text of a challenge element.
///
/// Whitespace which servers sometimes put around the text is ignored.
pub fn decode_challenge(text: &str) -> Option<String> {
    let text: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = STANDARD.decode(text).ok()?;
    String::from_utf8(bytes).ok()
}

/// Key/value pairs of a DIGEST-MD5 challenge.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Challenge {
    fields: Vec<(String, String)>,
}

impl Challenge {
    /// Parses `key="quoted,value",key=bare` style directives. Quoted
    /// values may escape characters with a backslash.
    pub fn parse(challenge: &str) -> Challenge {
        let mut fields = Vec::new();
        let mut rest = challenge;
        loop {
            rest = rest.trim_start_matches(|c: char| c == ',' || c.is_ascii_whitespace());
            let Some(eq) = rest.find('=') else {
                break;
            };
            let key = rest[..eq].trim();
            let after = &rest[eq + 1..];
            let (value, next) = match after.strip_prefix('"') {
                Some(quoted) => unquote(quoted),
                None => match after.find(',') {
                    Some(end) => (after[..end].to_string(), &after[end..]),
                    None => (after.to_string(), ""),
                },
            };
            if !key.is_empty() && !key.contains(',') {
                fields.push((key.to_string(), value));
            }
            rest = next;
        }
        Challenge { fields }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }
}

/// Reads a quoted-string body up to its closing quote, resolving the
/// backslash escapes. Returns the value and the text after the quote.
fn unquote(quoted: &str) -> (String, &str) {
    let mut value = String::with_capacity(quoted.len());
    let mut escaped = false;
    for (pos, c) in quoted.char_indices() {
        match c {
            _ if escaped => {
                value.push(c);
                escaped = false;
            }
            '\\' => escaped = true,
            '"' => return (value, &quoted[pos + 1..]),
            _ => value.push(c),
        }
    }
    (value, "")
}

/// Writes the value as a quoted-string body.
fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted
}

fn md5_hex(data: &[u8]) -> String {
    let digest = Md5::digest(data);
    let mut hex = String::with_capacity(32);
    for byte in digest {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

/// Random client nonce, 16 bytes in hexadecimal.
pub fn generate_cnonce() -> String {
    let bytes: [u8; 16] = rand::random();
    let mut hex = String::with_capacity(32);
    for byte in bytes {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

/// DIGEST-MD5 (RFC 2831) client state for the first challenge.
pub struct DigestMd5<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub server: &'a str,
}

impl DigestMd5<'_> {
    pub const NONCE_COUNT: &'static str = "00000001";
    pub const QOP: &'static str = "auth";

    /// Computes the response digest and returns the full response
    /// directive string, not yet base64 encoded.
    ///
    /// Returns `None` if the challenge has no nonce. When the server gives
    /// no realm and the username is in `user@realm` form, the username is
    /// split.
    pub fn respond(&self, challenge: &Challenge, cnonce: &str) -> Option<String> {
        let nonce = challenge.get("nonce")?;
        let mut username = self.username;
        let realm = match challenge.get("realm") {
            Some(realm) => realm,
            None => match self.username.split_once('@') {
                Some((user, realm)) => {
                    username = user;
                    realm
                }
                None => "",
            },
        };
        let digest_uri = match challenge.get("digest-uri") {
            Some(uri) => uri.to_string(),
            None => format!("xmpp/{}", self.server),
        };

        let credentials = format!("{username}:{realm}:{}", self.password);
        let a1: Vec<u8> = if challenge.get("algorithm") == Some("md5-sess") {
            let mut a1 = Md5::digest(credentials.as_bytes()).to_vec();
            a1.extend_from_slice(format!(":{nonce}:{cnonce}").as_bytes());
            a1
        } else {
            credentials.into_bytes()
        };
        let ha1 = md5_hex(&a1);
        let ha2 = md5_hex(format!("AUTHENTICATE:{digest_uri}").as_bytes());
        let response = md5_hex(
            format!(
                "{ha1}:{nonce}:{}:{cnonce}:{}:{ha2}",
                Self::NONCE_COUNT,
                Self::QOP
            )
            .as_bytes(),
        );

        Some(format!(
            "username=\"{}\",realm=\"{}\",nonce=\"{}\",cnonce=\"{}\",nc={},qop={},digest-uri=\"{}\",response={response},charset=utf-8",
            quote(username),
            quote(realm),
            quote(nonce),
            quote(cnonce),
            Self::NONCE_COUNT,
            Self::QOP,
            quote(&digest_uri)
        ))
    }
}

/// Base64 encoding for the response elements.
pub fn encode_response(response: &str) -> String {
    STANDARD.encode(response.as_bytes())
}
