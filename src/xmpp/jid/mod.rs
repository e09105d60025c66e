/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

mod error;

use std::fmt::Display;
use std::str::FromStr;

pub use error::BadJid;
use error::description;

const MAX_PART_SIZE: usize = 1023;

fn check_part(
    part: &str,
    empty: &'static str,
    too_long: &'static str,
) -> Result<(), BadJid> {
    if part.is_empty() {
        return Err(BadJid(empty));
    }
    if part.len() > MAX_PART_SIZE {
        return Err(BadJid(too_long));
    }
    Ok(())
}

/// Address of an XMPP entity, `localpart@domainpart/resourcepart`.
///
/// Only the domain part is mandatory. See
/// [RFC7622](https://datatracker.ietf.org/doc/rfc7622/) for details.
///
/// ```
/// use iksxmpp::Jid;
///
/// let jid: Jid = "romeo@montague.lit/orchard".parse().unwrap();
/// assert_eq!(jid.localpart(), Some("romeo"));
/// assert_eq!(jid.domainpart(), "montague.lit");
/// assert_eq!(jid.bare(), "romeo@montague.lit");
/// ```
#[derive(Debug, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Jid {
    full: String,
    local_end: Option<usize>,
    domain_end: usize,
}

impl Jid {
    pub fn new(jid: &str) -> Result<Self, BadJid> {
        let (bare, resource) = match jid.split_once('/') {
            Some((bare, resource)) => (bare, Some(resource)),
            None => (jid, None),
        };
        let (local, domain) = match bare.split_once('@') {
            Some((local, domain)) => (Some(local), domain),
            None => (None, bare),
        };
        // Final dot of a fully qualified domain name is not a part of
        // the JID (RFC 7622 section 3.2).
        let domain = domain.strip_suffix('.').unwrap_or(domain);

        check_part(domain, description::DOMAIN_EMPTY, description::DOMAIN_TOO_LONG)?;
        if let Some(local) = local {
            check_part(local, description::LOCAL_EMPTY, description::LOCAL_TOO_LONG)?;
        }
        if let Some(resource) = resource {
            check_part(
                resource,
                description::RESOURCE_EMPTY,
                description::RESOURCE_TOO_LONG,
            )?;
        }

        let mut full = String::with_capacity(jid.len());
        let local_end = local.map(|local| {
            full.push_str(local);
            full.push('@');
            local.len()
        });
        full.push_str(domain);
        let domain_end = full.len();
        if let Some(resource) = resource {
            full.push('/');
            full.push_str(resource);
        }

        Ok(Jid {
            full,
            local_end,
            domain_end,
        })
    }

    pub fn full(&self) -> &str {
        &self.full
    }

    /// The JID without the resource part.
    pub fn bare(&self) -> &str {
        &self.full[..self.domain_end]
    }

    pub fn localpart(&self) -> Option<&str> {
        self.local_end.map(|end| &self.full[..end])
    }

    pub fn domainpart(&self) -> &str {
        let start = self.local_end.map_or(0, |end| end + 1);
        &self.full[start..self.domain_end]
    }

    pub fn resourcepart(&self) -> Option<&str> {
        self.full.get(self.domain_end + 1..)
    }

    pub fn is_bare(&self) -> bool {
        self.domain_end == self.full.len()
    }

    /// Replaces the resource part.
    pub fn with_resource(self, resource: &str) -> Result<Jid, BadJid> {
        check_part(
            resource,
            description::RESOURCE_EMPTY,
            description::RESOURCE_TOO_LONG,
        )?;
        let mut full = self.full;
        full.truncate(self.domain_end);
        full.push('/');
        full.push_str(resource);
        Ok(Jid { full, ..self })
    }
}

impl FromStr for Jid {
    type Err = BadJid;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Jid::new(s)
    }
}

impl Display for Jid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.full)
    }
}
