/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::collections::BTreeMap;

/// Lower than any priority a resource can announce (-128..=127).
pub const NO_PRIORITY: i32 = -129;

/// Subscription value of the contacts known only from their presence.
pub const NOT_IN_ROSTER: &str = "not-in-roster";

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Contact {
    pub jid: String,
    pub subscription: String,
    pub name: String,
    pub groups: Vec<String>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Presence {
    pub resource: String,
    pub priority: i32,
    pub show: String,
    pub status: String,
}

impl Presence {
    fn is_available(&self) -> bool {
        self.show == "chat" || self.show == "available"
    }
}

#[derive(Debug)]
struct RosterEntry {
    contact: Contact,
    resources: BTreeMap<String, Presence>,
}

fn split_resource(jid: &str) -> (&str, &str) {
    jid.split_once('/').unwrap_or((jid, ""))
}

/// Contact list with the live presence of each resource.
///
/// Contacts are keyed by their bare JID.
#[derive(Debug, Default)]
pub struct Roster {
    entries: BTreeMap<String, RosterEntry>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a contact or updates the existing one, keeping its presence.
    pub fn add_contact(&mut self, jid: &str, subscription: &str, name: &str, groups: Vec<String>) {
        let contact = Contact {
            jid: jid.to_string(),
            subscription: subscription.to_string(),
            name: name.to_string(),
            groups,
        };
        match self.entries.get_mut(jid) {
            Some(entry) => entry.contact = contact,
            None => {
                self.entries.insert(
                    jid.to_string(),
                    RosterEntry {
                        contact,
                        resources: BTreeMap::new(),
                    },
                );
            }
        }
    }

    pub fn get_contact(&self, jid: &str) -> Option<&Contact> {
        self.entries.get(jid).map(|entry| &entry.contact)
    }

    pub fn is_contact(&self, jid: &str) -> bool {
        self.entries.contains_key(jid)
    }

    pub fn contacts(&self) -> impl Iterator<Item = &Contact> {
        self.entries.values().map(|entry| &entry.contact)
    }

    /// Records the presence of a resource.
    ///
    /// The JID may have a resource part. Unknown senders are added as
    /// contacts not in the roster. An `unavailable` presence removes the
    /// resource.
    pub fn set_presence(&mut self, jid: &str, priority: i32, show: &str, status: &str) {
        let (bare, resource) = split_resource(jid);
        if show == "unavailable" {
            if let Some(entry) = self.entries.get_mut(bare) {
                entry.resources.remove(resource);
            }
            return;
        }
        if !self.is_contact(bare) {
            self.add_contact(bare, NOT_IN_ROSTER, "", Vec::new());
        }
        if let Some(entry) = self.entries.get_mut(bare) {
            entry.resources.insert(
                resource.to_string(),
                Presence {
                    resource: resource.to_string(),
                    priority,
                    show: show.to_string(),
                    status: status.to_string(),
                },
            );
        }
    }

    /// Best presence of the contact.
    ///
    /// This is the highest priority resource among the ones available for
    /// chat, or the highest priority resource if none is available.
    pub fn get_presence(&self, jid: &str) -> Option<&Presence> {
        let (bare, _) = split_resource(jid);
        let entry = self.entries.get(bare)?;
        let mut best: Option<&Presence> = None;
        let mut best_priority = NO_PRIORITY;
        for presence in entry.resources.values() {
            let better = match best {
                None => presence.priority > best_priority,
                Some(current) => match (presence.is_available(), current.is_available()) {
                    (true, false) => true,
                    (false, true) => false,
                    _ => presence.priority > best_priority,
                },
            };
            if better {
                best = Some(presence);
                best_priority = presence.priority;
            }
        }
        best
    }
}
