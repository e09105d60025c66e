/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use crate::Element;

/// Data attached to a raised event.
///
/// Lifecycle events carry nothing, stanza events carry the interesting
/// fields of the stanza as strings plus the stanza itself.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct EventPayload {
    fields: Vec<(String, String)>,
    stanza: Option<Element>,
}

impl EventPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    pub fn with_stanza(mut self, stanza: Element) -> Self {
        self.stanza = Some(stanza);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(old, _)| *old == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.stanza.is_none()
    }

    pub fn stanza(&self) -> Option<&Element> {
        self.stanza.as_ref()
    }
}
