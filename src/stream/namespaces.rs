/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

const XML_PREFIX: &str = "xml";
const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// Lifetime of the `xmlns:prefix` declarations.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum PrefixScoping {
    /// A declaration is visible in the declaring element and its
    /// descendants, as XML namespaces require.
    #[default]
    Lexical,

    /// Every declaration stays visible until the stream is reset, even
    /// after the declaring element is closed. Some old servers rely on
    /// this behavior.
    Global,
}

/// Prefix bindings of the open elements.
#[derive(Debug)]
pub(super) struct NamespaceScope {
    scoping: PrefixScoping,
    bindings: Vec<(String, String)>,
    marks: Vec<usize>,
}

impl NamespaceScope {
    pub(super) fn new(scoping: PrefixScoping) -> Self {
        NamespaceScope {
            scoping,
            bindings: Vec::new(),
            marks: Vec::new(),
        }
    }

    pub(super) fn open(&mut self) {
        self.marks.push(self.bindings.len());
    }

    pub(super) fn close(&mut self) {
        if let Some(mark) = self.marks.pop()
            && self.scoping == PrefixScoping::Lexical
        {
            self.bindings.truncate(mark);
        }
    }

    pub(super) fn declare(&mut self, prefix: &str, uri: &str) {
        if self.scoping == PrefixScoping::Global
            && let Some(binding) = self.bindings.iter_mut().find(|(old, _)| old == prefix)
        {
            binding.1 = uri.to_string();
            return;
        }
        self.bindings.push((prefix.to_string(), uri.to_string()));
    }

    pub(super) fn resolve(&self, prefix: &str) -> Option<&str> {
        if prefix == XML_PREFIX {
            return Some(XML_NAMESPACE);
        }
        self.bindings
            .iter()
            .rev()
            .find(|(name, _)| name == prefix)
            .map(|(_, uri)| uri.as_str())
    }

    pub(super) fn reset(&mut self) {
        self.bindings.clear();
        self.marks.clear();
    }
}
