/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::fmt::Display;

use super::entities::escape_fmt;
use super::entities::escaped_size;

/// Wildcard name matching any element in lookups.
pub const ANY_NAME: &str = "*";

/// An XML element received from or sent to the stream.
///
/// Names are stored without any prefix, the prefix is resolved into the
/// namespace while parsing. Character data at the same level is kept as a
/// single concatenated text, the interleaving of text and child elements
/// is not retained. This is sufficient for XMPP stanzas which do not use
/// mixed content.
///
/// ```
/// use iksxmpp::Element;
///
/// let msg = Element::new("message", "jabber:client")
///     .with_attribute("to", "juliet@capulet.lit")
///     .with_child(Element::new("body", "jabber:client").with_text("Art thou?"));
///
/// assert_eq!(msg.attribute("to"), Some("juliet@capulet.lit"));
/// assert_eq!(msg.child("body", None).map(|body| body.text()), Some("Art thou?"));
/// assert_eq!(
///     msg.to_string(),
///     "<message xmlns='jabber:client' to='juliet@capulet.lit'><body>Art thou?</body></message>"
/// );
/// ```
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Element {
    name: String,
    namespace: String,
    attributes: Vec<(String, String)>,
    children: Vec<Element>,
    text: String,
}

impl Element {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Element {
        Element {
            name: name.into(),
            namespace: namespace.into(),
            attributes: Vec::new(),
            children: Vec::new(),
            text: String::new(),
        }
    }

    /// Adds or replaces an attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Element {
        self.set_attribute(name.into(), value.into());
        self
    }

    pub fn with_child(mut self, child: Element) -> Element {
        self.children.push(child);
        self
    }

    pub fn with_text(mut self, text: impl AsRef<str>) -> Element {
        self.text.push_str(text.as_ref());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(attr_name, _)| attr_name == name)
            .map(|(_, value)| value.as_str())
    }

    /// Iterates over (name, value) pairs in arrival order.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn children(&self) -> &[Element] {
        &self.children
    }

    /// Concatenation of all character data directly under this element.
    pub fn text(&self) -> &str {
        &self.text
    }

    fn matches(&self, name: &str, namespace: Option<&str>) -> bool {
        (name == ANY_NAME || self.name == name)
            && namespace.is_none_or(|namespace| self.namespace == namespace)
    }

    /// Returns true if a direct child with the name exists.
    ///
    /// A `None` namespace matches any namespace, and [ANY_NAME] matches
    /// any name.
    pub fn has_child(&self, name: &str, namespace: Option<&str>) -> bool {
        self.child(name, namespace).is_some()
    }

    /// First direct child with the given name and namespace.
    pub fn child(&self, name: &str, namespace: Option<&str>) -> Option<&Element> {
        self.children
            .iter()
            .find(|child| child.matches(name, namespace))
    }

    /// Text of the first matching direct child.
    pub fn child_text(&self, name: &str, namespace: Option<&str>) -> Option<&str> {
        self.child(name, namespace).map(|child| child.text())
    }

    /// First descendant in document order with the given name.
    ///
    /// The element itself is not considered.
    pub fn find_descendant(&self, name: &str) -> Option<&Element> {
        for child in &self.children {
            if child.matches(name, None) {
                return Some(child);
            }
            if let Some(found) = child.find_descendant(name) {
                return Some(found);
            }
        }
        None
    }

    pub(crate) fn set_attribute(&mut self, name: String, value: String) {
        match self.attributes.iter_mut().find(|(old, _)| *old == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name, value)),
        }
    }

    pub(crate) fn append_text(&mut self, text: &str) {
        self.text.push_str(text);
    }

    pub(crate) fn append_child(&mut self, child: Element) {
        self.children.push(child);
    }

    pub(crate) fn clear_children(&mut self) {
        self.children.clear();
    }

    fn has_xmlns_attribute(&self) -> bool {
        self.attributes.iter().any(|(name, _)| name == "xmlns")
    }

    fn needs_xmlns(&self, parent_namespace: Option<&str>) -> bool {
        !self.namespace.is_empty()
            && !self.has_xmlns_attribute()
            && parent_namespace != Some(self.namespace.as_str())
    }

    fn size_with_parent(&self, parent_namespace: Option<&str>) -> usize {
        let mut size = if self.text.is_empty() && self.children.is_empty() {
            // <name/>
            self.name.len() + 3
        } else {
            // <name></name>
            self.name.len() * 2 + 5
        };
        if self.needs_xmlns(parent_namespace) {
            // xmlns=''
            size += 9 + escaped_size(&self.namespace);
        }
        for (name, value) in &self.attributes {
            size += name.len() + escaped_size(value) + 4;
        }
        size += escaped_size(&self.text);
        for child in &self.children {
            size += child.size_with_parent(Some(&self.namespace));
        }
        size
    }

    /// Size of the serialized element in bytes.
    pub fn str_size(&self) -> usize {
        self.size_with_parent(None)
    }

    fn write_with_parent(
        &self,
        f: &mut impl std::fmt::Write,
        parent_namespace: Option<&str>,
    ) -> std::fmt::Result {
        f.write_char('<')?;
        f.write_str(&self.name)?;
        if self.needs_xmlns(parent_namespace) {
            f.write_str(" xmlns='")?;
            escape_fmt(&self.namespace, f)?;
            f.write_char('\'')?;
        }
        for (name, value) in &self.attributes {
            f.write_char(' ')?;
            f.write_str(name)?;
            f.write_str("='")?;
            escape_fmt(value, f)?;
            f.write_char('\'')?;
        }
        if self.text.is_empty() && self.children.is_empty() {
            return f.write_str("/>");
        }
        f.write_char('>')?;
        escape_fmt(&self.text, f)?;
        for child in &self.children {
            child.write_with_parent(f, Some(&self.namespace))?;
        }
        f.write_str("</")?;
        f.write_str(&self.name)?;
        f.write_char('>')
    }

    /// Appends the serialized element to a string buffer.
    pub fn write_into(&self, buf: &mut String) {
        buf.reserve(self.str_size());
        // Writing into a String never fails.
        let _ = self.write_with_parent(buf, None);
    }
}

impl Display for Element {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.write_with_parent(f, None)
    }
}
