/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::error::Error;
use std::fmt::Display;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BadPath(pub &'static str);

impl Display for BadPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid handler path: {}", self.0)
    }
}

impl Error for BadPath {}

pub(super) mod description {
    pub(in super::super) const EMPTY: &str = "path is empty";
    pub(in super::super) const EMPTY_STEP: &str = "path has an empty step";
    pub(in super::super) const EMPTY_NAMESPACE: &str = "namespace inside braces is empty";
    pub(in super::super) const UNCLOSED_NAMESPACE: &str = "namespace is not closed with '}'";
    pub(in super::super) const MISPLACED_BRACE: &str = "braces are only allowed around the namespace";
}
