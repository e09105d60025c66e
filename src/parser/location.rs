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

/// Position of the last consumed byte of the stream.
///
/// Counted since the parser was created or last reset, which happens on
/// every stream restart. Mostly useful in error messages.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Location {
    pub bytes: usize,
    pub lines: usize,
    pub column: usize,
}

impl Location {
    pub fn new() -> Self {
        Self::default()
    }

    pub(super) fn advance(&mut self, c: u8) {
        self.bytes += 1;
        match c {
            b'\n' => {
                self.lines += 1;
                self.column = 0;
            }
            _ => self.column += 1,
        }
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "byte {}, line {}, column {}",
            self.bytes, self.lines, self.column
        )
    }
}
