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

pub mod predefined {
    pub const LT: &str = "&lt;";
    pub const GT: &str = "&gt;";
    pub const AMP: &str = "&amp;";
    pub const APOS: &str = "&apos;";
    pub const QUOT: &str = "&quot;";
}

fn replacement(c: char) -> Option<&'static str> {
    match c {
        '<' => Some(predefined::LT),
        '>' => Some(predefined::GT),
        '&' => Some(predefined::AMP),
        '\'' => Some(predefined::APOS),
        '"' => Some(predefined::QUOT),
        _ => None,
    }
}

pub fn escaped_size(s: &str) -> usize {
    s.chars()
        .map(|c| replacement(c).map_or(c.len_utf8(), str::len))
        .sum()
}

/// Writes the string into a formatter, replacing the markup characters.
pub fn escape_fmt(s: &str, f: &mut impl Write) -> std::fmt::Result {
    let mut back = 0;
    for (pos, c) in s.char_indices() {
        if let Some(ent) = replacement(c) {
            if back < pos {
                f.write_str(&s[back..pos])?;
            }
            f.write_str(ent)?;
            back = pos + 1;
        }
    }
    if back < s.len() {
        f.write_str(&s[back..])?;
    }
    Ok(())
}

/// Appends the escaped string to the output buffer.
pub fn escape(s: &str, out: &mut String) {
    out.reserve(escaped_size(s));
    // Writing into a String never fails.
    let _ = escape_fmt(s, out);
}
