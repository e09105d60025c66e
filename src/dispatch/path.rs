/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::str::FromStr;

use crate::Element;
use crate::element::ANY_NAME;

use super::error::BadPath;
use super::error::description;

/// One step of a [Path].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PathStep {
    /// Required namespace, `None` matches any.
    pub namespace: Option<String>,
    /// Local name, or `*` for any name.
    pub name: String,
}

impl PathStep {
    pub fn new(namespace: Option<&str>, name: &str) -> Self {
        PathStep {
            namespace: namespace.map(str::to_string),
            name: name.to_string(),
        }
    }

    fn matches(&self, element: &Element) -> bool {
        (self.name == ANY_NAME || self.name == element.name())
            && self
                .namespace
                .as_deref()
                .is_none_or(|namespace| namespace == element.namespace())
    }
}

/// Stanza shape selector for the path handlers.
///
/// Written as slash separated steps, each an element name optionally
/// preceded by its namespace in braces. The first step is matched
/// against the stanza itself, every following step against a direct
/// child of the previous match:
///
/// ```
/// use iksxmpp::Path;
///
/// let path: Path = "{jabber:client}iq/{jabber:iq:roster}query".parse().unwrap();
/// assert_eq!(path.steps().len(), 2);
/// assert_eq!(path.steps()[1].namespace.as_deref(), Some("jabber:iq:roster"));
/// assert!(Path::new("{jabber:client}").is_err());
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Path {
    steps: Vec<PathStep>,
}

enum State {
    StepStart,
    Namespace,
    NameStart,
    Name,
}

impl Path {
    pub fn new(expression: &str) -> Result<Self, BadPath> {
        let bytes = expression.as_bytes();
        let mut back: usize = 0;
        let mut state = State::StepStart;
        let mut namespace: Option<String> = None;
        let mut steps: Vec<PathStep> = Vec::new();

        if bytes.is_empty() {
            return Err(BadPath(description::EMPTY));
        }

        for (pos, &c) in bytes.iter().enumerate() {
            match state {
                State::StepStart => match c {
                    b'{' => {
                        back = pos + 1;
                        state = State::Namespace;
                    }
                    b'/' => return Err(BadPath(description::EMPTY_STEP)),
                    b'}' => return Err(BadPath(description::MISPLACED_BRACE)),
                    _ => {
                        back = pos;
                        state = State::Name;
                    }
                },
                State::Namespace => match c {
                    b'}' => {
                        if back == pos {
                            return Err(BadPath(description::EMPTY_NAMESPACE));
                        }
                        namespace = Some(expression[back..pos].to_string());
                        state = State::NameStart;
                    }
                    b'{' | b'/' => return Err(BadPath(description::UNCLOSED_NAMESPACE)),
                    _ => (),
                },
                State::NameStart => match c {
                    b'/' => return Err(BadPath(description::EMPTY_STEP)),
                    b'{' | b'}' => return Err(BadPath(description::MISPLACED_BRACE)),
                    _ => {
                        back = pos;
                        state = State::Name;
                    }
                },
                State::Name => match c {
                    b'/' => {
                        steps.push(PathStep {
                            namespace: namespace.take(),
                            name: expression[back..pos].to_string(),
                        });
                        state = State::StepStart;
                    }
                    b'{' | b'}' => return Err(BadPath(description::MISPLACED_BRACE)),
                    _ => (),
                },
            }
        }

        match state {
            State::Name => {
                steps.push(PathStep {
                    namespace,
                    name: expression[back..].to_string(),
                });
                Ok(Path { steps })
            }
            State::Namespace => Err(BadPath(description::UNCLOSED_NAMESPACE)),
            State::StepStart | State::NameStart => Err(BadPath(description::EMPTY_STEP)),
        }
    }

    /// Path made of the given steps, which are not validated.
    pub fn from_steps(steps: Vec<PathStep>) -> Self {
        Path { steps }
    }

    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    /// Checks the stanza against the path.
    pub fn matches(&self, stanza: &Element) -> bool {
        let Some((first, rest)) = self.steps.split_first() else {
            return false;
        };
        if !first.matches(stanza) {
            return false;
        }
        let mut current = stanza;
        for step in rest {
            match current.child(&step.name, step.namespace.as_deref()) {
                Some(child) => current = child,
                None => return false,
            }
        }
        true
    }
}

impl FromStr for Path {
    type Err = BadPath;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Path::new(s)
    }
}
