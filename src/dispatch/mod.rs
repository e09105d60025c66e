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
mod path;
mod payload;

use std::cell::RefCell;
use std::rc::Rc;

use crate::Element;

pub use error::BadPath;
pub use path::Path;
pub use path::PathStep;
pub use payload::EventPayload;

/// Callback receiving a dispatched stanza.
pub type StanzaCallback<O> = Rc<RefCell<dyn FnMut(&mut O, &Element)>>;

/// Callback receiving a raised event.
pub type EventCallback<O> = Rc<RefCell<dyn FnMut(&mut O, &EventPayload)>>;

/// Target of a stanza handler.
///
/// `Owner` handlers are performed by the owner of the dispatcher itself,
/// the action value tells which one. `External` handlers carry their own
/// callback and state.
pub enum Receiver<O, A> {
    Owner(A),
    External(StanzaCallback<O>),
}

impl<O, A: Clone> Clone for Receiver<O, A> {
    fn clone(&self) -> Self {
        match self {
            Receiver::Owner(action) => Receiver::Owner(action.clone()),
            Receiver::External(callback) => Receiver::External(Rc::clone(callback)),
        }
    }
}

impl<O, A: std::fmt::Debug> std::fmt::Debug for Receiver<O, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Receiver::Owner(action) => f.debug_tuple("Owner").field(action).finish(),
            Receiver::External(_) => f.write_str("External"),
        }
    }
}

/// Where a name handler looks for its element.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HandlerDepth {
    /// Only the stanza element itself.
    Root,
    /// The first descendant with the name, or the stanza itself.
    Any,
}

/// Handle of a wait registration.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct WaitId(u64);

struct NameHandler<O, A> {
    name: String,
    namespace: Option<String>,
    depth: HandlerDepth,
    receiver: Receiver<O, A>,
}

struct PathHandler<O, A> {
    path: Path,
    receiver: Receiver<O, A>,
}

struct IdHandler<O, A> {
    id: String,
    receiver: Receiver<O, A>,
}

struct EventHandler<O> {
    name: String,
    callback: EventCallback<O>,
}

struct WaitRegistration {
    id: WaitId,
    names: Vec<String>,
    count: usize,
    queue: Vec<(String, EventPayload)>,
}

/// Handler registries of a stream.
///
/// Dispatching never runs the handlers itself. It returns the matched
/// receivers so the caller can run them after the registries are no
/// longer borrowed, which lets the handlers register new handlers.
pub struct Dispatcher<O, A> {
    default_namespace: String,
    path_handlers: Vec<PathHandler<O, A>>,
    name_handlers: Vec<NameHandler<O, A>>,
    id_handlers: Vec<IdHandler<O, A>>,
    event_handlers: Vec<EventHandler<O>>,
    waits: Vec<WaitRegistration>,
    last_wait: u64,
}

impl<O, A: Clone> Dispatcher<O, A> {
    pub fn new(default_namespace: &str) -> Self {
        Dispatcher {
            default_namespace: default_namespace.to_string(),
            path_handlers: Vec::new(),
            name_handlers: Vec::new(),
            id_handlers: Vec::new(),
            event_handlers: Vec::new(),
            waits: Vec::new(),
            last_wait: 0,
        }
    }

    /// Registers a handler for stanzas with the given name.
    ///
    /// A `None` namespace matches the default namespace of the stream.
    pub fn add_handler(
        &mut self,
        name: &str,
        namespace: Option<&str>,
        depth: HandlerDepth,
        receiver: Receiver<O, A>,
    ) {
        self.name_handlers.push(NameHandler {
            name: name.to_string(),
            namespace: namespace.map(str::to_string),
            depth,
            receiver,
        });
    }

    pub fn add_path_handler(&mut self, path: Path, receiver: Receiver<O, A>) {
        self.path_handlers.push(PathHandler { path, receiver });
    }

    /// Registers a one shot handler for the stanza with the given id.
    ///
    /// A previous handler waiting for the same id is replaced.
    pub fn add_id_handler(&mut self, id: &str, receiver: Receiver<O, A>) {
        match self.id_handlers.iter_mut().find(|handler| handler.id == id) {
            Some(handler) => handler.receiver = receiver,
            None => self.id_handlers.push(IdHandler {
                id: id.to_string(),
                receiver,
            }),
        }
    }

    pub fn has_id_handler(&self, id: &str) -> bool {
        self.id_handlers.iter().any(|handler| handler.id == id)
    }

    pub fn add_event_handler(&mut self, name: &str, callback: EventCallback<O>) {
        self.event_handlers.push(EventHandler {
            name: name.to_string(),
            callback,
        });
    }

    fn name_handler_matches(&self, handler: &NameHandler<O, A>, stanza: &Element) -> bool {
        let candidate = match handler.depth {
            HandlerDepth::Root => stanza,
            HandlerDepth::Any => stanza.find_descendant(&handler.name).unwrap_or(stanza),
        };
        candidate.name() == handler.name
            && candidate.namespace()
                == handler
                    .namespace
                    .as_deref()
                    .unwrap_or(&self.default_namespace)
    }

    /// Returns the receivers for a complete stanza.
    ///
    /// Path handlers come first, then the name handlers, then the first
    /// handler waiting for the stanza id. That id handler is removed.
    pub fn dispatch(&mut self, stanza: &Element) -> Vec<Receiver<O, A>> {
        let mut receivers: Vec<Receiver<O, A>> = self
            .path_handlers
            .iter()
            .filter(|handler| handler.path.matches(stanza))
            .map(|handler| handler.receiver.clone())
            .collect();

        receivers.extend(
            self.name_handlers
                .iter()
                .filter(|handler| self.name_handler_matches(handler, stanza))
                .map(|handler| handler.receiver.clone()),
        );

        if let Some(id) = stanza.attribute("id")
            && let Some(index) = self.id_handlers.iter().position(|handler| handler.id == id)
        {
            receivers.push(self.id_handlers.remove(index).receiver);
        }

        receivers
    }

    /// Callbacks registered for the event, in registration order.
    pub fn event_callbacks(&self, name: &str) -> Vec<EventCallback<O>> {
        self.event_handlers
            .iter()
            .filter(|handler| handler.name == name)
            .map(|handler| Rc::clone(&handler.callback))
            .collect()
    }

    /// Starts collecting the given events.
    pub fn add_wait(&mut self, names: &[&str]) -> WaitId {
        self.last_wait += 1;
        let id = WaitId(self.last_wait);
        self.waits.push(WaitRegistration {
            id,
            names: names.iter().map(|name| name.to_string()).collect(),
            count: 0,
            queue: Vec::new(),
        });
        id
    }

    /// Queues the event for every wait registration expecting it.
    pub fn notify_waits(&mut self, name: &str, payload: &EventPayload) {
        for wait in self
            .waits
            .iter_mut()
            .filter(|wait| wait.names.iter().any(|awaited| awaited == name))
        {
            wait.queue.push((name.to_string(), payload.clone()));
            wait.count += 1;
        }
    }

    pub fn wait_matched(&self, id: WaitId) -> bool {
        self.waits
            .iter()
            .any(|wait| wait.id == id && wait.count > 0)
    }

    /// Removes the registration and returns the collected events.
    pub fn take_wait(&mut self, id: WaitId) -> Vec<(String, EventPayload)> {
        match self.waits.iter().position(|wait| wait.id == id) {
            Some(index) => self.waits.remove(index).queue,
            None => Vec::new(),
        }
    }
}
