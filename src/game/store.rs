//! Per-connection session storage
//!
//! Single-player games (snake, flappy) keep one independent simulation per
//! connected socket; the store is the map from connection id to that live
//! session. Entries are created on connect and dropped on disconnect, so
//! `is_empty()` doubles as the scheduler-stop condition.

use std::collections::HashMap;

use crate::game::ConnId;

pub struct SessionStore<S> {
    sessions: HashMap<ConnId, S>,
}

impl<S> SessionStore<S> {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
        }
    }

    /// Insert a fresh session for `conn`, replacing any stale one.
    pub fn create(&mut self, conn: ConnId, session: S) {
        self.sessions.insert(conn, session);
    }

    pub fn remove(&mut self, conn: &ConnId) -> Option<S> {
        self.sessions.remove(conn)
    }

    pub fn get_mut(&mut self, conn: &ConnId) -> Option<&mut S> {
        self.sessions.get_mut(conn)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Iterate sessions mutably for the per-tick advance. Order is
    /// unspecified; sessions are independent so it does not matter.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&ConnId, &mut S)> {
        self.sessions.iter_mut()
    }
}

impl<S> Default for SessionStore<S> {
    fn default() -> Self {
        Self::new()
    }
}
