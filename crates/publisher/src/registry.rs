//! Session registry
//!
//! Sessions live in a generational arena. A `SessionHandle` is an index plus
//! the generation of the slot at insertion time, so a handle kept past its
//! session's removal never resolves to whichever session reuses the slot.
//!
//! Publication takes a snapshot (`Vec<Arc<Session>>`) under a short read
//! lock and works on that, so connects and disconnects never wait on a
//! publish in progress.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::{PublisherError, Result};
use crate::session::Session;
use crate::stats::{SessionStats, StatsSnapshot};

/// Stable reference to a registry slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle {
    index: u32,
    generation: u32,
}

impl SessionHandle {
    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    session: Option<Arc<Session>>,
}

#[derive(Debug, Default)]
struct Slots {
    slots: Vec<Slot>,
    free: Vec<u32>,
    len: usize,
}

/// Live sessions plus the publisher-wide counters they report into
pub struct SessionRegistry {
    inner: RwLock<Slots>,
    /// 0 = unlimited
    max_sessions: usize,
    totals: Arc<SessionStats>,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            inner: RwLock::new(Slots::default()),
            max_sessions,
            totals: Arc::new(SessionStats::new()),
        }
    }

    /// Insert a session built for the slot it will occupy
    ///
    /// `build` receives the slot's handle and the shared totals the
    /// session's counters must report into. Fails with `MaxConnections` when
    /// the registry is full; `build` is not called in that case.
    pub fn insert_with<F>(&self, build: F) -> Result<Arc<Session>>
    where
        F: FnOnce(SessionHandle, Arc<SessionStats>) -> Session,
    {
        let mut inner = self.inner.write();
        if self.max_sessions > 0 && inner.len >= self.max_sessions {
            return Err(PublisherError::MaxConnections {
                max: self.max_sessions,
            });
        }

        let index = match inner.free.pop() {
            Some(index) => index,
            None => {
                inner.slots.push(Slot::default());
                (inner.slots.len() - 1) as u32
            }
        };
        let slot = &mut inner.slots[index as usize];
        let handle = SessionHandle {
            index,
            generation: slot.generation,
        };
        let session = Arc::new(build(handle, Arc::clone(&self.totals)));
        slot.session = Some(Arc::clone(&session));
        inner.len += 1;
        Ok(session)
    }

    pub fn get(&self, handle: SessionHandle) -> Option<Arc<Session>> {
        let inner = self.inner.read();
        let slot = inner.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.session.clone()
    }

    /// Remove a session
    ///
    /// Stale handles are ignored.
    pub fn remove(&self, handle: SessionHandle) -> Option<Arc<Session>> {
        let mut inner = self.inner.write();
        let slot = inner.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let session = slot.session.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        inner.free.push(handle.index);
        inner.len -= 1;
        Some(session)
    }

    /// Find a live session by client id
    pub fn find(&self, client_id: Uuid) -> Option<Arc<Session>> {
        self.inner
            .read()
            .slots
            .iter()
            .filter_map(|slot| slot.session.as_ref())
            .find(|s| s.client_id() == client_id)
            .cloned()
    }

    /// Copy of the live session list
    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.inner
            .read()
            .slots
            .iter()
            .filter_map(|slot| slot.session.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    /// Counters of every session ever registered (live and removed),
    /// including writes made after a session left the registry
    pub fn totals(&self) -> StatsSnapshot {
        self.totals.snapshot()
    }
}

impl fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.len())
            .field("max_sessions", &self.max_sessions)
            .finish()
    }
}
