//! Connection registry.
//!
//! An insertion-ordered collection keyed by connection ID. The reactor must
//! be able to remove members while traversing them (a client hanging up in
//! the middle of a sweep), so traversal works over a snapshot of identities
//! with a presence re-check instead of live iterators, and removal of an
//! absent member reports [`Error::ConnectionNotFound`] cleanly.
//!
//! The registry is generic over its payload. The reactor stores
//! [`Connection`](crate::server)s; dropping a removed payload closes its
//! socket and releases its buffers exactly once, because the payload owns
//! both.

use crate::error::Error;
use tracing::trace;

/// Directive returned by a [`Registry::sweep`] visitor for the member it was
/// called on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sweep {
    /// Leave the member in the registry.
    Keep,
    /// Remove the member; its payload is dropped when the visitor returns.
    Remove,
}

/// Insertion-ordered, identity-keyed collection of live connections.
///
/// Traversal order is insertion order, but carries no meaning beyond being
/// stable while no members are removed.
#[derive(Debug)]
pub struct Registry<T> {
    entries: Vec<(usize, T)>,
}

impl<T> Registry<T> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Appends a member under the given ID.
    ///
    /// IDs are allocated by the caller and must be unique; inserting a
    /// duplicate is a bug in the caller, not a runtime condition.
    pub fn insert(&mut self, id: usize, value: T) -> Result<(), Error> {
        assert!(
            !self.contains(id),
            "Duplicate registry id {} - was the previous member removed?",
            id
        );
        self.entries.try_reserve(1)?;
        self.entries.push((id, value));
        trace!(id, len = self.entries.len(), "Registered member");
        Ok(())
    }

    /// Removes a member by identity and returns its payload.
    ///
    /// A missed search leaves the registry unchanged.
    pub fn remove(&mut self, id: usize) -> Result<T, Error> {
        let index = self
            .entries
            .iter()
            .position(|(entry_id, _)| *entry_id == id)
            .ok_or(Error::ConnectionNotFound { id })?;
        let (_, value) = self.entries.remove(index);
        trace!(id, len = self.entries.len(), "Removed member");
        Ok(value)
    }

    /// Removes the member at the given traversal position.
    pub fn remove_at(&mut self, index: usize) -> Result<(usize, T), Error> {
        if index >= self.entries.len() {
            return Err(Error::IndexOutOfBounds {
                index,
                len: self.entries.len(),
            });
        }
        let (id, value) = self.entries.remove(index);
        trace!(id, index, len = self.entries.len(), "Removed member");
        Ok((id, value))
    }

    /// Gets a shared reference to a member's payload.
    pub fn get(&self, id: usize) -> Option<&T> {
        self.entries
            .iter()
            .find(|(entry_id, _)| *entry_id == id)
            .map(|(_, value)| value)
    }

    /// Gets an exclusive reference to a member's payload.
    pub fn get_mut(&mut self, id: usize) -> Option<&mut T> {
        self.entries
            .iter_mut()
            .find(|(entry_id, _)| *entry_id == id)
            .map(|(_, value)| value)
    }

    /// True if a member with this ID is present.
    pub fn contains(&self, id: usize) -> bool {
        self.entries.iter().any(|(entry_id, _)| *entry_id == id)
    }

    /// Snapshot of all member IDs in traversal order.
    ///
    /// Use this to drive loops that may remove arbitrary members mid-pass:
    /// the snapshot stays valid no matter what is removed, and absent IDs
    /// are detected by [`Self::contains`] or a failed [`Self::remove`].
    pub fn ids(&self) -> Vec<usize> {
        self.entries.iter().map(|(id, _)| *id).collect()
    }

    /// Visits every member in traversal order, removing those for which the
    /// visitor returns [`Sweep::Remove`].
    ///
    /// The visitor may mutate the payload it is handed (e.g. deregister its
    /// socket) before requesting removal. Members removed earlier in the same
    /// sweep are skipped via a presence re-check, so removal never corrupts
    /// the traversal.
    pub fn sweep<F>(&mut self, mut visit: F)
    where
        F: FnMut(usize, &mut T) -> Sweep,
    {
        for id in self.ids() {
            let Some(index) = self
                .entries
                .iter()
                .position(|(entry_id, _)| *entry_id == id)
            else {
                continue;
            };
            let (_, value) = &mut self.entries[index];
            if visit(id, value) == Sweep::Remove {
                self.entries.remove(index);
                trace!(id, len = self.entries.len(), "Swept member");
            }
        }
    }

    /// Removes every member, dropping all payloads.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of members currently registered.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no members are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}
