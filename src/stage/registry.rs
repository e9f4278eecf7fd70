//! Process-wide stage registry.
//!
//! The registry is the arena that owns every registered stage and the
//! identity index used to discover stages at probe time. One mutex covers
//! registration, removal, and lookup; attach/detach churn is low enough
//! that a reader/writer split buys nothing.

use std::collections::HashMap;
use std::sync::Mutex;

use super::{Stage, StageId};
use crate::error::{Error, Result};
use crate::pipe::PipeId;
use crate::state::StageState;

struct Entry {
    name: String,
    /// Taken out (left `None`) while one of the stage's hooks is running,
    /// so hooks never execute under the registry lock.
    stage: Option<Box<dyn Stage>>,
    /// Pipe this stage is currently attached to, if any.
    pipe: Option<PipeId>,
    /// Committed configuration, owned here between transactions.
    committed: Option<StageState>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<StageId, Entry>,
    by_name: HashMap<String, StageId>,
    next_id: u64,
}

/// Registry of all known stages, keyed by handle and discoverable by name.
pub struct Registry {
    inner: Mutex<Inner>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Register a stage, handing ownership to the registry.
    ///
    /// Fails with [`Error::AlreadyRegistered`] if a stage with the same name
    /// is present.
    pub fn register(&self, stage: Box<dyn Stage>) -> Result<StageId> {
        let name = stage.name().to_string();
        let mut inner = self.inner.lock().unwrap();
        if inner.by_name.contains_key(&name) {
            return Err(Error::AlreadyRegistered { name });
        }
        let id = StageId(inner.next_id);
        inner.next_id += 1;
        inner.by_name.insert(name.clone(), id);
        inner.entries.insert(
            id,
            Entry {
                name: name.clone(),
                stage: Some(stage),
                pipe: None,
                committed: None,
            },
        );
        tracing::debug!(stage = %name, id = %id, "registered stage");
        Ok(id)
    }

    /// Remove a stage from the registry, returning ownership to the caller.
    ///
    /// Fails with [`Error::NotFound`] if absent and [`Error::IllegalState`]
    /// if the stage is still attached to a pipe.
    pub fn unregister(&self, id: StageId) -> Result<Box<dyn Stage>> {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner
            .entries
            .remove(&id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        if entry.pipe.is_some() {
            let err = Error::illegal_state(format!(
                "cannot unregister '{}' while it is attached to a pipe",
                entry.name
            ));
            inner.entries.insert(id, entry);
            return Err(err);
        }
        match entry.stage {
            Some(stage) => {
                inner.by_name.remove(&entry.name);
                tracing::debug!(stage = %entry.name, id = %id, "unregistered stage");
                Ok(stage)
            }
            None => {
                let err = Error::illegal_state(format!(
                    "cannot unregister '{}' while one of its hooks is running",
                    entry.name
                ));
                inner.entries.insert(id, entry);
                Err(err)
            }
        }
    }

    /// Look up a stage handle by name.
    pub fn find_by_name(&self, name: &str) -> Option<StageId> {
        self.inner.lock().unwrap().by_name.get(name).copied()
    }

    /// Whether a handle refers to a registered stage.
    pub fn contains(&self, id: StageId) -> bool {
        self.inner.lock().unwrap().entries.contains_key(&id)
    }

    /// Number of registered stages.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Name of a registered stage.
    pub fn stage_name(&self, id: StageId) -> Result<String> {
        let inner = self.inner.lock().unwrap();
        inner
            .entries
            .get(&id)
            .map(|e| e.name.clone())
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Pipe the stage is attached to, if any.
    pub fn attached_pipe(&self, id: StageId) -> Result<Option<PipeId>> {
        let inner = self.inner.lock().unwrap();
        inner
            .entries
            .get(&id)
            .map(|e| e.pipe)
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Snapshot of the stage's committed configuration, if it has one.
    pub fn committed_state(&self, id: StageId) -> Result<Option<StageState>> {
        let inner = self.inner.lock().unwrap();
        inner
            .entries
            .get(&id)
            .map(|e| e.committed.clone())
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    pub(crate) fn set_pipe(&self, id: StageId, pipe: Option<PipeId>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner
            .entries
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        entry.pipe = pipe;
        Ok(())
    }

    pub(crate) fn set_committed(&self, id: StageId, state: Option<StageState>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner
            .entries
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        entry.committed = state;
        Ok(())
    }

    /// Run a closure against the stage object without holding the registry
    /// lock across the call.
    ///
    /// The stage is taken out of its entry, the lock is dropped for the
    /// duration of the closure, and the stage is reinserted afterwards.
    /// Reentrant use of the same stage is an [`Error::IllegalState`].
    pub(crate) fn with_stage<R>(
        &self,
        id: StageId,
        f: impl FnOnce(&mut dyn Stage) -> R,
    ) -> Result<R> {
        let mut stage = {
            let mut inner = self.inner.lock().unwrap();
            let entry = inner
                .entries
                .get_mut(&id)
                .ok_or_else(|| Error::NotFound(id.to_string()))?;
            entry.stage.take().ok_or_else(|| {
                Error::illegal_state(format!("{id} hook invoked reentrantly"))
            })?
        };

        let result = f(stage.as_mut());

        let mut inner = self.inner.lock().unwrap();
        match inner.entries.get_mut(&id) {
            Some(entry) => {
                entry.stage = Some(stage);
                Ok(result)
            }
            None => Err(Error::illegal_state(format!(
                "{id} was unregistered while a hook was running"
            ))),
        }
    }

    /// Duplicate the stage's committed state through its `duplicate_state`
    /// hook (or the default clone).
    pub(crate) fn duplicate_state(&self, id: StageId) -> Result<StageState> {
        let committed = self.committed_state(id)?;
        self.with_stage(id, |stage| stage.duplicate_state(committed.as_ref()))
    }

    /// Atomically replace the committed state of every listed stage.
    ///
    /// Holds the registry lock for the whole update so an observer never
    /// sees a half-committed chain.
    pub(crate) fn commit_states(&self, states: Vec<(StageId, StageState)>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        for (id, _) in &states {
            if !inner.entries.contains_key(id) {
                return Err(Error::illegal_state(format!(
                    "transaction holds state for unregistered {id}"
                )));
            }
        }
        for (id, state) in states {
            if let Some(entry) = inner.entries.get_mut(&id) {
                entry.committed = Some(state);
            }
        }
        Ok(())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock().unwrap();
        f.debug_struct("Registry")
            .field("stages", &inner.entries.len())
            .finish()
    }
}
