//! Transactions and the per-transaction stage state store.
//!
//! A [`Transaction`] is one proposed reconfiguration of a pipe. It owns a
//! private [`StageState`] copy for every stage in the pipe's chain,
//! duplicated up front by [`Pipe::duplicate_all`](crate::pipe::Pipe::duplicate_all).
//! Those copies are invisible outside the transaction until
//! [`Pipe::commit`](crate::pipe::Pipe::commit) atomically promotes them to
//! the committed states, or [`Pipe::discard`](crate::pipe::Pipe::discard)
//! drops them without effect.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Error, Result};
use crate::pipe::PipeId;
use crate::stage::StageId;
use crate::state::StageState;

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// Unique transaction identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(u64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn#{}", self.0)
    }
}

/// Lifecycle status of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionStatus {
    /// Open; private states may be read and mutated.
    #[default]
    Pending,
    /// Private states were promoted to committed states.
    Committed,
    /// Private states were dropped without effect.
    Discarded,
}

/// One proposed reconfiguration of a pipe's chain.
pub struct Transaction {
    id: TransactionId,
    pipe: PipeId,
    status: TransactionStatus,
    states: HashMap<StageId, StageState>,
}

impl Transaction {
    pub(crate) fn new(pipe: PipeId) -> Self {
        Self {
            id: TransactionId(NEXT_TRANSACTION_ID.fetch_add(1, Ordering::Relaxed)),
            pipe,
            status: TransactionStatus::Pending,
            states: HashMap::new(),
        }
    }

    /// Transaction identity.
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Pipe this transaction reconfigures.
    pub fn pipe(&self) -> PipeId {
        self.pipe
    }

    /// Current status.
    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    /// Whether a private state exists for the stage.
    pub fn has_state(&self, stage: StageId) -> bool {
        self.states.contains_key(&stage)
    }

    /// The transaction-scoped state for a stage.
    ///
    /// Absence means the stage was never duplicated into this transaction;
    /// that is a caller protocol error, surfaced as
    /// [`Error::IllegalState`].
    pub fn state(&self, stage: StageId) -> Result<&StageState> {
        self.states.get(&stage).ok_or_else(|| {
            Error::illegal_state(format!(
                "no state for {stage} in {}; was it attached after duplicate_all?",
                self.id
            ))
        })
    }

    /// Mutable access to the transaction-scoped state for a stage.
    pub fn state_mut(&mut self, stage: StageId) -> Result<&mut StageState> {
        let id = self.id;
        self.states.get_mut(&stage).ok_or_else(|| {
            Error::illegal_state(format!(
                "no state for {stage} in {id}; was it attached after duplicate_all?"
            ))
        })
    }

    pub(crate) fn insert_state(&mut self, stage: StageId, state: StageState) {
        self.states.insert(stage, state);
    }

    pub(crate) fn take_states(&mut self) -> Vec<(StageId, StageState)> {
        self.states.drain().collect()
    }

    pub(crate) fn set_status(&mut self, status: TransactionStatus) {
        self.status = status;
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("pipe", &self.pipe)
            .field("status", &self.status)
            .field("states", &self.states.len())
            .finish()
    }
}
