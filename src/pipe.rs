//! Pipe: the output path owning a chain, and the commit-driver boundary.
//!
//! A [`Pipe`] binds one [`Chain`] to a shared [`Registry`] and carries the
//! timing parameters and sink capabilities the chain is configured against.
//! The commit driver's whole call path goes through here:
//!
//! ```rust,ignore
//! let mut txn = pipe.open_transaction();
//! pipe.duplicate_all(&mut txn)?;
//! pipe.negotiate(&mut txn)?;
//! pipe.validate(&txn)?;
//! pipe.run_phase(Phase::Disable, &txn, head)?;
//! pipe.run_phase(Phase::PostDisable, &txn, head)?;
//! // ... reconfigure hardware ...
//! pipe.run_phase(Phase::PreEnable, &txn, head)?;
//! pipe.run_phase(Phase::Enable, &txn, head)?;
//! pipe.commit(&mut txn)?;
//! ```
//!
//! Only one transaction per pipe may be in flight at a time; that invariant
//! belongs to the commit driver and is not enforced here.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::chain::Chain;
use crate::error::{Error, Result};
use crate::format::BusFormat;
use crate::lifecycle::{self, Phase};
use crate::negotiate;
use crate::stage::{Registry, StageId};
use crate::transaction::{Transaction, TransactionStatus};

static NEXT_PIPE_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque pipe identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipeId(pub(crate) u64);

impl fmt::Display for PipeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pipe#{}", self.0)
    }
}

/// Timing parameters of the output path, handed to stage `validate` hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipeParams {
    /// Active horizontal pixels.
    pub hactive: u32,
    /// Active vertical lines.
    pub vactive: u32,
    /// Pixel clock in kHz.
    pub pixel_clock_khz: u32,
}

/// Capabilities of the terminal sink consuming the chain's output.
#[derive(Debug, Clone, Default)]
pub struct SinkInfo {
    /// Bus formats the sink accepts, most preferred first. Consulted only
    /// when the chain's last stage does not enumerate output formats.
    pub preferred_formats: Vec<BusFormat>,
}

/// One output path: a chain of stages bound to a shared registry.
pub struct Pipe {
    id: PipeId,
    registry: Arc<Registry>,
    chain: Chain,
    params: PipeParams,
    sink: SinkInfo,
}

impl Pipe {
    /// Create a pipe with an empty chain.
    pub fn new(registry: Arc<Registry>, params: PipeParams, sink: SinkInfo) -> Self {
        let id = PipeId(NEXT_PIPE_ID.fetch_add(1, Ordering::Relaxed));
        Self {
            id,
            registry,
            chain: Chain::new(id),
            params,
            sink,
        }
    }

    /// Pipe identity.
    pub fn id(&self) -> PipeId {
        self.id
    }

    /// The pipe's chain.
    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    /// The shared stage registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Timing parameters of this pipe.
    pub fn params(&self) -> &PipeParams {
        &self.params
    }

    /// The sink's capabilities.
    pub fn sink(&self) -> &SinkInfo {
        &self.sink
    }

    /// Attach a registered stage to this pipe's chain.
    ///
    /// See [`Chain::attach`] for ordering and failure semantics.
    pub fn attach(&mut self, stage: StageId, previous: Option<StageId>) -> Result<()> {
        self.chain.attach(&self.registry, stage, previous)
    }

    /// Detach the chain's tail stage. See [`Chain::detach`].
    pub fn detach(&mut self, stage: StageId) -> Result<()> {
        self.chain.detach(&self.registry, stage)
    }

    /// Detach every stage, tail first. Teardown always completes; stages the
    /// registry has lost track of are unlinked and logged.
    pub fn teardown(&mut self) {
        while let Some(tail) = self.chain.last() {
            if let Err(err) = self.chain.detach(&self.registry, tail) {
                tracing::warn!(pipe = %self.id, stage = %tail, error = %err,
                    "forced unlink during teardown");
                if self.chain.last() == Some(tail) {
                    self.chain.pop_tail();
                }
            }
        }
    }

    /// Open a new pending transaction for this pipe.
    pub fn open_transaction(&self) -> Transaction {
        let txn = Transaction::new(self.id);
        tracing::debug!(pipe = %self.id, txn = %txn.id(), "opened transaction");
        txn
    }

    /// Duplicate every attached stage's committed state into the
    /// transaction, through each stage's duplicate hook.
    pub fn duplicate_all(&self, txn: &mut Transaction) -> Result<()> {
        self.check_txn(txn)?;
        for id in self.chain.iter() {
            let state = self.registry.duplicate_state(id)?;
            txn.insert_state(id, state);
        }
        Ok(())
    }

    /// Resolve bus formats for the whole chain into the transaction's
    /// states. See the [`negotiate`] module for the search semantics.
    pub fn negotiate(&self, txn: &mut Transaction) -> Result<()> {
        self.check_txn(txn)?;
        negotiate::select_formats(&self.registry, &self.chain, &self.sink, txn)
    }

    /// Validate every stage's resolved configuration, sink side first.
    pub fn validate(&self, txn: &Transaction) -> Result<()> {
        self.check_txn(txn)?;
        lifecycle::check(&self.registry, &self.chain, txn, &self.params)
    }

    /// Run one lifecycle phase from `from` towards the chain tail, in the
    /// phase's direction. See [`lifecycle::run_phase`].
    pub fn run_phase(&self, phase: Phase, txn: &Transaction, from: StageId) -> Result<()> {
        self.check_txn(txn)?;
        lifecycle::run_phase(&self.registry, &self.chain, txn, phase, from)
    }

    /// Promote the transaction's private states to committed states.
    ///
    /// Atomic with respect to committed-state readers: the registry lock is
    /// held for the whole update. The transaction ends `Committed` and its
    /// states can no longer be read.
    pub fn commit(&self, txn: &mut Transaction) -> Result<()> {
        self.check_txn(txn)?;
        let states = txn.take_states();
        self.registry.commit_states(states)?;
        txn.set_status(TransactionStatus::Committed);
        tracing::debug!(pipe = %self.id, txn = %txn.id(), "committed transaction");
        Ok(())
    }

    /// Drop the transaction's private states without touching committed
    /// state. The transaction ends `Discarded`.
    pub fn discard(&self, txn: &mut Transaction) -> Result<()> {
        self.check_txn(txn)?;
        txn.take_states();
        txn.set_status(TransactionStatus::Discarded);
        tracing::debug!(pipe = %self.id, txn = %txn.id(), "discarded transaction");
        Ok(())
    }

    fn check_txn(&self, txn: &Transaction) -> Result<()> {
        if txn.pipe() != self.id {
            return Err(Error::illegal_state(format!(
                "{} belongs to {}, not {}",
                txn.id(),
                txn.pipe(),
                self.id
            )));
        }
        if txn.status() != TransactionStatus::Pending {
            return Err(Error::illegal_state(format!(
                "{} is no longer pending ({:?})",
                txn.id(),
                txn.status()
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for Pipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipe")
            .field("id", &self.id)
            .field("stages", &self.chain.len())
            .field("params", &self.params)
            .finish()
    }
}
