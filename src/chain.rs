//! Ordered stage chain bound to one pipe.
//!
//! The chain is an explicit ordered list of stage handles, closest to the
//! source first. Order is fixed at attach time: a stage is inserted at the
//! head of the chain or immediately after a named previous stage, and is
//! never reordered afterwards.

use crate::error::{Error, Result};
use crate::pipe::PipeId;
use crate::stage::{Registry, StageId};

/// Ordered sequence of stages between a pipe's origin and its sink.
#[derive(Debug)]
pub struct Chain {
    pipe: PipeId,
    stages: Vec<StageId>,
}

impl Chain {
    pub(crate) fn new(pipe: PipeId) -> Self {
        Self {
            pipe,
            stages: Vec::new(),
        }
    }

    /// Pipe this chain is bound to.
    pub fn pipe(&self) -> PipeId {
        self.pipe
    }

    /// Number of attached stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the chain has no stages.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Whether the stage is part of this chain.
    pub fn contains(&self, stage: StageId) -> bool {
        self.stages.contains(&stage)
    }

    /// Position of the stage in source-to-sink order.
    pub fn position(&self, stage: StageId) -> Option<usize> {
        self.stages.iter().position(|&s| s == stage)
    }

    /// Stage closest to the source, if any.
    pub fn first(&self) -> Option<StageId> {
        self.stages.first().copied()
    }

    /// Stage closest to the sink, if any.
    pub fn last(&self) -> Option<StageId> {
        self.stages.last().copied()
    }

    /// Next stage towards the sink, or `None` at the tail or if `stage` is
    /// not attached here.
    pub fn next(&self, stage: StageId) -> Option<StageId> {
        let pos = self.position(stage)?;
        self.stages.get(pos + 1).copied()
    }

    /// Previous stage towards the source, or `None` at the head or if
    /// `stage` is not attached here.
    pub fn prev(&self, stage: StageId) -> Option<StageId> {
        let pos = self.position(stage)?;
        pos.checked_sub(1).and_then(|p| self.stages.get(p).copied())
    }

    /// Iterate source-to-sink.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = StageId> + '_ {
        self.stages.iter().copied()
    }

    /// Attach a stage to this chain.
    ///
    /// With `previous = None` the stage is linked directly at the pipe's
    /// output (chain head); otherwise immediately after `previous`, which
    /// must already be attached to the same pipe.
    ///
    /// The stage's attach hook runs first; if it fails the stage is left
    /// fully detached and the failure is surfaced as
    /// [`Error::StageRejected`]. On success the stage's initial committed
    /// state is allocated via its duplicate hook.
    pub fn attach(
        &mut self,
        registry: &Registry,
        stage: StageId,
        previous: Option<StageId>,
    ) -> Result<()> {
        if !registry.contains(stage) {
            return Err(Error::InvalidArgument(format!(
                "{stage} is not a registered stage"
            )));
        }

        if let Some(prev) = previous {
            let on_this_pipe =
                self.contains(prev) && registry.attached_pipe(prev)? == Some(self.pipe);
            if !on_this_pipe {
                let previous = registry
                    .stage_name(prev)
                    .unwrap_or_else(|_| prev.to_string());
                return Err(Error::InvalidPrevious { previous });
            }
        }

        if registry.attached_pipe(stage)?.is_some() {
            return Err(Error::AlreadyAttached {
                stage: registry.stage_name(stage)?,
            });
        }

        if let Err(err) = registry.with_stage(stage, |s| s.attach())? {
            // Hook refused; nothing has been linked yet.
            return Err(Error::rejected(registry.stage_name(stage)?, "attach", err));
        }

        let initial = registry.duplicate_state(stage)?;
        registry.set_committed(stage, Some(initial))?;
        registry.set_pipe(stage, Some(self.pipe))?;

        let at = match previous {
            Some(prev) => {
                self.position(prev)
                    .ok_or_else(|| Error::illegal_state(format!("{prev} left the chain")))?
                    + 1
            }
            None => 0,
        };
        self.stages.insert(at, stage);

        tracing::debug!(stage = %stage, pipe = %self.pipe, position = at, "attached stage");
        Ok(())
    }

    /// Detach the chain's tail stage.
    ///
    /// Only the tail may be detached from a live pipe; detaching a mid-chain
    /// stage is an [`Error::IllegalState`]. Whole-pipe teardown removes
    /// stages tail-first through [`Pipe::teardown`](crate::pipe::Pipe::teardown).
    ///
    /// The stage's detach hook runs best-effort: a failure is logged and
    /// swallowed so teardown always completes.
    pub fn detach(&mut self, registry: &Registry, stage: StageId) -> Result<()> {
        let pos = self
            .position(stage)
            .ok_or_else(|| Error::NotFound(format!("{stage} is not attached to this chain")))?;
        if pos + 1 != self.stages.len() {
            return Err(Error::illegal_state(format!(
                "{stage} is not the chain tail; only tail stages may be detached from a live pipe"
            )));
        }

        match registry.with_stage(stage, |s| s.detach()) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::warn!(stage = %stage, error = %err, "detach hook failed, continuing teardown");
            }
            Err(err) => {
                // Registry no longer knows the stage; unlink it anyway so the
                // chain does not keep a dangling handle.
                tracing::warn!(stage = %stage, error = %err, "stage vanished during detach");
                self.stages.remove(pos);
                return Err(err);
            }
        }

        registry.set_committed(stage, None)?;
        registry.set_pipe(stage, None)?;
        self.stages.remove(pos);

        tracing::debug!(stage = %stage, pipe = %self.pipe, "detached stage");
        Ok(())
    }

    /// Drop the tail handle without touching the registry. Teardown fallback
    /// for stages the registry no longer knows about.
    pub(crate) fn pop_tail(&mut self) -> Option<StageId> {
        self.stages.pop()
    }
}
