//! Lifecycle hook dispatch across a chain.
//!
//! Hardware sequencing depends on the traversal direction of each phase:
//! downstream stages must be powered before upstream ones during enable,
//! and torn down first during disable. The dispatcher walks the chain
//! accordingly and must never reorder or parallelize hook calls.
//!
//! | Phase          | Direction        | Visits                          |
//! |----------------|------------------|---------------------------------|
//! | `Disable`      | sink to source   | chain tail down to the requested stage |
//! | `PostDisable`  | source to sink   | requested stage to chain tail   |
//! | `PreEnable`    | sink to source   | chain tail down to the requested stage |
//! | `Enable`       | source to sink   | requested stage to chain tail   |
//!
//! Each visited stage's transaction-aware hook receives its private state
//! from the transaction; the trait defaults fall back to the legacy hooks
//! for stages that predate transactional configuration.

use std::fmt;

use crate::chain::Chain;
use crate::error::{Error, Result};
use crate::pipe::PipeParams;
use crate::stage::{Registry, StageId};
use crate::transaction::Transaction;

/// A lifecycle phase applied across part of a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Stop scanout, sink side first.
    Disable,
    /// Post-disable cleanup, source side first.
    PostDisable,
    /// Power-up preparation, sink side first.
    PreEnable,
    /// Start scanout, source side first.
    Enable,
}

impl Phase {
    /// Phase name for diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disable => "disable",
            Self::PostDisable => "post_disable",
            Self::PreEnable => "pre_enable",
            Self::Enable => "enable",
        }
    }

    fn reversed(&self) -> bool {
        matches!(self, Self::Disable | Self::PreEnable)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run one lifecycle phase over the chain segment from `from` to the tail,
/// in the phase's direction.
///
/// Enable and disable hooks have a must-succeed contract: the first failure
/// aborts the phase and is surfaced as [`Error::StageRejected`] naming the
/// stage and phase. A stage without a transaction state is an
/// [`Error::IllegalState`] (it was attached after `duplicate_all`).
pub fn run_phase(
    registry: &Registry,
    chain: &Chain,
    txn: &Transaction,
    phase: Phase,
    from: StageId,
) -> Result<()> {
    let pos = chain.position(from).ok_or_else(|| {
        Error::InvalidArgument(format!("{from} is not attached to this chain"))
    })?;

    let mut order: Vec<StageId> = chain.iter().skip(pos).collect();
    if phase.reversed() {
        order.reverse();
    }

    for id in order {
        let state = txn.state(id)?;
        let hook_result = registry.with_stage(id, |stage| match phase {
            Phase::Disable => stage.atomic_disable(state),
            Phase::PostDisable => stage.atomic_post_disable(state),
            Phase::PreEnable => stage.atomic_pre_enable(state),
            Phase::Enable => stage.atomic_enable(state),
        })?;
        if let Err(err) = hook_result {
            let name = registry.stage_name(id).unwrap_or_else(|_| id.to_string());
            return Err(Error::rejected(name, phase.as_str(), err));
        }
        tracing::trace!(stage = %id, phase = %phase, "lifecycle hook done");
    }

    Ok(())
}

/// Validate every stage's resolved configuration, sink side first.
///
/// Runs after negotiation succeeds; each stage's `validate` hook sees its
/// resolved (input, output) pair and the pipe parameters. The first failure
/// aborts and is surfaced as that stage's [`Error::StageRejected`].
pub fn check(
    registry: &Registry,
    chain: &Chain,
    txn: &Transaction,
    params: &PipeParams,
) -> Result<()> {
    for id in chain.iter().rev() {
        let state = txn.state(id)?;
        let hook_result = registry.with_stage(id, |stage| stage.validate(state, params))?;
        if let Err(err) = hook_result {
            let name = registry.stage_name(id).unwrap_or_else(|_| id.to_string());
            return Err(Error::rejected(name, "validate", err));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::PipeId;
    use crate::stage::testing::{events, new_log, AtomicStage, EventLog, TestStage};

    struct Rig {
        registry: Registry,
        chain: Chain,
        txn: Transaction,
        log: EventLog,
    }

    impl Rig {
        fn with_legacy_stages(names: &[&str]) -> Self {
            let mut rig = Self {
                registry: Registry::new(),
                chain: Chain::new(PipeId(1)),
                txn: Transaction::new(PipeId(1)),
                log: new_log(),
            };
            for name in names {
                let stage = TestStage::new(*name, rig.log.clone());
                rig.add(Box::new(stage));
            }
            rig
        }

        fn add(&mut self, stage: Box<dyn crate::stage::Stage>) -> StageId {
            let id = self.registry.register(stage).unwrap();
            let previous = self.chain.last();
            self.chain.attach(&self.registry, id, previous).unwrap();
            self.txn
                .insert_state(id, self.registry.duplicate_state(id).unwrap());
            id
        }

        fn run(&self, phase: Phase, from: StageId) -> Result<()> {
            run_phase(&self.registry, &self.chain, &self.txn, phase, from)
        }

        fn head(&self) -> StageId {
            self.chain.first().unwrap()
        }

        fn hook_events(&self) -> Vec<String> {
            events(&self.log)
                .into_iter()
                .filter(|e| !e.starts_with("attach:"))
                .collect()
        }
    }

    #[test]
    fn test_disable_runs_sink_to_source() {
        let rig = Rig::with_legacy_stages(&["s1", "s2", "s3"]);
        rig.run(Phase::Disable, rig.head()).unwrap();
        assert_eq!(rig.hook_events(), vec!["disable:s3", "disable:s2", "disable:s1"]);
    }

    #[test]
    fn test_post_disable_runs_source_to_sink() {
        let rig = Rig::with_legacy_stages(&["s1", "s2", "s3"]);
        rig.run(Phase::PostDisable, rig.head()).unwrap();
        assert_eq!(
            rig.hook_events(),
            vec!["post_disable:s1", "post_disable:s2", "post_disable:s3"]
        );
    }

    #[test]
    fn test_pre_enable_runs_sink_to_source() {
        let rig = Rig::with_legacy_stages(&["s1", "s2", "s3"]);
        rig.run(Phase::PreEnable, rig.head()).unwrap();
        assert_eq!(
            rig.hook_events(),
            vec!["pre_enable:s3", "pre_enable:s2", "pre_enable:s1"]
        );
    }

    #[test]
    fn test_enable_runs_source_to_sink() {
        let rig = Rig::with_legacy_stages(&["s1", "s2", "s3"]);
        rig.run(Phase::Enable, rig.head()).unwrap();
        assert_eq!(rig.hook_events(), vec!["enable:s1", "enable:s2", "enable:s3"]);
    }

    #[test]
    fn test_phase_starts_at_requested_stage() {
        let rig = Rig::with_legacy_stages(&["s1", "s2", "s3"]);
        let s2 = rig.chain.next(rig.head()).unwrap();

        rig.run(Phase::Disable, s2).unwrap();
        assert_eq!(rig.hook_events(), vec!["disable:s3", "disable:s2"]);
    }

    #[test]
    fn test_atomic_hooks_preferred_over_legacy() {
        let log = new_log();
        let mut rig = Rig::with_legacy_stages(&[]);
        rig.log = log.clone();
        rig.add(Box::new(AtomicStage::new("a1", log)));

        rig.run(Phase::Enable, rig.head()).unwrap();
        assert_eq!(rig.hook_events(), vec!["atomic_enable:a1:fixed->fixed"]);
    }

    #[test]
    fn test_enable_failure_aborts_phase() {
        let mut rig = Rig::with_legacy_stages(&["s1"]);
        rig.add(Box::new(TestStage::new("s2", rig.log.clone()).fail_enable()));
        rig.add(Box::new(TestStage::new("s3", rig.log.clone())));

        let err = rig.run(Phase::Enable, rig.head()).unwrap_err();
        match err {
            Error::StageRejected { stage, phase, .. } => {
                assert_eq!(stage, "s2");
                assert_eq!(phase, "enable");
            }
            other => panic!("unexpected error: {other}"),
        }
        // s3 is never reached.
        assert_eq!(rig.hook_events(), vec!["enable:s1", "enable:s2"]);
    }

    #[test]
    fn test_missing_state_is_illegal_state() {
        let mut rig = Rig::with_legacy_stages(&["s1"]);
        // Attach a stage without duplicating its state into the transaction.
        let late = rig.registry
            .register(Box::new(TestStage::new("late", rig.log.clone())))
            .unwrap();
        let tail = rig.chain.last();
        rig.chain.attach(&rig.registry, late, tail).unwrap();

        let err = rig.run(Phase::Enable, rig.head()).unwrap_err();
        assert!(matches!(err, Error::IllegalState(_)));
    }

    #[test]
    fn test_unattached_from_stage_is_invalid_argument() {
        let rig = Rig::with_legacy_stages(&["s1"]);
        let loose = rig.registry
            .register(Box::new(TestStage::new("loose", rig.log.clone())))
            .unwrap();

        let err = rig.run(Phase::Enable, loose).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_check_runs_reverse_and_reports_first_failure() {
        let mut rig = Rig::with_legacy_stages(&["s1"]);
        rig.add(Box::new(TestStage::new("s2", rig.log.clone()).fail_validate()));
        rig.add(Box::new(TestStage::new("s3", rig.log.clone())));

        let err = check(&rig.registry, &rig.chain, &rig.txn, &PipeParams::default()).unwrap_err();
        match err {
            Error::StageRejected { stage, phase, .. } => {
                assert_eq!(stage, "s2");
                assert_eq!(phase, "validate");
            }
            other => panic!("unexpected error: {other}"),
        }
        // Reverse order: s3 validates first, s2 fails, s1 never runs.
        assert_eq!(rig.hook_events(), vec!["validate:s3", "validate:s2"]);
    }

    #[test]
    fn test_check_passes_full_chain() {
        let rig = Rig::with_legacy_stages(&["s1", "s2"]);
        check(&rig.registry, &rig.chain, &rig.txn, &PipeParams::default()).unwrap();
        assert_eq!(rig.hook_events(), vec!["validate:s2", "validate:s1"]);
    }
}
