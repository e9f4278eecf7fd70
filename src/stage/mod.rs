//! Stage trait and registry.
//!
//! A stage is one transformation unit in a pipe's chain (an encoder-side
//! bridge in display terms). Stages are registered into a process-wide
//! [`Registry`], attached into at most one chain at a time, and participate
//! in format negotiation and lifecycle sequencing through the hook set on
//! the [`Stage`] trait.
//!
//! Every hook has a default so implementations opt in per capability:
//!
//! - returning `None` from [`Stage::input_formats`] opts the stage out of
//!   format negotiation (it will carry the `Fixed` sentinel),
//! - the `atomic_*` lifecycle hooks fall back to their legacy counterparts,
//! - [`Stage::duplicate_state`] defaults to a plain clone of the committed
//!   state (or a zeroed default if none exists yet).

mod registry;

pub use registry::Registry;

use std::fmt;

use crate::error::Result;
use crate::format::{BusFormat, FormatList};
use crate::pipe::PipeParams;
use crate::state::StageState;

/// Opaque stage handle, stable for the stage's registered lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StageId(pub(crate) u64);

impl StageId {
    /// Get the underlying index.
    pub fn index(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage#{}", self.0)
    }
}

/// A pipeline transformation stage.
///
/// Hooks must not call back into the [`Registry`]; the engine takes the
/// stage out of the registry for the duration of each hook call.
pub trait Stage: Send {
    /// Stable identity, used as the registry key.
    fn name(&self) -> &str;

    /// Called when the stage is linked into a chain. A failure here leaves
    /// the stage fully detached.
    fn attach(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called when the stage is unlinked. Errors are logged and swallowed;
    /// teardown always completes.
    fn detach(&mut self) -> Result<()> {
        Ok(())
    }

    /// Output formats this stage can drive, ordered by preference.
    ///
    /// Only meaningful on the last stage of a chain. `None` means the hook
    /// is not implemented and the sink's preferred format (or `Fixed`) is
    /// used instead.
    fn output_formats(&self) -> Option<FormatList> {
        None
    }

    /// Input formats this stage accepts when producing `output`, ordered by
    /// preference.
    ///
    /// `None` opts the stage out of negotiation entirely; an empty list
    /// means `output` cannot be produced from any input.
    fn input_formats(&self, output: BusFormat) -> Option<FormatList> {
        let _ = output;
        None
    }

    /// Validate the resolved configuration against the pipe parameters.
    fn validate(&mut self, state: &StageState, params: &PipeParams) -> Result<()> {
        let _ = (state, params);
        Ok(())
    }

    /// Legacy disable hook.
    fn disable(&mut self) -> Result<()> {
        Ok(())
    }

    /// Legacy post-disable hook.
    fn post_disable(&mut self) -> Result<()> {
        Ok(())
    }

    /// Legacy pre-enable hook.
    fn pre_enable(&mut self) -> Result<()> {
        Ok(())
    }

    /// Legacy enable hook.
    fn enable(&mut self) -> Result<()> {
        Ok(())
    }

    /// Transaction-aware disable; falls back to [`Stage::disable`].
    fn atomic_disable(&mut self, state: &StageState) -> Result<()> {
        let _ = state;
        self.disable()
    }

    /// Transaction-aware post-disable; falls back to [`Stage::post_disable`].
    fn atomic_post_disable(&mut self, state: &StageState) -> Result<()> {
        let _ = state;
        self.post_disable()
    }

    /// Transaction-aware pre-enable; falls back to [`Stage::pre_enable`].
    fn atomic_pre_enable(&mut self, state: &StageState) -> Result<()> {
        let _ = state;
        self.pre_enable()
    }

    /// Transaction-aware enable; falls back to [`Stage::enable`].
    fn atomic_enable(&mut self, state: &StageState) -> Result<()> {
        let _ = state;
        self.enable()
    }

    /// Duplicate the committed state into a fresh transaction-scoped copy.
    ///
    /// The default clones `current`, or default-initializes when the stage
    /// has never been configured.
    fn duplicate_state(&self, current: Option<&StageState>) -> StageState {
        current.cloned().unwrap_or_default()
    }
}
