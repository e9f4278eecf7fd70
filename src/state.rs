//! Per-stage configuration state.
//!
//! Every attached stage owns exactly one committed [`StageState`], and each
//! open [`Transaction`](crate::transaction::Transaction) owns a private copy
//! per stage. The format fields are written by the negotiator; everything
//! else lives behind the [`StageData`] trait object and belongs to the stage
//! implementation.

use std::any::Any;
use std::fmt;

use crate::format::BusFormat;

/// Configuration state for one stage within one transaction (or the
/// committed state between transactions).
#[derive(Debug, Clone, Default)]
pub struct StageState {
    /// Negotiated format on the stage's input side.
    pub input_format: BusFormat,
    /// Negotiated format on the stage's output side.
    pub output_format: BusFormat,
    /// Stage-private payload, opaque to the engine.
    pub data: Option<Box<dyn StageData>>,
}

impl StageState {
    /// State with both format fields set and no private payload.
    pub fn with_formats(input: BusFormat, output: BusFormat) -> Self {
        Self {
            input_format: input,
            output_format: output,
            data: None,
        }
    }

    /// Borrow the private payload downcast to a concrete type.
    pub fn data_as<T: StageData + 'static>(&self) -> Option<&T> {
        self.data.as_deref().and_then(|d| d.as_any().downcast_ref())
    }

    /// Mutably borrow the private payload downcast to a concrete type.
    pub fn data_as_mut<T: StageData + 'static>(&mut self) -> Option<&mut T> {
        self.data
            .as_deref_mut()
            .and_then(|d| d.as_any_mut().downcast_mut())
    }
}

/// Stage-private state payload.
///
/// Implementations carry whatever a stage needs to remember across a
/// reconfiguration. The default duplicate behaviour clones the payload; a
/// stage wanting custom duplication overrides
/// [`Stage::duplicate_state`](crate::stage::Stage::duplicate_state) instead.
/// Custom teardown belongs in a `Drop` impl on the payload type.
pub trait StageData: fmt::Debug + Send {
    /// Clone the payload into a fresh box.
    fn clone_data(&self) -> Box<dyn StageData>;

    /// Upcast for downcasting to the concrete payload type.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for downcasting to the concrete payload type.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl Clone for Box<dyn StageData> {
    fn clone(&self) -> Self {
        self.clone_data()
    }
}
