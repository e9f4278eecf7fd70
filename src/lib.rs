//! # Viaduct
//!
//! Bridge-chain management and bus-format negotiation for display pipelines.
//!
//! A display output path ("pipe") rarely drives its sink directly; the
//! signal crosses a chain of transformation stages (encoder bridges, level
//! shifters, LVDS transmitters) that each may change the pixel bus format.
//! Viaduct models that chain: an ordered sequence of [`Stage`](stage::Stage)s
//! bound to one [`Pipe`](pipe::Pipe), with a private, transactional
//! configuration state per stage and
//! a recursive backtracking search that picks an input/output bus format
//! pair every stage can transport end-to-end.
//!
//! ## Commit flow
//!
//! ```rust,ignore
//! use viaduct::prelude::*;
//!
//! let registry = Arc::new(Registry::new());
//! let mut pipe = Pipe::new(registry.clone(), params, sink);
//! pipe.attach(encoder, None)?;
//! pipe.attach(lvds, Some(encoder))?;
//!
//! let mut txn = pipe.open_transaction();
//! pipe.duplicate_all(&mut txn)?;
//! pipe.negotiate(&mut txn)?;
//! pipe.validate(&txn)?;
//! pipe.run_phase(Phase::PreEnable, &txn, encoder)?;
//! pipe.run_phase(Phase::Enable, &txn, encoder)?;
//! pipe.commit(&mut txn)?;
//! ```
//!
//! Everything is synchronous and single-caller-per-pipe: the only internal
//! lock is the registry's, and a transaction either fully resolves or fails
//! with no partial effect.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chain;
pub mod error;
pub mod format;
pub mod lifecycle;
pub mod negotiate;
pub mod pipe;
pub mod stage;
pub mod state;
pub mod transaction;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::chain::Chain;
    pub use crate::error::{Error, Result};
    pub use crate::format::{BusFormat, FormatList};
    pub use crate::lifecycle::Phase;
    pub use crate::pipe::{Pipe, PipeId, PipeParams, SinkInfo};
    pub use crate::stage::{Registry, Stage, StageId};
    pub use crate::state::{StageData, StageState};
    pub use crate::transaction::{Transaction, TransactionId, TransactionStatus};
}

pub use error::{Error, Result};
