//! Bus format negotiation across a stage chain.
//!
//! Negotiation walks the chain in reverse, starting from the sink-adjacent
//! stage. For each candidate output format of the last stage, the whole
//! chain is resolved backwards: every stage must pick an input format it can
//! transcode into the output format requested of it, and that pick becomes
//! the output format requested of its upstream neighbour. A stage that
//! cannot satisfy a request reports [`Error::Unsupported`] and the search
//! backtracks to the next candidate; the first fully resolved combination
//! wins.
//!
//! Candidate lists are tried strictly in enumeration order, so stage
//! implementations control preference purely through ordering. Stages that
//! do not implement [`Stage::input_formats`](crate::stage::Stage::input_formats)
//! are passed over with the [`BusFormat::Fixed`] sentinel: they never block
//! the search themselves, but their upstream neighbour must accept `Fixed`
//! or the branch fails. There are no silent mismatches.
//!
//! Resolved formats are collected in a scratch assignment list and written
//! to the transaction's states only once the whole chain has resolved, so a
//! failed search leaves every state untouched.

use smallvec::smallvec;

use crate::chain::Chain;
use crate::error::{Error, Result};
use crate::format::{BusFormat, FormatList};
use crate::pipe::SinkInfo;
use crate::stage::{Registry, StageId};
use crate::transaction::Transaction;

/// One resolved (input, output) pair for a stage, pending application.
type Assignment = (StageId, BusFormat, BusFormat);

/// Assign input/output bus formats to every stage state in `txn`.
///
/// An empty chain trivially succeeds. Fails with [`Error::Unsupported`]
/// when no combination of declared formats can be transported end-to-end;
/// in that case no state in `txn` is modified.
pub fn select_formats(
    registry: &Registry,
    chain: &Chain,
    sink: &SinkInfo,
    txn: &mut Transaction,
) -> Result<()> {
    let (Some(first), Some(last)) = (chain.first(), chain.last()) else {
        return Ok(());
    };

    // Every chain stage must have been duplicated into the transaction
    // before negotiation.
    for id in chain.iter() {
        txn.state(id)?;
    }

    let out_candidates: FormatList = match registry.with_stage(last, |s| s.output_formats())? {
        Some(formats) => {
            if formats.is_empty() {
                return Err(Error::Unsupported(format!(
                    "{last} reports no supported output formats"
                )));
            }
            formats
        }
        // Last stage does not enumerate outputs: try the sink's preferred
        // format if known, the fixed sentinel otherwise.
        None => smallvec![sink
            .preferred_formats
            .first()
            .copied()
            .unwrap_or(BusFormat::Fixed)],
    };

    let mut assignments: Vec<Assignment> = Vec::with_capacity(chain.len());
    for out_fmt in out_candidates {
        assignments.clear();
        match resolve(registry, chain, first, last, out_fmt, &mut assignments) {
            Ok(()) => {
                for (id, input, output) in assignments {
                    let state = txn.state_mut(id)?;
                    state.input_format = input;
                    state.output_format = output;
                    tracing::debug!(stage = %id, input = %input, output = %output, "negotiated formats");
                }
                return Ok(());
            }
            Err(Error::Unsupported(reason)) => {
                tracing::trace!(output = %out_fmt, %reason, "sink output candidate failed");
            }
            Err(err) => return Err(err),
        }
    }

    Err(Error::Unsupported(
        "no bus format combination works across the whole chain".into(),
    ))
}

/// Resolve `cur` and everything upstream of it for the requested output
/// format. Appends to `assignments` only on success, deepest stage first.
fn resolve(
    registry: &Registry,
    chain: &Chain,
    first: StageId,
    cur: StageId,
    out_fmt: BusFormat,
    assignments: &mut Vec<Assignment>,
) -> Result<()> {
    let prev = chain.prev(cur);

    let Some(candidates) = registry.with_stage(cur, |s| s.input_formats(out_fmt))? else {
        // Negotiation not supported by this stage: hand the fixed sentinel
        // to the previous stage and hope it copes by applying defaults.
        if cur != first {
            let prev = prev
                .ok_or_else(|| Error::illegal_state(format!("{cur} has no upstream neighbour")))?;
            resolve(registry, chain, first, prev, BusFormat::Fixed, assignments)?;
        }
        assignments.push((cur, BusFormat::Fixed, out_fmt));
        return Ok(());
    };

    if candidates.is_empty() {
        return Err(Error::Unsupported(format!(
            "{cur} cannot produce {out_fmt} from any input"
        )));
    }

    if cur == first {
        // Nothing upstream left to negotiate with; first preference wins.
        assignments.push((cur, candidates[0], out_fmt));
        return Ok(());
    }

    let prev =
        prev.ok_or_else(|| Error::illegal_state(format!("{cur} has no upstream neighbour")))?;
    for candidate in candidates {
        tracing::trace!(stage = %cur, input = %candidate, output = %out_fmt, "trying input candidate");
        let mark = assignments.len();
        match resolve(registry, chain, first, prev, candidate, assignments) {
            Ok(()) => {
                assignments.push((cur, candidate, out_fmt));
                return Ok(());
            }
            Err(Error::Unsupported(_)) => {
                assignments.truncate(mark);
            }
            Err(err) => return Err(err),
        }
    }

    Err(Error::Unsupported(format!(
        "no input format of {cur} is reachable upstream for output {out_fmt}"
    )))
}
