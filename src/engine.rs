use itertools::Itertools;
use serde::Serialize;
use tracing::{info, trace, warn};

use crate::context::RunOptions;
use crate::errors::{Halt, Result};
use crate::record::RecordSource;
use crate::variation::{VariationId, VariationSet};

/// =========================
/// Driver loop
/// =========================

/// Counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Records that went through the process phase.
    pub processed: usize,
    /// Records at least one variation passed.
    pub kept: usize,
}

/// Drives `variations` (plus `nominal`, appended if missing) through every
/// record of `source`.
///
/// Every listed variation falls back to `nominal`. Per record, all variations
/// are reset before any is processed; a record one variation passes is
/// finalized for all of them. Any error other than a cut failure aborts the run.
pub fn run<S>(
    source: &mut S,
    set: &mut VariationSet,
    nominal: Option<VariationId>,
    variations: &[VariationId],
    opts: &RunOptions,
) -> Result<RunSummary>
where
    S: RecordSource + ?Sized,
{
    let mut summary = RunSummary::default();

    if let Some(nominal) = nominal {
        for &id in variations {
            set.set_fallback(id, Some(nominal))?;
        }
    }
    let order: Vec<VariationId> = variations.iter().copied().chain(nominal).unique().collect();
    if order.is_empty() {
        warn!("no variations to process; aborting");
        return Ok(summary);
    }
    set.validate()?;

    for &id in &order {
        set.begin(id)?;
    }

    let total = source.entry_count();
    let limit = opts.entry_limit.unwrap_or(total + 1);
    let interval = opts.status_interval.max(1);

    for index in 0..total {
        if index % interval == 0 {
            if !opts.silent {
                info!(
                    "processed {index}/{total} ~ {:.2}%",
                    100.0 * index as f64 / total as f64
                );
            }
            if index >= limit {
                if !opts.silent {
                    info!("entry limit reached ({limit}); quitting early");
                }
                break;
            }
        }

        let Some(record) = source.entry(index)? else {
            break;
        };
        set.bind_source(&record);
        // every cache must be clear before any variation reads through a fallback
        set.reset_all();

        let mut keep = false;
        for &id in &order {
            match set.process(id) {
                Ok(()) => {
                    set.get(id)?.set_valid(true);
                    keep = true;
                }
                Err(Halt::Skip { cut }) => {
                    trace!(entry = index, variation = %set.get(id)?.name(), %cut, "failed cut");
                }
                Err(Halt::Fatal(e)) => return Err(e),
            }
        }
        summary.processed += 1;

        if keep {
            summary.kept += 1;
            for &id in &order {
                if set.get(id)?.is_valid() {
                    set.accept(id)?;
                } else {
                    set.reject(id)?;
                }
            }
        }
    }

    for &id in &order {
        set.finish(id)?;
    }
    Ok(summary)
}
