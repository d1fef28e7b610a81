pub mod errors;
pub mod context;
pub mod engine; // driver loop
pub mod calculables;
pub mod cutflow;
pub mod record;
pub mod sink;
pub mod variation;

pub use calculables::{CalcResult, Calculable, Calculables};
pub use context::RunOptions;
pub use cutflow::{CutFlow, CutOutcome};
pub use engine::{run, RunSummary};
pub use errors::{Error, Halt, Result, Signal};
pub use record::{JsonRecord, MemorySource, Record, RecordSource};
pub use sink::{EntrySink, Row, RowSink, SharedRows};
pub use variation::{Scope, Variation, VariationId, VariationSet};
