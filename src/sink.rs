//! Per-variation output hooks.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::{Map, Value};

use crate::errors::Result;
use crate::variation::Scope;

/// Named values written for one accepted or rejected record.
pub type Row = Map<String, Value>;

/// Rows collected by a [`RowSink`], readable after the run.
pub type SharedRows = Rc<RefCell<Vec<Row>>>;

/// Receives the finalize phase of a variation.
///
/// `accept` runs for a kept record this variation passed. `reject` runs for a
/// kept record it failed, so a placeholder entry can be written.
pub trait EntrySink {
    fn begin(&mut self, _variation: &str) -> Result<()> {
        Ok(())
    }

    fn accept(&mut self, scope: &Scope<'_>) -> Result<()>;

    fn reject(&mut self, _scope: &Scope<'_>) -> Result<()> {
        Ok(())
    }

    fn finish(&mut self, _variation: &str) -> Result<()> {
        Ok(())
    }
}

type Populate = Box<dyn Fn(&Scope<'_>, &mut Row) -> Result<()>>;

/// In-memory output table. Every kept record commits one row carrying a
/// `_valid` flag; accepted rows also carry whatever `populate` writes.
pub struct RowSink {
    populate: Option<Populate>,
    rows: SharedRows,
}

impl RowSink {
    pub const VALID: &'static str = "_valid";

    pub fn new() -> Self {
        Self {
            populate: None,
            rows: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn with_populate<F>(mut self, f: F) -> Self
    where
        F: Fn(&Scope<'_>, &mut Row) -> Result<()> + 'static,
    {
        self.populate = Some(Box::new(f));
        self
    }

    /// Handle to the committed rows; clone it before moving the sink into a variation.
    pub fn rows(&self) -> SharedRows {
        Rc::clone(&self.rows)
    }

    fn commit(&self, mut row: Row, valid: bool) {
        row.insert(Self::VALID.to_string(), Value::Bool(valid));
        self.rows.borrow_mut().push(row);
    }
}

impl Default for RowSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EntrySink for RowSink {
    fn accept(&mut self, scope: &Scope<'_>) -> Result<()> {
        let mut row = Row::new();
        if let Some(populate) = &self.populate {
            populate(scope, &mut row)?;
        }
        self.commit(row, true);
        Ok(())
    }

    fn reject(&mut self, _scope: &Scope<'_>) -> Result<()> {
        self.commit(Row::new(), false);
        Ok(())
    }
}
