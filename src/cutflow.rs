//! Per-variation survival accounting.

use std::collections::HashMap;
use std::fmt;

use serde::ser::{Serialize, Serializer};

/// Result of applying one cut.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CutOutcome {
    Kept,
    Rejected(String),
}

/// Ordered pass counts, one per cut name, in first-seen order.
///
/// Never reset: counts accumulate over the whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CutFlow {
    names: Vec<String>,
    counts: HashMap<String, u64>,
}

impl CutFlow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects the record when `predicate` holds. Otherwise counts a pass
    /// for `name`.
    ///
    /// Passing the same name twice within one record counts it twice.
    pub fn cut_if(&mut self, predicate: bool, name: &str) -> CutOutcome {
        if predicate {
            return CutOutcome::Rejected(name.to_string());
        }
        match self.counts.get_mut(name) {
            Some(n) => *n += 1,
            None => {
                self.counts.insert(name.to_string(), 1);
                self.names.push(name.to_string());
            }
        }
        CutOutcome::Kept
    }

    pub fn count(&self, name: &str) -> u64 {
        self.counts.get(name).copied().unwrap_or(0)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// `(name, count)` pairs in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> + '_ {
        self.names.iter().map(|n| (n.as_str(), self.count(n)))
    }
}

impl fmt::Display for CutFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "(no cuts)");
        }
        let width = self.names.iter().map(|n| n.len()).max().unwrap_or(0);
        for (name, count) in self.iter() {
            writeln!(f, "{name}:{:pad$}\t{count}", "", pad = width - name.len())?;
        }
        Ok(())
    }
}

impl Serialize for CutFlow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn counts_passes_in_first_seen_order() {
        let mut cf = CutFlow::new();
        assert_eq!(cf.cut_if(false, "b"), CutOutcome::Kept);
        assert_eq!(cf.cut_if(false, "a"), CutOutcome::Kept);
        assert_eq!(cf.cut_if(false, "b"), CutOutcome::Kept);
        assert_eq!(cf.names(), ["b", "a"]);
        assert_eq!(cf.count("b"), 2);
        assert_eq!(cf.count("a"), 1);
    }

    #[test]
    fn rejection_records_nothing() {
        let mut cf = CutFlow::new();
        cf.cut_if(false, "first");
        assert_eq!(cf.cut_if(true, "second"), CutOutcome::Rejected("second".into()));
        assert_eq!(cf.names(), ["first"]);
        assert_eq!(cf.count("second"), 0);
    }

    #[test]
    fn renders_aligned_table() {
        let mut cf = CutFlow::new();
        assert_eq!(cf.to_string(), "(no cuts)");
        cf.cut_if(false, "2muons");
        cf.cut_if(false, "met80");
        cf.cut_if(false, "2muons");
        assert_eq!(cf.to_string(), "2muons:\t2\nmet80: \t1\n");
    }

    #[test]
    fn serializes_as_ordered_map() {
        let mut cf = CutFlow::new();
        cf.cut_if(false, "z");
        cf.cut_if(false, "a");
        assert_eq!(serde_json::to_string(&cf).unwrap(), r#"{"z":1,"a":1}"#);
    }
}
