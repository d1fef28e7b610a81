//! Variations and the resolution of calculables through their fallbacks.
//!
//! A `VariationSet` owns every variation of a run. Fallbacks are edges between
//! ids in that set, so one variation can read another's cache within a record.
//! Resolving a name on a variation goes, in order: local cache, local
//! calculable, fallback variation, bound record field.

use std::cell::{Cell, Ref, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, trace, warn};

use crate::calculables::Calculables;
use crate::cutflow::{CutFlow, CutOutcome};
use crate::errors::{Error, Halt, Result, Signal};
use crate::record::Record;
use crate::sink::EntrySink;

/// Processing function run once per record; `Err(Halt::Skip)` means a cut failed.
pub type ProcessFn = Box<dyn Fn(&Scope<'_>) -> std::result::Result<(), Halt>>;

/// Handle to a variation inside its `VariationSet`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariationId(usize);

impl VariationId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A named computation context.
pub struct Variation {
    name: String,
    calculables: Calculables,
    params: Map<String, Value>,
    process: Option<ProcessFn>,
    sink: RefCell<Option<Box<dyn EntrySink>>>,
    source: Option<Rc<dyn Record>>,
    fallback: Option<VariationId>,
    cache: RefCell<HashMap<String, Value>>,
    // calculables currently being computed, innermost last
    active: RefCell<Vec<String>>,
    valid: Cell<bool>,
    cutflow: RefCell<CutFlow>,
    warned: Cell<bool>,
}

impl Variation {
    pub fn new(name: impl Into<String>, calculables: Calculables) -> Self {
        Self {
            name: name.into(),
            calculables,
            params: Map::new(),
            process: None,
            sink: RefCell::new(None),
            source: None,
            fallback: None,
            cache: RefCell::new(HashMap::new()),
            active: RefCell::new(Vec::new()),
            valid: Cell::new(false),
            cutflow: RefCell::new(CutFlow::new()),
            warned: Cell::new(false),
        }
    }

    pub fn with_process<F>(mut self, f: F) -> Self
    where
        F: Fn(&Scope<'_>) -> std::result::Result<(), Halt> + 'static,
    {
        self.process = Some(Box::new(f));
        self
    }

    /// Sets a parameter readable from calculable bodies via [`Scope::param`].
    pub fn with_param(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.params.insert(name.to_string(), value.into());
        self
    }

    pub fn with_sink<S: EntrySink + 'static>(mut self, sink: S) -> Self {
        self.sink = RefCell::new(Some(Box::new(sink)));
        self
    }

    pub fn with_fallback(mut self, fallback: VariationId) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fallback(&self) -> Option<VariationId> {
        self.fallback
    }

    pub fn can_defer(&self) -> bool {
        self.fallback.is_some()
    }

    pub fn is_valid(&self) -> bool {
        self.valid.get()
    }

    pub fn set_valid(&self, valid: bool) {
        self.valid.set(valid);
    }

    /// Rebinds the record that raw field lookups read from.
    pub fn set_source(&mut self, source: Rc<dyn Record>) {
        self.source = Some(source);
    }

    pub fn cutflow(&self) -> Ref<'_, CutFlow> {
        self.cutflow.borrow()
    }

    pub fn is_cached(&self, name: &str) -> bool {
        self.cache.borrow().contains_key(name)
    }

    /// Drops every cached value and marks the variation invalid.
    pub fn reset(&mut self) {
        self.cache.get_mut().clear();
        self.active.get_mut().clear();
        self.valid.set(false);
    }

    fn warn_once(&self, what: &str) {
        if !self.warned.replace(true) {
            warn!(variation = %self.name, "{what}");
        }
    }

    fn lookup_field(&self, name: &str) -> std::result::Result<Value, Halt> {
        let source = self.source.as_ref().ok_or_else(|| Error::Unbound {
            variation: self.name.clone(),
        })?;
        source.field(name).ok_or_else(|| {
            Halt::Fatal(Error::AttributeLookup {
                variation: self.name.clone(),
                attribute: name.to_string(),
            })
        })
    }
}

/// All variations of a run and the fallback edges between them.
#[derive(Default)]
pub struct VariationSet {
    variations: Vec<Variation>,
}

impl VariationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, variation: Variation) -> VariationId {
        self.variations.push(variation);
        VariationId(self.variations.len() - 1)
    }

    pub fn ids(&self) -> impl Iterator<Item = VariationId> {
        (0..self.variations.len()).map(VariationId)
    }

    pub fn len(&self) -> usize {
        self.variations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variations.is_empty()
    }

    pub fn get(&self, id: VariationId) -> Result<&Variation> {
        self.variations
            .get(id.0)
            .ok_or(Error::UnknownVariation(id.0))
    }

    pub fn get_mut(&mut self, id: VariationId) -> Result<&mut Variation> {
        self.variations
            .get_mut(id.0)
            .ok_or(Error::UnknownVariation(id.0))
    }

    pub fn scope(&self, id: VariationId) -> Result<Scope<'_>> {
        self.get(id)?;
        Ok(Scope { set: self, id })
    }

    /// Rebinds the delegate of `id`. Assigning a variation as its own fallback
    /// leaves the current fallback untouched.
    pub fn set_fallback(&mut self, id: VariationId, fallback: Option<VariationId>) -> Result<()> {
        if let Some(fb) = fallback {
            if fb == id {
                debug!(variation = %self.get(id)?.name, "ignoring self fallback");
                return Ok(());
            }
            self.get(fb)?;
        }
        self.get_mut(id)?.fallback = fallback;
        Ok(())
    }

    pub fn set_source(&mut self, id: VariationId, source: Rc<dyn Record>) -> Result<()> {
        self.get_mut(id)?.set_source(source);
        Ok(())
    }

    pub fn bind_source(&mut self, source: &Rc<dyn Record>) {
        for v in &mut self.variations {
            v.set_source(Rc::clone(source));
        }
    }

    pub fn reset_all(&mut self) {
        for v in &mut self.variations {
            v.reset();
        }
    }

    /// Checks that every fallback chain ends without revisiting a variation.
    pub fn validate(&self) -> Result<()> {
        for start in self.ids() {
            let mut chain = vec![start];
            let mut current = start;
            while let Some(next) = self.get(current)?.fallback {
                self.get(next)?;
                if chain.contains(&next) {
                    chain.push(next);
                    return Err(Error::FallbackCycle {
                        chain: chain
                            .iter()
                            .map(|id| self.variations[id.0].name.clone())
                            .collect(),
                    });
                }
                chain.push(next);
                current = next;
            }
        }
        Ok(())
    }

    /// Resolves `name` on variation `id`.
    pub fn resolve(&self, id: VariationId, name: &str) -> std::result::Result<Value, Halt> {
        let v = self.get(id)?;
        if let Some(hit) = v.cache.borrow().get(name) {
            trace!(variation = %v.name, calculable = name, "cache hit");
            return Ok(hit.clone());
        }

        if let Some(calc) = v.calculables.get(name) {
            if v.active.borrow().iter().any(|a| a == name) {
                return Err(Error::Reentrant {
                    variation: v.name.clone(),
                    calculable: name.to_string(),
                }
                .into());
            }
            v.active.borrow_mut().push(name.to_string());
            let outcome = calc.compute(&Scope { set: self, id });
            v.active.borrow_mut().pop();

            match outcome {
                Ok(value) => {
                    v.cache.borrow_mut().insert(name.to_string(), value.clone());
                    return Ok(value);
                }
                Err(Signal::Defer) => {
                    trace!(variation = %v.name, calculable = name, "deferred");
                }
                Err(Signal::Halt(halt)) => return Err(halt),
            }
        }

        match v.fallback {
            Some(fallback) => self.resolve(fallback, name),
            None => v.lookup_field(name),
        }
    }

    /// Runs the processing function of `id` against the bound record.
    pub fn process(&self, id: VariationId) -> std::result::Result<(), Halt> {
        let v = self.get(id)?;
        match &v.process {
            Some(f) => f(&Scope { set: self, id }),
            None => {
                v.warn_once("no process function supplied");
                Ok(())
            }
        }
    }

    pub fn accept(&self, id: VariationId) -> Result<()> {
        let v = self.get(id)?;
        let mut sink = v.sink.borrow_mut();
        match sink.as_mut() {
            Some(s) => s.accept(&Scope { set: self, id }),
            None => {
                v.warn_once("accept invoked without an output sink");
                Ok(())
            }
        }
    }

    pub fn reject(&self, id: VariationId) -> Result<()> {
        let v = self.get(id)?;
        match v.sink.borrow_mut().as_mut() {
            Some(s) => s.reject(&Scope { set: self, id }),
            None => Ok(()),
        }
    }

    pub fn begin(&self, id: VariationId) -> Result<()> {
        let v = self.get(id)?;
        match v.sink.borrow_mut().as_mut() {
            Some(s) => s.begin(&v.name),
            None => Ok(()),
        }
    }

    pub fn finish(&self, id: VariationId) -> Result<()> {
        let v = self.get(id)?;
        match v.sink.borrow_mut().as_mut() {
            Some(s) => s.finish(&v.name),
            None => Ok(()),
        }
    }
}

/// View of one variation handed to calculable bodies, processing functions
/// and sinks.
#[derive(Clone, Copy)]
pub struct Scope<'a> {
    set: &'a VariationSet,
    id: VariationId,
}

impl<'a> Scope<'a> {
    pub fn id(&self) -> VariationId {
        self.id
    }

    pub fn variation(&self) -> &'a Variation {
        // ids handed out by the set are always in range
        &self.set.variations[self.id.0]
    }

    pub fn name(&self) -> &'a str {
        &self.variation().name
    }

    /// Resolves a calculable or record field.
    pub fn get(&self, name: &str) -> std::result::Result<Value, Halt> {
        self.set.resolve(self.id, name)
    }

    /// [`Scope::get`] for sinks, where a cut failure is an error.
    pub fn read(&self, name: &str) -> Result<Value> {
        self.get(name).map_err(|h| h.into_error(self.name()))
    }

    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> std::result::Result<T, Halt> {
        Ok(serde_json::from_value(self.get(name)?)?)
    }

    pub fn get_f64(&self, name: &str) -> std::result::Result<f64, Halt> {
        let value = self.get(name)?;
        value.as_f64().ok_or_else(|| {
            Halt::Fatal(Error::calculation(format!("`{name}` is not a number: {value}")))
        })
    }

    /// Reads straight from the bound record, bypassing calculables.
    pub fn field(&self, name: &str) -> std::result::Result<Value, Halt> {
        self.variation().lookup_field(name)
    }

    pub fn record(&self) -> Option<Rc<dyn Record>> {
        self.variation().source.clone()
    }

    pub fn param(&self, name: &str) -> Option<&'a Value> {
        self.variation().params.get(name)
    }

    /// Numeric parameter, 0 when unset.
    pub fn param_f64(&self, name: &str) -> f64 {
        self.param(name).and_then(Value::as_f64).unwrap_or(0.0)
    }

    pub fn can_defer(&self) -> bool {
        self.variation().can_defer()
    }

    /// Hands the current calculable to the fallback. Without a fallback this
    /// is a no-op and the body goes on to compute locally.
    pub fn defer(&self) -> std::result::Result<(), Signal> {
        self.defer_if(true)
    }

    pub fn defer_if(&self, cond: bool) -> std::result::Result<(), Signal> {
        if cond && self.can_defer() {
            Err(Signal::Defer)
        } else {
            Ok(())
        }
    }

    pub fn defer_unless(&self, cond: bool) -> std::result::Result<(), Signal> {
        self.defer_if(!cond)
    }

    /// Fails the record for this variation when `predicate` holds.
    pub fn cut_if(&self, predicate: bool, name: &str) -> std::result::Result<(), Halt> {
        match self.variation().cutflow.borrow_mut().cut_if(predicate, name) {
            CutOutcome::Kept => Ok(()),
            CutOutcome::Rejected(cut) => Err(Halt::Skip { cut }),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.variation().is_valid()
    }
}
