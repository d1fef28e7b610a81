use serde_json::Value;
use std::collections::HashMap;
use std::rc::Rc;

use crate::errors::Signal;
use crate::variation::Scope;

/// What a calculable body returns: a value, or a `Signal` asking to defer or halt.
pub type CalcResult = std::result::Result<Value, Signal>;

/// A named, nullary, per-record computation.
pub trait Calculable {
    fn compute(&self, scope: &Scope<'_>) -> CalcResult;
}

impl<F> Calculable for F
where
    F: Fn(&Scope<'_>) -> CalcResult,
{
    fn compute(&self, scope: &Scope<'_>) -> CalcResult {
        self(scope)
    }
}

/// Table of calculables, built once per analysis type.
///
/// Cloning is cheap; variations built from the same table share it and differ
/// only through their parameters.
#[derive(Clone, Default)]
pub struct Calculables {
    inner: Rc<HashMap<String, Rc<dyn Calculable>>>,
}

impl Calculables {
    pub fn new() -> Self { Self::default() }

    pub fn register<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&Scope<'_>) -> CalcResult + 'static,
    {
        self.register_calculable(name, f);
    }

    pub fn register_calculable<C: Calculable + 'static>(&mut self, name: &str, c: C) {
        let map = Rc::make_mut(&mut self.inner);
        map.insert(name.to_string(), Rc::new(c));
    }

    /// Chained form of [`Calculables::register`].
    pub fn with<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&Scope<'_>) -> CalcResult + 'static,
    {
        self.register(name, f);
        self
    }

    pub fn get(&self, name: &str) -> Option<Rc<dyn Calculable>> {
        self.inner.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.inner.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize { self.inner.len() }

    pub fn is_empty(&self) -> bool { self.inner.is_empty() }
}
