use std::cell::{Cell, RefCell};
use std::rc::Rc;

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::json;
use variation_loop as vl;
use vl::{Calculables, MemorySource, RunOptions, Variation, VariationSet};

/// `value` is the field scaled by the variation's `scale` parameter, computed
/// locally only when `local` is set.
fn scaled() -> Calculables {
    Calculables::new().with("value", |s| {
        s.defer_unless(s.param("local") == Some(&json!(true)))?;
        Ok(json!(s.get_f64("x")? * s.param_f64("scale")))
    })
}

#[test]
fn variations_see_the_current_record_through_the_fallback() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = seen.clone();
    let mut set = VariationSet::new();
    let nominal = set.add(
        Variation::new("nominal", scaled())
            .with_param("scale", 1.0)
            .with_process(|s| s.get("value").map(drop)),
    );
    let shifted = set.add(Variation::new("shifted", scaled()).with_process(move |s| {
        log.borrow_mut().push(s.get_f64("value")?);
        Ok(())
    }));
    let mut src = MemorySource::single_field("x", [json!(1.0), json!(2.0), json!(3.0)]);

    vl::run(&mut src, &mut set, Some(nominal), &[shifted], &RunOptions::default().silent()).unwrap();
    assert_eq!(*seen.borrow(), vec![1.0, 2.0, 3.0]);
}

#[test]
fn nominal_without_fallback_computes_deferring_calculables() {
    let calls = Rc::new(Cell::new(0));
    let counter = calls.clone();
    let calcs = Calculables::new().with("always", move |s| {
        s.defer()?;
        counter.set(counter.get() + 1);
        Ok(json!("nominal"))
    });
    let mut set = VariationSet::new();
    let nominal = set.add(Variation::new("nominal", calcs));
    let mut src = MemorySource::single_field("x", [json!(0)]);
    let rec = vl::RecordSource::entry(&mut src, 0).unwrap().unwrap();
    set.bind_source(&rec);

    let scope = set.scope(nominal).unwrap();
    assert!(!scope.can_defer());
    assert_eq!(scope.get("always").unwrap(), json!("nominal"));
    assert_eq!(calls.get(), 1);
}

#[test]
fn run_rejects_fallback_cycles() {
    let mut set = VariationSet::new();
    let nominal = set.add(Variation::new("nominal", Calculables::new()));
    let up = set.add(Variation::new("up", Calculables::new()));
    set.set_fallback(nominal, Some(up)).unwrap();
    let mut src = MemorySource::single_field("x", [json!(0)]);

    let err = vl::run(&mut src, &mut set, Some(nominal), &[up], &RunOptions::default().silent())
        .unwrap_err();
    assert!(matches!(err, vl::Error::FallbackCycle { .. }));
}

proptest! {
    #[test]
    fn defer_unless_splits_local_and_fallback(x in -1.0e6f64..1.0e6, local in any::<bool>()) {
        let mut set = VariationSet::new();
        let nominal = set.add(Variation::new("nominal", scaled()).with_param("scale", 1.0));
        let shifted = set.add(
            Variation::new("shifted", scaled())
                .with_param("scale", 2.0)
                .with_param("local", local)
                .with_fallback(nominal),
        );
        let mut src = MemorySource::single_field("x", [json!(x)]);
        let rec = vl::RecordSource::entry(&mut src, 0).unwrap().unwrap();
        set.bind_source(&rec);
        set.reset_all();

        let got = set.scope(shifted).unwrap().get_f64("value").unwrap();
        let expected = if local { x * 2.0 } else { x };
        prop_assert_eq!(got, expected);
        prop_assert_eq!(set.get(shifted).unwrap().is_cached("value"), local);
        prop_assert_eq!(set.get(nominal).unwrap().is_cached("value"), !local);
    }

    #[test]
    fn cut_counts_never_increase_along_the_chain(
        values in proptest::collection::vec((0u8..4, 0u8..4, 0u8..4), 0..50)
    ) {
        let records = values
            .iter()
            .map(|(a, b, c)| {
                let rec = json!({"a": a, "b": b, "c": c});
                vl::JsonRecord::try_from(rec).unwrap()
            })
            .collect();
        let mut src = MemorySource::new(records);
        let mut set = VariationSet::new();
        let nominal = set.add(Variation::new("nominal", Calculables::new()).with_process(|s| {
            s.cut_if(s.get_f64("a")? < 1.0, "a")?;
            s.cut_if(s.get_f64("b")? < 2.0, "b")?;
            s.cut_if(s.get_f64("c")? < 3.0, "c")
        }));

        vl::run(&mut src, &mut set, Some(nominal), &[], &RunOptions::default().silent()).unwrap();

        let cf = set.get(nominal).unwrap().cutflow().clone();
        prop_assert!(cf.count("a") >= cf.count("b"));
        prop_assert!(cf.count("b") >= cf.count("c"));
        let passing_a = values.iter().filter(|(a, _, _)| *a >= 1).count() as u64;
        prop_assert_eq!(cf.count("a"), passing_a);
    }
}
