use std::cell::{Cell, RefCell};
use std::rc::Rc;

use pretty_assertions::assert_eq;
use serde_json::json;
use variation_loop as vl;
use vl::{Calculables, MemorySource, RowSink, RunOptions, Variation, VariationSet};

fn quiet() -> RunOptions {
    RunOptions::default().silent()
}

#[test]
fn single_cut_over_three_records() {
    let mut set = VariationSet::new();
    let sink = RowSink::new().with_populate(|s, row| {
        row.insert("n".into(), s.read("n")?);
        Ok(())
    });
    let rows = sink.rows();
    let nominal = set.add(
        Variation::new("nominal", Calculables::new())
            .with_process(|s| s.cut_if(s.get_f64("n")? < 2.0, "min2"))
            .with_sink(sink),
    );
    let mut src = MemorySource::single_field("n", [json!(1), json!(3), json!(2)]);

    let summary = vl::run(&mut src, &mut set, Some(nominal), &[], &quiet()).unwrap();

    let v = set.get(nominal).unwrap();
    assert_eq!(v.cutflow().names(), ["min2"]);
    assert_eq!(v.cutflow().count("min2"), 2);
    assert_eq!(summary, vl::RunSummary { processed: 3, kept: 2 });
    // the first record was kept by nobody, so nothing was written for it
    assert_eq!(
        *rows.borrow(),
        vec![
            json!({"n": 3, "_valid": true}).as_object().unwrap().clone(),
            json!({"n": 2, "_valid": true}).as_object().unwrap().clone(),
        ]
    );
}

#[test]
fn entry_limit_stops_at_status_boundary() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = seen.clone();
    let mut set = VariationSet::new();
    let nominal = set.add(Variation::new("nominal", Calculables::new()).with_process(move |s| {
        log.borrow_mut().push(s.get("n")?);
        Ok(())
    }));
    let mut src = MemorySource::single_field("n", (0..10).map(|i| json!(i)));
    let opts = quiet().with_entry_limit(2).with_status_interval(1);

    let summary = vl::run(&mut src, &mut set, Some(nominal), &[], &opts).unwrap();

    assert_eq!(summary.processed, 2);
    assert_eq!(*seen.borrow(), vec![json!(0), json!(1)]);
}

#[test]
fn entry_limit_rounds_up_to_interval() {
    let mut set = VariationSet::new();
    let nominal = set.add(Variation::new("nominal", Calculables::new()).with_process(|_| Ok(())));
    let mut src = MemorySource::single_field("n", (0..10).map(|i| json!(i)));
    let opts = quiet().with_entry_limit(2).with_status_interval(4);

    let summary = vl::run(&mut src, &mut set, Some(nominal), &[], &opts).unwrap();
    assert_eq!(summary.processed, 4);
}

fn reads(s: &vl::Scope<'_>) -> Result<(), vl::Halt> {
    for _ in 0..3 {
        assert_eq!(s.get_f64("met")?, 100.0);
    }
    Ok(())
}

#[test]
fn deferred_met_is_computed_once_by_nominal() {
    let calls = Rc::new(Cell::new(0u32));
    let per_record = Rc::new(RefCell::new(Vec::new()));

    let counter = calls.clone();
    let calcs = Calculables::new().with("met", move |s| {
        s.defer()?;
        counter.set(counter.get() + 1);
        Ok(s.get("met_et")?)
    });

    let mut set = VariationSet::new();
    let nominal = set.add(Variation::new("nominal", calcs.clone()).with_process(reads));
    let snapshot = (calls.clone(), per_record.clone());
    let shifted = set.add(Variation::new("shifted", calcs).with_process(move |s| {
        reads(s)?;
        snapshot.1.borrow_mut().push(snapshot.0.get());
        Ok(())
    }));
    let mut src = MemorySource::single_field("met_et", [json!(100.0), json!(100.0), json!(100.0)]);

    vl::run(&mut src, &mut set, Some(nominal), &[shifted], &quiet()).unwrap();

    // shifted runs before nominal, so it triggers each record's single computation
    assert_eq!(*per_record.borrow(), vec![1, 2, 3]);
    assert_eq!(calls.get(), 3);
    assert_eq!(set.get(shifted).unwrap().fallback(), Some(nominal));
}
