use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use clap::Parser;
use serde::Serialize;
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;
use variation_loop::{
    run, Calculables, CutFlow, Halt, MemorySource, RowSink, RunOptions, Scope, SharedRows,
    Variation, VariationSet,
};

/// Runs the muon/MET example analysis with a few systematic variations.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON file holding an array of records (`mu_n`, `mu_pt`, `jet_n`, `met_et`).
    input: String,
    /// Stop after roughly this many records.
    #[arg(long)]
    entry_limit: Option<usize>,
    /// Records between progress reports.
    #[arg(long, default_value_t = 5000)]
    status_interval: usize,
    /// No progress reports.
    #[arg(long)]
    silent: bool,
    /// Print cutflows as JSON.
    #[arg(long)]
    json: bool,
    /// Also print every variation's output rows.
    #[arg(long)]
    rows: bool,
    /// Log filter, e.g. `info` or `variation_loop=trace`.
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// How often each calculable body actually ran.
#[derive(Clone, Default)]
struct CalcStats(Rc<RefCell<BTreeMap<&'static str, u64>>>);

impl CalcStats {
    fn report(&self, name: &'static str) {
        *self.0.borrow_mut().entry(name).or_default() += 1;
    }
}

fn calculables(stats: &CalcStats) -> Calculables {
    let mut calcs = Calculables::new();

    let st = stats.clone();
    calcs.register("n_muons", move |s| {
        s.defer()?;
        st.report("n_muons");
        s.get("mu_n").map_err(Into::into)
    });

    let st = stats.clone();
    calcs.register("n_hard_muons", move |s| {
        let shift = s.param_f64("mu_shift");
        s.defer_unless(shift > 0.0)?;
        st.report("n_hard_muons");
        let pts: Vec<f64> = s.get_as("mu_pt")?;
        Ok(json!(pts.iter().filter(|pt| *pt + shift > 65.0).count()))
    });

    let st = stats.clone();
    calcs.register("n_jets", move |s| {
        s.defer()?;
        st.report("n_jets");
        s.get("jet_n").map_err(Into::into)
    });

    // additive MET shift stands in for random smearing
    let st = stats.clone();
    calcs.register("met_shifted", move |s| {
        let shift = s.param_f64("met_shift");
        s.defer_if(shift == 0.0)?;
        st.report("met_shifted");
        Ok(json!(s.get_f64("met_et")? + shift))
    });

    calcs
}

fn analysis_cutflow(v: &Scope<'_>) -> Result<(), Halt> {
    v.cut_if(v.get_f64("n_muons")? < 2.0, "2muons")?;
    v.cut_if(v.get_f64("n_hard_muons")? < 1.0, "hardmu")?;
    v.cut_if(v.get_f64("met_shifted")? < 80.0, "met80")
}

fn jet_cr_cutflow(v: &Scope<'_>) -> Result<(), Halt> {
    analysis_cutflow(v)?;
    v.cut_if(v.get_f64("n_jets")? < 3.0, "3jets")
}

/// Writes only what differs from nominal, unless there is no nominal to read it from.
fn output_sink() -> RowSink {
    RowSink::new().with_populate(|s, row| {
        let force = !s.can_defer();
        if force {
            row.insert("n_jets".into(), s.read("n_jets")?);
        }
        if force || s.param_f64("mu_shift") > 0.0 {
            row.insert("n_hard_muons".into(), s.read("n_hard_muons")?);
        }
        if force || s.param_f64("met_shift") != 0.0 {
            row.insert("met".into(), s.read("met_shifted")?);
        }
        Ok(())
    })
}

#[derive(Serialize)]
struct Report {
    variation: String,
    cutflow: CutFlow,
    #[serde(skip_serializing_if = "Option::is_none")]
    rows: Option<Vec<Value>>,
}

fn main() {
    // Parse CLI arguments.
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&args.log_level))
        .with_writer(std::io::stderr)
        .init();

    let input = match std::fs::read_to_string(&args.input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Cannot read {}: {e}", args.input);
            std::process::exit(1);
        }
    };
    let mut source = match MemorySource::from_json(&input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Invalid input: {e}");
            std::process::exit(1);
        }
    };

    // Build options.
    let mut opts = RunOptions::default().with_status_interval(args.status_interval);
    opts.entry_limit = args.entry_limit;
    opts.silent = args.silent;

    let stats = CalcStats::default();
    let calcs = calculables(&stats);
    let mut set = VariationSet::new();
    let mut outputs: Vec<(variation_loop::VariationId, SharedRows)> = Vec::new();

    let mut add = |set: &mut VariationSet, v: Variation| {
        let sink = output_sink();
        let rows = sink.rows();
        let id = set.add(v.with_sink(sink));
        outputs.push((id, rows));
        id
    };

    let nominal = add(&mut set, Variation::new("nominal", calcs.clone()).with_process(analysis_cutflow));
    let variations = [
        add(
            &mut set,
            Variation::new("shift muon pt", calcs.clone())
                .with_param("mu_shift", 25.0)
                .with_process(analysis_cutflow),
        ),
        add(
            &mut set,
            Variation::new("shifted met", calcs.clone())
                .with_param("met_shift", 20.0)
                .with_process(analysis_cutflow),
        ),
        add(
            &mut set,
            Variation::new("jets CR", calcs).with_process(jet_cr_cutflow),
        ),
    ];

    let summary = match run(&mut source, &mut set, Some(nominal), &variations, &opts) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Run failed: {e}");
            std::process::exit(1);
        }
    };

    let reports: Vec<Report> = outputs
        .iter()
        .filter_map(|(id, rows)| {
            let v = set.get(*id).ok()?;
            Some(Report {
                variation: v.name().to_string(),
                cutflow: v.cutflow().clone(),
                rows: args
                    .rows
                    .then(|| rows.borrow().iter().cloned().map(Value::Object).collect()),
            })
        })
        .collect();

    if args.json {
        let out = json!({
            "processed": summary.processed,
            "kept": summary.kept,
            "calculations": stats.0.borrow().clone(),
        });
        match serde_json::to_string_pretty(&(out, &reports)) {
            Ok(s) => println!("{s}"),
            Err(e) => {
                eprintln!("Cannot encode report: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    println!("processed {} records, kept {}", summary.processed, summary.kept);
    for r in &reports {
        println!("==== Cutflow: {} ====", r.variation);
        println!("{}", r.cutflow);
        if let Some(rows) = &r.rows {
            for row in rows {
                println!("{row}");
            }
        }
        println!();
    }
    println!(">>>> Calculation stats: <<<<");
    for (name, count) in stats.0.borrow().iter() {
        println!("{name}:\t{count}");
    }
}
