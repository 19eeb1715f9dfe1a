//! basingraph: batch runs and point queries over an N-link snapshot.
//!
//! Exit codes: 0 on completion, 2 on input validation failure, 3 on
//! unrecoverable I/O, 4 on cancellation, 1 otherwise.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use basin_api::{Engine, TraceTerminal};
use basin_common::{BasinError, BasinResult, CancelFlag, EngineConfig, PageId};
use basin_coord::{Controller, CycleSelection, RunPlan};
use basin_sink::OutputFormat;
use basin_snapshot::SnapshotLoader;

const USAGE: &str = "\
basingraph — N-link functional-graph basin analysis

USAGE:
  basingraph batch  --pages <FILE> --links <FILE> --out <DIR> [OPTIONS]
  basingraph trace  --pages <FILE> --links <FILE> --page <ID> --n <N[,N...]> [--max-steps <K>]
  basingraph cycles --pages <FILE> --links <FILE> --n <N>
  basingraph chain  --pages <FILE> --links <FILE> --page <CYCLE_ID> --n <N> [--seed <ID>]

BATCH OPTIONS:
  --n <SPEC>          N values: a list '3,4,5' or a range '3..10' (default 3..10)
  --top-cycles <K>    materialize the K largest basins per N (default 8)
  --cycles <IDS>      materialize these cycle page ids instead
  --no-branches       skip branch decomposition
  --format <F>        parquet (default) or tsv
  --resume            skip N values with valid existing artifacts
  --threads <T>       worker threads (default: CPU count)
  --budget <B>        per-basin node budget (default: unbounded)
";

struct CliArgs {
    command: String,
    pages: Option<PathBuf>,
    links: Option<PathBuf>,
    out: Option<PathBuf>,
    n_spec: Option<String>,
    top_cycles: Option<usize>,
    cycles: Option<Vec<i64>>,
    no_branches: bool,
    format: OutputFormat,
    resume: bool,
    threads: Option<usize>,
    budget: Option<u64>,
    page: Option<i64>,
    seed: Option<i64>,
    max_steps: Option<u32>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let cli = match parse_args(&args) {
        Ok(cli) => cli,
        Err(msg) => {
            eprintln!("Error: {msg}\n\n{USAGE}");
            return ExitCode::from(1);
        }
    };

    let result = match cli.command.as_str() {
        "batch" => run_batch(&cli),
        "trace" => run_trace(&cli),
        "cycles" => run_cycles(&cli),
        "chain" => run_chain(&cli),
        other => {
            eprintln!("Error: unknown command '{other}'\n\n{USAGE}");
            return ExitCode::from(1);
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

fn parse_args(args: &[String]) -> Result<CliArgs, String> {
    let mut cli = CliArgs {
        command: args.get(1).cloned().ok_or("missing command")?,
        pages: None,
        links: None,
        out: None,
        n_spec: None,
        top_cycles: None,
        cycles: None,
        no_branches: false,
        format: OutputFormat::Parquet,
        resume: false,
        threads: None,
        budget: None,
        page: None,
        seed: None,
        max_steps: None,
    };

    let mut i = 2;
    while i < args.len() {
        let arg = args[i].as_str();
        let value = |i: &mut usize| -> Result<String, String> {
            *i += 1;
            args.get(*i)
                .cloned()
                .ok_or_else(|| format!("{arg} requires a value"))
        };
        match arg {
            "--pages" => cli.pages = Some(PathBuf::from(value(&mut i)?)),
            "--links" => cli.links = Some(PathBuf::from(value(&mut i)?)),
            "--out" => cli.out = Some(PathBuf::from(value(&mut i)?)),
            "--n" => cli.n_spec = Some(value(&mut i)?),
            "--top-cycles" => {
                cli.top_cycles = Some(
                    value(&mut i)?
                        .parse()
                        .map_err(|e| format!("bad --top-cycles: {e}"))?,
                )
            }
            "--cycles" => {
                let list = value(&mut i)?;
                let ids: Result<Vec<i64>, _> =
                    list.split(',').map(|s| s.trim().parse::<i64>()).collect();
                cli.cycles = Some(ids.map_err(|e| format!("bad --cycles: {e}"))?);
            }
            "--no-branches" => cli.no_branches = true,
            "--format" => {
                cli.format = match value(&mut i)?.as_str() {
                    "parquet" => OutputFormat::Parquet,
                    "tsv" => OutputFormat::Tsv,
                    other => return Err(format!("unknown format '{other}'")),
                }
            }
            "--resume" => cli.resume = true,
            "--threads" => {
                cli.threads = Some(
                    value(&mut i)?
                        .parse()
                        .map_err(|e| format!("bad --threads: {e}"))?,
                )
            }
            "--budget" => {
                cli.budget = Some(
                    value(&mut i)?
                        .parse()
                        .map_err(|e| format!("bad --budget: {e}"))?,
                )
            }
            "--page" => {
                cli.page = Some(
                    value(&mut i)?
                        .parse()
                        .map_err(|e| format!("bad --page: {e}"))?,
                )
            }
            "--seed" => {
                cli.seed = Some(
                    value(&mut i)?
                        .parse()
                        .map_err(|e| format!("bad --seed: {e}"))?,
                )
            }
            "--max-steps" => {
                cli.max_steps = Some(
                    value(&mut i)?
                        .parse()
                        .map_err(|e| format!("bad --max-steps: {e}"))?,
                )
            }
            other => return Err(format!("unknown option '{other}'")),
        }
        i += 1;
    }
    Ok(cli)
}

/// Parse an N spec: '5', '3,4,5', or '3..10' (inclusive).
fn parse_n_set(spec: &str) -> Result<Vec<u32>, String> {
    if let Some((lo, hi)) = spec.split_once("..") {
        let lo: u32 = lo.trim().parse().map_err(|e| format!("bad N range: {e}"))?;
        let hi: u32 = hi.trim().parse().map_err(|e| format!("bad N range: {e}"))?;
        if lo < 1 || hi < lo {
            return Err(format!("bad N range '{spec}'"));
        }
        return Ok((lo..=hi).collect());
    }
    spec.split(',')
        .map(|s| s.trim().parse::<u32>().map_err(|e| format!("bad N: {e}")))
        .collect()
}

fn require<T: Clone>(opt: &Option<T>, name: &str) -> BasinResult<T> {
    opt.clone()
        .ok_or_else(|| BasinError::Internal(format!("missing required option {name}")))
}

fn engine_config(cli: &CliArgs) -> EngineConfig {
    let mut config = EngineConfig::default();
    if let Some(threads) = cli.threads {
        config.worker_threads = threads.max(1);
    }
    config.basin_node_budget = cli.budget;
    config
}

fn run_batch(cli: &CliArgs) -> BasinResult<()> {
    let pages = require(&cli.pages, "--pages")?;
    let links = require(&cli.links, "--links")?;
    let out_dir = require(&cli.out, "--out")?;

    let n_set = parse_n_set(cli.n_spec.as_deref().unwrap_or("3..10"))
        .map_err(BasinError::Internal)?;
    let selection = match &cli.cycles {
        Some(ids) => CycleSelection::Pages(ids.clone()),
        None => CycleSelection::TopBySize(cli.top_cycles.unwrap_or(8)),
    };

    let cancel = CancelFlag::new();
    let snapshot = Arc::new(SnapshotLoader::new(pages, links).load(&cancel)?);
    tracing::info!(
        nodes = snapshot.graph.num_nodes(),
        edges = snapshot.graph.num_edges(),
        "snapshot ready"
    );

    let plan = RunPlan {
        n_set,
        selection,
        decompose_branches: !cli.no_branches,
        out_dir,
        format: cli.format,
        resume: cli.resume,
    };
    let controller = Controller::new(snapshot, engine_config(cli), cancel);
    let summary = controller.run(&plan)?;
    tracing::info!(
        computed = ?summary.layers_computed,
        restored = ?summary.layers_restored,
        failed = ?summary.layers_failed,
        basins = summary.basins_materialized,
        truncated = summary.basins_truncated,
        "run complete"
    );
    Ok(())
}

fn run_trace(cli: &CliArgs) -> BasinResult<()> {
    let pages = require(&cli.pages, "--pages")?;
    let links = require(&cli.links, "--links")?;
    let page = PageId(require(&cli.page, "--page")?);
    let n_set = parse_n_set(cli.n_spec.as_deref().unwrap_or("3..10"))
        .map_err(BasinError::Internal)?;

    let engine = Engine::open(&pages, &links, engine_config(cli))?;

    if n_set.len() == 1 {
        let trace = engine.trace(page, n_set[0], cli.max_steps)?;
        let path: Vec<String> = trace
            .path
            .iter()
            .map(|p| {
                engine
                    .snapshot()
                    .nodes
                    .node_for_page(*p)
                    .map(|node| engine.snapshot().nodes.title(node).to_string())
                    .unwrap_or_else(|| p.to_string())
            })
            .collect();
        println!("path: {}", path.join(" -> "));
        println!("steps: {}", trace.steps);
        match trace.terminal {
            TraceTerminal::Cycle { cycle_id, length } => {
                println!("terminal: cycle {cycle_id} (length {length})")
            }
            TraceTerminal::Halt => println!("terminal: HALT"),
        }
        return Ok(());
    }

    println!("{:>3} | {:<8} | {:>5} | {:>9} | cycle", "N", "kind", "steps", "cycle len");
    for entry in engine.trace_across(page, &n_set)? {
        match entry.terminal {
            TraceTerminal::Cycle { cycle_id, length } => {
                let members: Vec<String> = entry
                    .cycle_members
                    .iter()
                    .take(3)
                    .map(|p| p.to_string())
                    .collect();
                println!(
                    "{:>3} | {:<8} | {:>5} | {:>9} | {} [{}]",
                    entry.n,
                    "cycle",
                    entry.steps,
                    length,
                    cycle_id,
                    members.join(" -> ")
                );
            }
            TraceTerminal::Halt => {
                println!("{:>3} | {:<8} | {:>5} | {:>9} | -", entry.n, "halt", entry.steps, 0)
            }
        }
    }
    Ok(())
}

fn run_cycles(cli: &CliArgs) -> BasinResult<()> {
    let pages = require(&cli.pages, "--pages")?;
    let links = require(&cli.links, "--links")?;
    let spec = cli
        .n_spec
        .as_deref()
        .ok_or_else(|| BasinError::Internal("missing required option --n".into()))?;
    let n_set = parse_n_set(spec).map_err(BasinError::Internal)?;

    let engine = Engine::open(&pages, &links, engine_config(cli))?;
    for &n in &n_set {
        let cycles = engine.cycles(n)?;
        println!("N={n}: {} cycles", cycles.len());
        for (cycle_id, length) in cycles {
            let title = engine
                .snapshot()
                .nodes
                .node_for_page(cycle_id)
                .map(|node| engine.snapshot().nodes.title(node).to_string())
                .unwrap_or_default();
            println!("  cycle {cycle_id} (length {length}) {title}");
        }
    }
    Ok(())
}

fn run_chain(cli: &CliArgs) -> BasinResult<()> {
    let pages = require(&cli.pages, "--pages")?;
    let links = require(&cli.links, "--links")?;
    let cycle_page = PageId(require(&cli.page, "--page")?);
    let spec = cli
        .n_spec
        .as_deref()
        .ok_or_else(|| BasinError::Internal("missing required option --n".into()))?;
    let n_set = parse_n_set(spec).map_err(BasinError::Internal)?;
    let n = *n_set
        .first()
        .ok_or_else(|| BasinError::Internal("empty N set".into()))?;

    let engine = Engine::open(&pages, &links, engine_config(cli))?;
    let chain = engine.source_chain(n, cycle_page, cli.seed.map(PageId))?;
    println!("{:>12} | {:>12} | {:>9} | title", "page_id", "subtree", "dominance");
    for step in chain {
        let title = engine
            .snapshot()
            .nodes
            .node_for_page(step.page)
            .map(|node| engine.snapshot().nodes.title(node).to_string())
            .unwrap_or_default();
        println!(
            "{:>12} | {:>12} | {:>9.3} | {title}",
            step.page, step.subtree_size, step.dominance
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        std::iter::once("basingraph".to_string())
            .chain(parts.iter().map(|s| s.to_string()))
            .collect()
    }

    #[test]
    fn parse_batch_args() {
        let args = argv(&[
            "batch", "--pages", "p.parquet", "--links", "l.parquet", "--out", "out",
            "--n", "3..5", "--top-cycles", "4", "--format", "tsv", "--resume",
        ]);
        let cli = parse_args(&args).unwrap();
        assert_eq!(cli.command, "batch");
        assert_eq!(cli.top_cycles, Some(4));
        assert_eq!(cli.format, OutputFormat::Tsv);
        assert!(cli.resume);
    }

    #[test]
    fn parse_n_specs() {
        assert_eq!(parse_n_set("5").unwrap(), vec![5]);
        assert_eq!(parse_n_set("3,4,5").unwrap(), vec![3, 4, 5]);
        assert_eq!(parse_n_set("3..6").unwrap(), vec![3, 4, 5, 6]);
        assert!(parse_n_set("0..3").is_err());
        assert!(parse_n_set("x").is_err());
    }

    #[test]
    fn parse_cycle_list() {
        let args = argv(&["batch", "--cycles", "100, 200,300"]);
        let cli = parse_args(&args).unwrap();
        assert_eq!(cli.cycles, Some(vec![100, 200, 300]));
    }

    #[test]
    fn max_steps_defaults_to_engine_config() {
        let args = argv(&["trace", "--page", "100", "--n", "5"]);
        let cli = parse_args(&args).unwrap();
        assert_eq!(cli.max_steps, None);

        let args = argv(&["trace", "--page", "100", "--n", "5", "--max-steps", "20"]);
        let cli = parse_args(&args).unwrap();
        assert_eq!(cli.max_steps, Some(20));
    }

    #[test]
    fn missing_value_rejected() {
        let args = argv(&["batch", "--pages"]);
        assert!(parse_args(&args).is_err());
    }

    #[test]
    fn unknown_option_rejected() {
        let args = argv(&["batch", "--bogus"]);
        assert!(parse_args(&args).is_err());
    }
}
