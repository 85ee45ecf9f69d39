//! optiform CLI: search formulations for one problem, or run a JSONL dataset.
//!
//! Subcommands: `solve` (one problem), `batch` (dataset with resume), `summary`
//! (ER/SA table of a results file).

mod logging;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use futures::stream::{self, StreamExt};
use optiform::{Problem, SearchController, SearchEvent, SolveOutcome};
use optiform_cli::dataset::completed_ids;
use optiform_cli::settings::{load_search_config, APP_NAME};
use optiform_cli::{
    build_collaborators, load_tasks, read_results, render_table, select_pending, summarize,
    CliError, ModelSettings, ResultRecord, ResultWriter, SearchOverrides, SimilarityKind, Task,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "optiform")]
#[command(about = "optiform: LLM-guided tree search over optimization formulations")]
struct Args {
    #[command(subcommand)]
    cmd: Command,

    /// Chat model name
    #[arg(long, global = true, env = "OPTIFORM_MODEL", default_value = "gpt-4o-mini")]
    model: String,

    /// Iteration budget per problem (overrides [search] max_iterations)
    #[arg(long, global = true, value_name = "N")]
    iterations: Option<usize>,

    /// Re-expansion threshold η (overrides [search] reexpansion_threshold)
    #[arg(long, global = true, value_name = "ETA")]
    eta: Option<f64>,

    /// Python interpreter for solver scripts
    #[arg(long, global = true, env = "OPTIFORM_PYTHON", default_value = "python3")]
    python: PathBuf,

    /// How near-duplicate candidates are detected
    #[arg(long, global = true, value_enum, default_value_t = SimilarityKind::Sequence)]
    similarity: SimilarityKind,

    /// Embedding model for `--similarity embedding`
    #[arg(long, global = true, value_name = "MODEL", default_value = "text-embedding-3-small")]
    embedding_model: String,

    /// Offline model and executor (no API calls, no interpreter)
    #[arg(long, global = true)]
    mock: bool,

    /// Log to stderr (unless LOG_FILE is set)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search formulations for one problem
    Solve(SolveArgs),
    /// Run every problem of a JSONL dataset, appending to a results file
    Batch(BatchArgs),
    /// Print the ER/SA table of a results file
    Summary(SummaryArgs),
}

#[derive(clap::Args, Debug)]
struct SolveArgs {
    /// Problem text (or pass as positional args)
    #[arg(short, long, value_name = "TEXT", conflicts_with = "file")]
    message: Option<String>,

    /// Read the problem text from a file
    #[arg(long, value_name = "PATH")]
    file: Option<PathBuf>,

    /// Known optimal objective value; a match stops the search
    #[arg(long, value_name = "X", allow_negative_numbers = true)]
    answer: Option<f64>,

    /// Print the outcome as JSON
    #[arg(long)]
    json: bool,

    /// Print one JSON line per search event while running
    #[arg(long)]
    stream: bool,

    #[arg(trailing_var_arg = true)]
    rest: Vec<String>,
}

#[derive(clap::Args, Debug)]
struct BatchArgs {
    /// JSONL file with `question` and `answer` per line
    #[arg(long, value_name = "PATH")]
    dataset: PathBuf,

    /// Results file (appended; ids already present are skipped)
    #[arg(long, value_name = "PATH", default_value = "results.jsonl")]
    output: PathBuf,

    /// Run only problems whose `dataset` field matches NAME
    #[arg(long, value_name = "NAME")]
    only: Option<String>,

    /// Run at most N pending problems
    #[arg(long, value_name = "N")]
    limit: Option<usize>,

    /// Problems solved concurrently
    #[arg(long, value_name = "J", default_value_t = 1)]
    jobs: usize,
}

#[derive(clap::Args, Debug)]
struct SummaryArgs {
    #[arg(long, value_name = "PATH", default_value = "results.jsonl")]
    output: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let loaded = optiform_config::load_and_apply(APP_NAME, None::<&Path>);
    let args = Args::parse();
    logging::init(args.verbose)?;
    if let Err(e) = loaded {
        warn!(error = %e, "configuration not loaded");
        eprintln!("optiform: warning: configuration not loaded: {}", e);
    }

    if let Err(e) = run(args).await {
        eprintln!("optiform: {}", e);
        std::process::exit(1);
    }
    Ok(())
}

async fn run(args: Args) -> Result<(), CliError> {
    if let Command::Summary(sa) = &args.cmd {
        let records = read_results(&sa.output)?;
        print!("{}", render_table(&summarize(&records)));
        return Ok(());
    }

    let overrides = SearchOverrides {
        iterations: args.iterations,
        eta: args.eta,
    };
    let config = load_search_config(&overrides)?;
    let settings = ModelSettings {
        model: args.model.clone(),
        python: args.python.clone(),
        mock: args.mock,
        similarity: args.similarity,
        embedding_model: args.embedding_model.clone(),
    };
    let collaborators = build_collaborators(&settings, &config);
    let controller = SearchController::new(config, collaborators)?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted; finishing current iterations");
            on_signal.cancel();
        }
    });

    match args.cmd {
        Command::Solve(sa) => solve(controller, sa, &cancel).await,
        Command::Batch(ba) => batch(controller, ba, &cancel).await,
        Command::Summary(_) => Ok(()),
    }
}

fn problem_text(sa: &SolveArgs) -> Result<String, CliError> {
    if let Some(path) = &sa.file {
        return std::fs::read_to_string(path).map_err(|e| CliError::Io {
            path: path.clone(),
            source: e,
        });
    }
    let text = sa.message.clone().unwrap_or_else(|| sa.rest.join(" "));
    if text.trim().is_empty() {
        return Err(CliError::Usage(
            "provide a problem via -m/--message, --file or positional args".into(),
        ));
    }
    Ok(text)
}

async fn solve(controller: SearchController, sa: SolveArgs, cancel: &CancellationToken) -> Result<(), CliError> {
    let mut problem = Problem::new(problem_text(&sa)?);
    problem.ground_truth = sa.answer;

    let (controller, printer) = if sa.stream {
        let (tx, mut rx) = mpsc::channel::<SearchEvent>(64);
        let printer = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match serde_json::to_string(&event) {
                    Ok(line) => println!("{}", line),
                    Err(e) => warn!(error = %e, "failed to serialize event"),
                }
            }
        });
        (controller.with_events(tx), Some(printer))
    } else {
        (controller, None)
    };

    let outcome = controller.solve_with_cancel(&problem, cancel).await;
    drop(controller);
    if let Some(printer) = printer {
        let _ = printer.await;
    }

    if sa.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else if !sa.stream {
        print_outcome(&outcome);
    }
    Ok(())
}

fn print_outcome(outcome: &SolveOutcome) {
    println!(
        "status: {} ({}) | iterations: {} | tree: {} nodes, depth {}",
        if outcome.solved { "solved" } else { "unsolved" },
        outcome.stop_reason,
        outcome.iterations,
        outcome.tree_size,
        outcome.max_depth
    );
    match (&outcome.best_formulation, outcome.best_reward) {
        (Some(formulation), Some(reward)) => {
            println!("best reward: {:.3}", reward);
            match outcome.best_answer {
                Some(a) => println!("answer: {}", a),
                None => println!("answer: (none)"),
            }
            println!("executed: {}", outcome.executed);
            println!("\n{}", formulation.render());
        }
        _ => println!("no complete formulation was simulated"),
    }
}

fn record_for(task: &Task, outcome: &SolveOutcome, elapsed_ms: u64) -> ResultRecord {
    ResultRecord {
        id: task.id.clone(),
        dataset: task.dataset.clone(),
        expected: task.answer,
        predicted: outcome.best_answer,
        executed: outcome.executed,
        correct: outcome.solved,
        reward: outcome.best_reward,
        iterations: outcome.iterations,
        stop_reason: outcome.stop_reason.to_string(),
        elapsed_ms,
        formulation: outcome.best_formulation.as_ref().map(|f| f.render()),
    }
}

async fn batch(controller: SearchController, ba: BatchArgs, cancel: &CancellationToken) -> Result<(), CliError> {
    if ba.jobs == 0 {
        return Err(CliError::Usage("--jobs must be at least 1".into()));
    }
    let tasks = load_tasks(&ba.dataset)?;
    let done = completed_ids(&read_results(&ba.output)?);
    let pending = select_pending(tasks, &done, ba.only.as_deref(), ba.limit);
    let total = pending.len();
    if total == 0 {
        eprintln!("All problems already completed.");
    } else {
        eprintln!("Running {} problems (skipping {} already done)...", total, done.len());
    }

    let controller = Arc::new(controller);
    let mut writer = ResultWriter::open(&ba.output)?;
    let started = Instant::now();
    let mut results = stream::iter(pending)
        .map(|task| {
            let controller = Arc::clone(&controller);
            let cancel = cancel.clone();
            async move {
                let t0 = Instant::now();
                let problem = Problem {
                    text: task.question.clone(),
                    ground_truth: task.answer,
                };
                let outcome = controller.solve_with_cancel(&problem, &cancel).await;
                (task, outcome, t0.elapsed().as_millis() as u64)
            }
        })
        .buffer_unordered(ba.jobs);

    let mut finished = 0;
    while let Some((task, outcome, elapsed_ms)) = results.next().await {
        if outcome.stop_reason == optiform::StopReason::Cancelled {
            warn!(id = %task.id, "search cancelled; result not recorded");
            continue;
        }
        finished += 1;
        let record = record_for(&task, &outcome, elapsed_ms);
        writer.append(&record)?;
        let status = if record.correct {
            "CORRECT"
        } else if record.executed {
            "EXEC_OK"
        } else {
            "FAIL"
        };
        eprintln!(
            "[{}/{}] ({}) [{}] expected={:?} predicted={:?}",
            finished, total, status, task.id, record.expected, record.predicted
        );
        info!(id = %task.id, status, elapsed_ms, "problem done");
    }
    let secs = started.elapsed().as_secs_f64();
    if finished > 0 {
        eprintln!("elapsed={:.0}s, avg={:.1}s/problem", secs, secs / finished as f64);
    }

    let records = read_results(&ba.output)?;
    print!("{}", render_table(&summarize(&records)));
    Ok(())
}
