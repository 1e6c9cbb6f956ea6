#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! # gradewise
//!
//! Grades a student's JSON exam submission with a language model that checks
//! the rubric, the ground-truth answers and the course datasets before it
//! commits to a score.
//!
//! Set `OPENAI_API_KEY` (and optionally `OPENAI_ENDPOINT`, `OPENAI_MODEL`,
//! `OPENAI_TEMPERATURE`) in the environment or a `.env` file, then run
//! `gradewise grade --submission answers.json`.

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use bpaf::*;
use dotenvy::dotenv;
use gradewise::{config, llm::OpenAiModel, reference::DataLayout};
use tracing::{Level, info, metadata::LevelFilter};
use tracing_subscriber::{fmt, prelude::*, util::SubscriberInitExt};

/// How much to log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verbosity {
    /// Warnings and errors only.
    Quiet,
    /// Progress per question.
    Normal,
    /// Every tool call.
    Verbose,
}

impl Verbosity {
    /// Log level for this verbosity.
    fn level(self) -> Level {
        match self {
            Self::Quiet => Level::WARN,
            Self::Normal => Level::INFO,
            Self::Verbose => Level::DEBUG,
        }
    }
}

/// Arguments of `gradewise grade`.
#[derive(Debug, Clone)]
struct GradeArgs {
    /// Submission to grade.
    submission:  PathBuf,
    /// Directory holding the exam, rubric, ground truth and datasets.
    data_dir:    PathBuf,
    /// Model override.
    model:       Option<String>,
    /// Temperature override.
    temperature: Option<f32>,
    /// Where to write the JSON report; stdout when absent.
    output:      Option<PathBuf>,
    /// Grade only the first N answers.
    limit:       Option<usize>,
    /// Questions graded at once.
    concurrency: Option<usize>,
    /// Tool-call rounds per question.
    max_rounds:  Option<usize>,
    /// Log level.
    verbosity:   Verbosity,
    /// Skip the summary table.
    no_table:    bool,
}

/// Top-level CLI commands.
#[derive(Debug, Clone)]
enum Cmd {
    /// Grade a submission
    Grade(GradeArgs),
    /// Validate inputs without calling the model
    Check(PathBuf, PathBuf),
}

/// Parse the command line arguments and return a `Cmd` enum
fn options() -> Cmd {
    /// parses the submission path
    fn s() -> impl Parser<PathBuf> {
        long("submission")
            .short('s')
            .help("Path to the student's submission JSON")
            .argument::<PathBuf>("PATH")
    }

    /// parses the data directory
    fn d() -> impl Parser<PathBuf> {
        long("data-dir")
            .short('d')
            .help("Directory with test.json, class_resources/ and datasets/")
            .argument::<PathBuf>("DIR")
            .fallback(PathBuf::from("data"))
    }

    let submission = s();
    let data_dir = d();
    let model = long("model")
        .short('m')
        .help("Model to grade with (default: OPENAI_MODEL or gpt-4o)")
        .argument::<String>("MODEL")
        .optional();
    let temperature = long("temperature")
        .short('t')
        .help("Sampling temperature (default: 0.1)")
        .argument::<f32>("TEMP")
        .optional();
    let output = long("output")
        .short('o')
        .help("Write the JSON report here instead of stdout")
        .argument::<PathBuf>("PATH")
        .optional();
    let limit = long("limit")
        .help("Grade only the first N answers")
        .argument::<usize>("N")
        .optional();
    let concurrency = long("concurrency")
        .help("Questions graded at the same time (default: 4)")
        .argument::<usize>("N")
        .optional();
    let max_rounds = long("max-rounds")
        .help("Tool-call rounds allowed per question (default: 8)")
        .argument::<usize>("N")
        .optional();
    let verbose = long("verbose")
        .short('v')
        .help("Log every tool call")
        .req_flag(Verbosity::Verbose);
    let quiet = long("quiet")
        .short('q')
        .help("Log warnings only")
        .req_flag(Verbosity::Quiet);
    let verbosity = construct!([verbose, quiet]).fallback(Verbosity::Normal);
    let no_table = long("no-table")
        .help("Do not print the summary table")
        .switch();

    let grade = construct!(GradeArgs {
        submission,
        data_dir,
        model,
        temperature,
        output,
        limit,
        concurrency,
        max_rounds,
        verbosity,
        no_table,
    })
    .map(Cmd::Grade)
    .to_options()
    .command("grade")
    .help("Grade a submission");

    let check = construct!(Cmd::Check(s(), d()))
        .to_options()
        .command("check")
        .help("Load and validate every input without calling the model");

    construct!([grade, check])
        .to_options()
        .descr("Tool-resolving LLM exam grader")
        .run()
}

/// Installs the log subscriber.
fn init_tracing(verbosity: Verbosity) {
    let fmt = fmt::layer()
        .with_writer(std::io::stderr)
        .without_time()
        .with_file(false)
        .with_line_number(false);
    let filter_layer = LevelFilter::from_level(verbosity.level());
    tracing_subscriber::registry()
        .with(fmt)
        .with(filter_layer)
        .init();
}

/// Runs `gradewise grade`.
async fn grade(args: GradeArgs) -> Result<()> {
    let cfg = config::get();
    let openai = cfg
        .openai()
        .context("OPENAI_API_KEY must be set (in the environment or .env) to grade")?;
    let settings = cfg.settings().with_overrides(
        args.model,
        args.temperature,
        args.concurrency,
        args.max_rounds,
    );
    let model = Arc::new(OpenAiModel::new(openai, settings.model()));

    let report = gradewise::run(
        &args.submission,
        DataLayout::new(&args.data_dir),
        model,
        settings,
        args.limit,
    )
    .await?;

    if !args.no_table {
        eprintln!("{}", report.render_table());
    }

    let json = report.to_json().context("Failed to serialize report")?;
    match args.output {
        Some(path) => {
            std::fs::write(&path, json)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            info!(path = %path.display(), "report written");
        }
        None => println!("{json}"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let cmd = options();
    let verbosity = match &cmd {
        Cmd::Grade(args) => args.verbosity,
        Cmd::Check(..) => Verbosity::Normal,
    };
    init_tracing(verbosity);

    match cmd {
        Cmd::Grade(args) => grade(args).await?,
        Cmd::Check(submission, data_dir) => {
            let findings = gradewise::check(&submission, DataLayout::new(&data_dir))?;
            if findings.is_empty() {
                eprintln!("All inputs are consistent.");
            } else {
                for finding in &findings {
                    eprintln!("- {finding}");
                }
            }
        }
    };

    Ok(())
}
