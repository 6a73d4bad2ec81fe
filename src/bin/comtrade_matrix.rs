use std::process::ExitCode;

use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use comtrade_matrix::app::{App, ProgressSink, RunResult};
use comtrade_matrix::comtrade::{ComtradeHttpClient, DEFAULT_BASE_URL};
use comtrade_matrix::config::{ConfigLoader, RunConfig};
use comtrade_matrix::domain::Frequency;
use comtrade_matrix::error::MatrixError;
use comtrade_matrix::failure_log::CsvFailureLog;
use comtrade_matrix::output::{JsonOutput, OutputMode, PlanReport, StderrProgress};
use comtrade_matrix::reference::{CsvReferenceLoader, ReferenceLoader};
use comtrade_matrix::writer::MatrixWriter;

#[derive(Parser)]
#[command(name = "comtrade-matrix")]
#[command(about = "Build reporter-by-partner trade matrices from UN Comtrade")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Download every configured commodity and write one matrix per period")]
    Run(RunArgs),
    #[command(about = "Show which country-years would be fetched annually or monthly")]
    Availability(AvailabilityArgs),
}

#[derive(Args, Clone)]
struct SourceArgs {
    #[arg(long)]
    config: Option<String>,

    #[arg(long, default_value = "country_codes.csv")]
    crosswalk: Utf8PathBuf,

    #[arg(long, default_value = DEFAULT_BASE_URL)]
    base_url: String,
}

#[derive(Args, Clone)]
struct RunArgs {
    #[command(flatten)]
    source: SourceArgs,

    #[arg(long, default_value = "data")]
    out: Utf8PathBuf,

    #[arg(long, default_value = "log.csv")]
    log: Utf8PathBuf,
}

#[derive(Args, Clone)]
struct AvailabilityArgs {
    #[command(flatten)]
    source: SourceArgs,

    #[arg(long)]
    resolution: Option<Frequency>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<MatrixError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &MatrixError) -> u8 {
    match error {
        MatrixError::MissingConfig
        | MatrixError::ConfigRead(_)
        | MatrixError::ConfigParse(_)
        | MatrixError::InvalidResolution(_)
        | MatrixError::InvalidBatchSize(_)
        | MatrixError::InvalidYearRange { .. }
        | MatrixError::InvalidYear(_)
        | MatrixError::InvalidCommodity(_)
        | MatrixError::Reference(_) => 2,
        MatrixError::ComtradeHttp(_)
        | MatrixError::ComtradeStatus { .. }
        | MatrixError::ComtradeParse(_) => 3,
        MatrixError::Reconciliation(_) => 4,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    match cli.command {
        Commands::Run(args) => run_pipeline(args, output_mode),
        Commands::Availability(args) => run_availability(args, output_mode),
    }
}

fn load_config(path: Option<&str>) -> Result<RunConfig, MatrixError> {
    let mut config = ConfigLoader::resolve(path)?;
    if config.credential.is_none() {
        config.credential = std::env::var("COMTRADE_TOKEN")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
    }
    Ok(config)
}

fn progress_sink(output_mode: OutputMode) -> Box<dyn ProgressSink> {
    match output_mode {
        OutputMode::Interactive => Box::new(StderrProgress),
        OutputMode::NonInteractive => Box::new(JsonOutput),
    }
}

fn run_pipeline(args: RunArgs, output_mode: OutputMode) -> miette::Result<()> {
    let config = load_config(args.source.config.as_deref())?;
    let countries = CsvReferenceLoader::new(args.source.crosswalk.clone()).load(config.start_year)?;
    let client = ComtradeHttpClient::with_base_url(&args.source.base_url)?;
    let app = App::new(client, MatrixWriter::new(args.out));
    let mut log = CsvFailureLog::open(&args.log)?;
    let sink = progress_sink(output_mode);

    let result = app.run(&config, &countries, &mut log, sink.as_ref())?;
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_run(&result).into_diagnostic()?,
        OutputMode::Interactive => print_run_summary(&result, &args.log),
    }
    Ok(())
}

fn run_availability(args: AvailabilityArgs, output_mode: OutputMode) -> miette::Result<()> {
    let mut config = load_config(args.source.config.as_deref())?;
    if let Some(resolution) = args.resolution {
        config.temporal_resolution = resolution;
    }
    let countries = CsvReferenceLoader::new(args.source.crosswalk.clone()).load(config.start_year)?;
    let client = ComtradeHttpClient::with_base_url(&args.source.base_url)?;
    let app = App::new(client, MatrixWriter::new("."));
    let sink = progress_sink(output_mode);

    let plan = app.plan(&config, &countries, sink.as_ref())?;
    JsonOutput::print_plan(&PlanReport::new(&plan)).into_diagnostic()?;
    Ok(())
}

fn print_run_summary(result: &RunResult, log_path: &Utf8Path) {
    println!(
        "availability: annual={} monthly={} no_data={}",
        result.plan.annual, result.plan.monthly, result.plan.no_data
    );
    for item in &result.commodities {
        println!(
            "{}: {} files, {} records, {} requests ({} failed, {} empty)",
            item.commodity,
            item.files.len(),
            item.records,
            item.requests,
            item.failed_batches,
            item.empty_batches
        );
    }
    println!("log: {log_path}");
}
