//! moodlens-analyzer - terminal front end for the analysis pipeline
//!
//! Submits one image for analysis, prints progress as it streams, then the
//! report or the failure with its recovery options. Ctrl-C cancels the job.

use anyhow::Result;
use clap::Parser;
use moodlens_analyzer::config::{AnalyzerConfig, ConfigOverrides};
use moodlens_analyzer::transport::{HttpTransport, ReplayTransport, Transport};
use moodlens_analyzer::{
    AnalysisClient, AnalysisFailure, AnalysisMode, AdmissionQueue, CanonicalReport, ClientSettings,
    FailureReport, SubmitOptions,
};
use moodlens_common::config::{default_config_path, load_toml_config_or_default};
use moodlens_common::events::EventBus;
use moodlens_common::logging::init_tracing;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};

const EXIT_FAILED: u8 = 1;
const EXIT_CANCELLED: u8 = 130;

#[derive(Debug, Parser)]
#[command(name = "moodlens-analyzer", version, about = "Analyze the mood of an image")]
struct Args {
    /// Image to analyze
    image_url: String,

    /// Analysis provider (cloud or local)
    #[arg(long)]
    mode: Option<AnalysisMode>,

    /// Analysis endpoint
    #[arg(long)]
    service_url: Option<String>,

    /// Delay before the automatic retry of a busy failure, in milliseconds
    #[arg(long, value_name = "MS")]
    busy_retry_ms: Option<u64>,

    /// Config file (default: platform config dir, or MOODLENS_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Replay a recorded NDJSON response instead of calling the service
    #[arg(long, value_name = "FILE")]
    replay: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            service_url: self.service_url.clone(),
            mode: self.mode,
            busy_retry_delay_ms: self.busy_retry_ms,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let config_path = args.config.clone().or_else(default_config_path);
    let toml = load_toml_config_or_default(config_path.as_deref());
    if let Err(e) = init_tracing(&toml.logging) {
        eprintln!("Logging disabled: {}", e);
    }

    info!("Starting moodlens-analyzer {}", env!("CARGO_PKG_VERSION"));

    let config = AnalyzerConfig::resolve(&args.overrides(), &toml)?;

    match args.replay.clone() {
        Some(recording) => run(ReplayTransport::new(recording), &config, &args).await,
        None => {
            let transport = HttpTransport::new(&config.service_url, config.connect_timeout)?;
            run(transport, &config, &args).await
        }
    }
}

async fn run<T: Transport + 'static>(transport: T, config: &AnalyzerConfig, args: &Args) -> Result<ExitCode> {
    let queue = AdmissionQueue::new(EventBus::new(config.event_capacity));
    let settings = ClientSettings {
        default_mode: config.default_mode,
        busy_retry: config.busy_retry,
    };
    let client = AnalysisClient::with_queue(transport, queue, settings);

    let options = SubmitOptions::default().on_progress(|text| println!("… {}", text));
    let submission = client.submit(args.image_url.clone(), options).await;
    let handle = submission.handle.clone();
    if submission.position > 0 {
        println!("Queued at position {}", submission.position);
    }

    let ctrl_c_client = client.clone();
    let ctrl_c_handle = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!(job_id = %ctrl_c_handle.id(), "Interrupted; cancelling analysis");
            ctrl_c_client.cancel(&ctrl_c_handle).await;
        }
    });

    match submission.outcome().await {
        Ok(report) => {
            print_report(&report, args.json)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(AnalysisFailure::Cancelled) => {
            eprintln!("Analysis cancelled");
            Ok(ExitCode::from(EXIT_CANCELLED))
        }
        Err(AnalysisFailure::Failed(failure)) => {
            print_failure(&failure, args.json)?;
            Ok(ExitCode::from(EXIT_FAILED))
        }
    }
}

fn print_report(report: &CanonicalReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("Model:               {}", report.model_used);
    println!("Human emotion:       {}", report.human_dominant_emotion);
    println!("Human tags:          {}", report.human_secondary_tags.join(", "));
    println!("AI emotion:          {}", report.ai_dominant_emotion);
    println!("AI tags:             {}", report.ai_tags.join(", "));
    println!("AI summary:          {}", report.ai_visual_summary);
    println!(
        "Trainability:        {} ({})",
        report.trainability_score, report.trainability_label
    );
    println!("Consensus:           {}", report.consensus_score);
    println!("Gap:                 {}", report.gap_summary);
    if !report.raw_comments.is_empty() {
        println!("Comments:");
        for comment in &report.raw_comments {
            println!("  - {}", comment);
        }
    }
    Ok(())
}

fn print_failure(failure: &FailureReport, json: bool) -> Result<()> {
    eprintln!("Analysis failed [{}]: {}", failure.category.name(), failure.message);

    if let Some(report) = failure.category.report() {
        eprintln!("Partial results:");
        print_report(report, json)?;
    }

    eprintln!("Options:");
    for option in &failure.options {
        eprintln!("  - {}", option);
    }
    Ok(())
}
