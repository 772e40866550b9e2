use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use env_logger::{Builder, Env};
use forestwatch::config::resolve_artifact_ttl;
use forestwatch::io::{evict_expired, ArtifactManifest};
use forestwatch::{JobRequest, Orchestrator, PipelineConfig, RunReport};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "forestwatch", about = "Detect vegetation loss between two red/NIR acquisitions")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Compare two time points and print the JSON result record
    Run {
        /// Identifier (folder under input_folder) of the earlier acquisition
        old: String,
        /// Identifier of the later acquisition
        new: String,
        /// Pipeline configuration file
        #[arg(short, long, default_value = "config.json", env = "FORESTWATCH_CONFIG")]
        config: PathBuf,
        /// Override output_folder from the configuration
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Override job_timeout_secs from the configuration
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Delete the artifacts recorded in an output folder's manifest
    Release {
        output_folder: PathBuf,
    },
    /// Delete the artifacts of an output folder if older than the TTL
    Evict {
        /// Defaults to output_folder from the configuration
        output_folder: Option<PathBuf>,
        /// Configuration supplying output_folder and artifact_ttl_secs
        #[arg(short, long, env = "FORESTWATCH_CONFIG")]
        config: Option<PathBuf>,
        /// Override artifact_ttl_secs from the configuration
        #[arg(long)]
        ttl_secs: Option<u64>,
    },
}

fn run(
    config_path: PathBuf,
    request: JobRequest,
    output: Option<PathBuf>,
    timeout_secs: Option<u64>,
) -> RunReport {
    let result = PipelineConfig::from_file(&config_path).and_then(|mut config| {
        if let Some(output) = output {
            config.output_folder = output;
        }
        if let Some(secs) = timeout_secs {
            config.job_timeout_secs = secs;
        }
        Orchestrator::new(Arc::new(config))?.run(&request)
    });
    RunReport::from_result(&result)
}

fn main() -> Result<()> {
    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));
    builder.format_timestamp_secs();
    builder.init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            old,
            new,
            config,
            output,
            timeout_secs,
        } => {
            let report = run(config, JobRequest::new(old, new), output, timeout_secs);
            println!("{}", report.to_json());
            if report.is_error() {
                std::process::exit(1);
            }
        }
        Command::Release { output_folder } => {
            let manifest = ArtifactManifest::load(&output_folder)
                .with_context(|| format!("No manifest in {}", output_folder.display()))?;
            let removed = manifest.release()?;
            log::info!("Removed {} files", removed);
        }
        Command::Evict {
            output_folder,
            config,
            ttl_secs,
        } => {
            let config = config.map(PipelineConfig::from_file).transpose()?;
            let ttl = resolve_artifact_ttl(ttl_secs, config.as_ref())?;
            let output_folder = output_folder
                .or_else(|| config.map(|c| c.output_folder))
                .context("No output folder given and no configuration to take it from")?;

            match evict_expired(&output_folder, ttl, chrono::Utc::now())? {
                Some(removed) => log::info!("Evicted {} files", removed),
                None => log::info!("Nothing to evict in {}", output_folder.display()),
            }
        }
    }

    Ok(())
}
