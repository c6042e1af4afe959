use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use spyplane_classifier::{config::Config, ml::ClassifierKind, Pipeline};
use std::fmt::Display;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "spyplane")]
#[command(about = "Rank unlabeled aircraft by surveillance-plane probability", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file layered over the built-in defaults
    #[arg(short, long, env = "SPYPLANE_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Print reports as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate all three classifiers, then score with the configured one
    Run,

    /// Train on the training partition and report holdout metrics
    Evaluate {
        #[arg(short, long, value_enum)]
        model: Option<ClassifierKind>,
    },

    /// Refit on all labeled rows and write the top candidates
    Score {
        #[arg(short, long, value_enum)]
        model: Option<ClassifierKind>,

        /// Override the output file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Override the number of rows kept
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("spyplane_classifier={0},spyplane={0}", config.observability.log_level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if config.observability.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn print_report<T: Serialize + Display>(report: &T, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        print!("{}", report);
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    init_tracing(&config);

    tracing::info!("spyplane-classifier v{}", spyplane_classifier::VERSION);

    match cli.command {
        Commands::Run => {
            let pipeline = Pipeline::new(config);
            let report = pipeline.run().context("Pipeline run failed")?;
            print_report(&report, cli.json)?;
        }
        Commands::Evaluate { model } => {
            let pipeline = Pipeline::new(config);
            let data = pipeline.prepare().context("Failed to prepare input data")?;
            let kinds: Vec<ClassifierKind> = match model {
                Some(kind) => vec![kind],
                None => <ClassifierKind as strum::IntoEnumIterator>::iter().collect(),
            };

            for kind in kinds {
                let report = pipeline
                    .evaluate(&data, kind)
                    .with_context(|| format!("Failed to evaluate {}", kind))?;
                print_report(&report, cli.json)?;
            }
        }
        Commands::Score {
            model,
            output,
            top_k,
        } => {
            if let Some(output) = output {
                config.scoring.output_path = output;
            }
            if let Some(top_k) = top_k {
                anyhow::ensure!(top_k >= 1, "--top-k must be at least 1");
                config.scoring.top_k = top_k;
            }
            let kind = model.unwrap_or(config.scoring.model);

            let pipeline = Pipeline::new(config);
            let data = pipeline.prepare().context("Failed to prepare input data")?;
            let report = pipeline
                .score(&data, kind)
                .with_context(|| format!("Failed to score with {}", kind))?;
            print_report(&report, cli.json)?;
        }
    }

    Ok(())
}
