mod materials;
mod simulator;
mod study;
mod summary;
#[cfg(test)]
mod testutil;
mod variant;

use clap::{Parser, Subcommand};
use render_fidelity_common::config::Config;
use simulator::Simulator;
use std::path::PathBuf;
use std::process::ExitCode;
use study::ParameterStudy;
use tracing::{error, info};

/// Run the simulator across materials and parameter variations.
#[derive(Debug, Parser)]
#[command(name = "fidelity-sweep", version)]
struct Cli {
    /// TOML config with `[simulator]`, `[study]` and `[comparator]` sections.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Render every variant and score it against its material's baseline.
    Study {
        /// Only test this material.
        #[arg(long)]
        material: Option<String>,
        /// Overrides `study.output_dir`.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Render each material's base config once.
    Materials {
        #[arg(long)]
        material: Option<String>,
        #[arg(long, default_value = "part1_materials")]
        output_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match Config::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", cli.config.display());
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        program = config.simulator.program,
        model = %config.simulator.model_path.display(),
        materials = config.study.materials.len(),
        variants = config.study.variants.len(),
        "starting fidelity sweep"
    );

    let simulator = Simulator::new(config.simulator.clone());
    simulator.check_available().await;

    match cli.command {
        Command::Study {
            material,
            output_dir,
        } => {
            if let Some(dir) = output_dir {
                config.study.output_dir = dir;
            }
            let study = ParameterStudy::new(config.study, config.comparator, simulator);
            match study.run(material.as_deref()).await {
                Ok(results) => {
                    println!("{}", results.render());
                    println!(
                        "Complete results saved to: {}",
                        study.output_dir().join(summary::SUMMARY_FILE).display()
                    );
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    error!(error = %e, "parameter study failed");
                    println!("Parameter study failed: {e}");
                    ExitCode::FAILURE
                }
            }
        }
        Command::Materials {
            material,
            output_dir,
        } => {
            match materials::run_materials(
                &simulator,
                &config.study.materials,
                &output_dir,
                material.as_deref(),
            )
            .await
            {
                Ok(runs) => {
                    println!("{}", materials::render_report(&runs));
                    if runs.iter().all(|r| r.succeeded()) {
                        ExitCode::SUCCESS
                    } else {
                        ExitCode::FAILURE
                    }
                }
                Err(e) => {
                    error!(error = %e, "material runs failed");
                    println!("{e}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}
