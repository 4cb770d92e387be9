use clap::Parser;
use render_fidelity_common::compare::{self, CompareError, Comparison, EmptySequence};
use render_fidelity_common::config::{ComparatorConfig, Config};
use render_fidelity_common::record::{PsnrRecord, RecordError};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};

/// Compute PSNR between a baseline render and a modified-parameter render.
#[derive(Debug, Parser)]
#[command(name = "fidelity-eval", version)]
struct Args {
    /// Directory containing the baseline simulation frames.
    #[arg(long, alias = "baseline_dir")]
    baseline_dir: PathBuf,
    /// Directory containing the modified simulation frames.
    #[arg(long, alias = "modified_dir")]
    modified_dir: PathBuf,
    /// Where to write the JSON result record.
    #[arg(long, alias = "output_file", default_value = "psnr_results.json")]
    output_file: PathBuf,
    /// Optional TOML config; only `[comparator]` and `[logging]` are read.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
enum EvalError {
    #[error("{role} directory {} does not exist", .path.display())]
    MissingDir { role: &'static str, path: PathBuf },
    #[error("{0}")]
    Empty(EmptySequence),
    #[error(transparent)]
    Compare(#[from] CompareError),
    #[error("failed to save results: {0}")]
    Record(#[from] RecordError),
}

impl EvalError {
    fn exit_code(&self) -> u8 {
        match self {
            EvalError::MissingDir { .. } => 2,
            EvalError::Empty(_) => 3,
            EvalError::Compare(_) | EvalError::Record(_) => 1,
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => match Config::load(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load config from {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => Config::default(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    println!("Computing PSNR between:");
    println!("  Baseline: {}", args.baseline_dir.display());
    println!("  Modified: {}", args.modified_dir.display());

    match evaluate(
        &args.baseline_dir,
        &args.modified_dir,
        &args.output_file,
        &config.comparator,
    ) {
        Ok(record) => {
            println!("Comparing {} frames", record.num_frames);
            println!("Mean PSNR: {:.4}", record.mean_psnr);
            let (min, max) = score_range(&record.psnr_values);
            println!("PSNR Range: {min:.4} - {max:.4}");
            println!("Results saved to {}", args.output_file.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "evaluation failed");
            println!("Error: {e}");
            println!("Failed to compute PSNR");
            ExitCode::from(e.exit_code())
        }
    }
}

/// Check inputs, compare, and persist the record. Nothing is written unless
/// the comparison produced scores.
fn evaluate(
    baseline_dir: &Path,
    modified_dir: &Path,
    output_file: &Path,
    config: &ComparatorConfig,
) -> Result<PsnrRecord, EvalError> {
    for (role, path) in [("Baseline", baseline_dir), ("Modified", modified_dir)] {
        if !path.is_dir() {
            return Err(EvalError::MissingDir {
                role,
                path: path.to_path_buf(),
            });
        }
    }

    let result = match compare::compare(baseline_dir, modified_dir, config)? {
        Comparison::Scored(result) => result,
        Comparison::Empty(empty) => return Err(EvalError::Empty(empty)),
    };

    let record = PsnrRecord::new(&result, config.aggregation, baseline_dir, modified_dir);
    record.write(output_file)?;
    info!(
        frames = record.num_frames,
        aggregate = record.mean_psnr,
        output = %output_file.display(),
        "PSNR evaluation complete"
    );
    Ok(record)
}

fn score_range(scores: &[f64]) -> (f64, f64) {
    scores
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &s| {
            (lo.min(s), hi.max(s))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn write_frames(dir: &Path, count: usize, offset: u8) {
        for i in 0..count {
            let v = (i as u8) * 20 + offset;
            RgbImage::from_pixel(3, 3, Rgb([v, v, v]))
                .save(dir.join(format!("{i:04}.png")))
                .unwrap();
        }
    }

    #[test]
    fn args_accept_underscore_aliases() {
        let args = Args::try_parse_from([
            "fidelity-eval",
            "--baseline_dir",
            "a",
            "--modified-dir",
            "b",
        ])
        .unwrap();
        assert_eq!(args.baseline_dir, PathBuf::from("a"));
        assert_eq!(args.modified_dir, PathBuf::from("b"));
        assert_eq!(args.output_file, PathBuf::from("psnr_results.json"));
        assert!(args.config.is_none());
    }

    #[test]
    fn success_writes_record() {
        let base = tempfile::tempdir().unwrap();
        let modified = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        write_frames(base.path(), 4, 0);
        write_frames(modified.path(), 3, 5);
        let output = out.path().join("psnr.json");

        let record = evaluate(
            base.path(),
            modified.path(),
            &output,
            &ComparatorConfig::default(),
        )
        .unwrap();
        assert_eq!(record.num_frames, 3);
        assert_eq!(PsnrRecord::read(&output).unwrap(), record);
    }

    #[test]
    fn missing_directory_writes_nothing() {
        let base = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let output = out.path().join("psnr.json");

        let err = evaluate(
            base.path(),
            &base.path().join("absent"),
            &output,
            &ComparatorConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, EvalError::MissingDir { role: "Modified", .. }));
        assert_eq!(err.exit_code(), 2);
        assert!(!output.exists());
    }

    #[test]
    fn empty_baseline_writes_nothing() {
        let base = tempfile::tempdir().unwrap();
        let modified = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        write_frames(modified.path(), 3, 0);
        let output = out.path().join("psnr.json");

        let err = evaluate(
            base.path(),
            modified.path(),
            &output,
            &ComparatorConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, EvalError::Empty(_)));
        assert_eq!(err.exit_code(), 3);
        assert!(!output.exists());
    }

    #[test]
    fn range_covers_infinity() {
        assert_eq!(score_range(&[30.0, f64::INFINITY, 25.0]), (25.0, f64::INFINITY));
    }
}
