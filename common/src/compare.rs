use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::{Aggregation, ComparatorConfig};
use crate::frame::FrameSequence;
use crate::loader::{self, LoadError};
use crate::metric::{self, MetricError};

/// Outcome of comparing two frame directories.
#[derive(Debug, Clone, PartialEq)]
pub enum Comparison {
    Scored(ComparisonResult),
    /// At least one directory had no decodable frames. Nothing was scored.
    Empty(EmptySequence),
}

impl Comparison {
    pub fn scored(self) -> Option<ComparisonResult> {
        match self {
            Comparison::Scored(result) => Some(result),
            Comparison::Empty(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmptySequence {
    pub baseline_dir: PathBuf,
    pub modified_dir: PathBuf,
    pub baseline_frames: usize,
    pub modified_frames: usize,
}

impl fmt::Display for EmptySequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut empty = Vec::new();
        if self.baseline_frames == 0 {
            empty.push(format!("baseline {}", self.baseline_dir.display()));
        }
        if self.modified_frames == 0 {
            empty.push(format!("modified {}", self.modified_dir.display()));
        }
        write!(f, "no images found in {}", empty.join(" and "))
    }
}

/// Scores of one comparison run. Never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonResult {
    aggregate: f64,
    scores: Vec<f64>,
}

impl ComparisonResult {
    fn new(scores: Vec<f64>, aggregation: Aggregation) -> Self {
        Self {
            aggregate: aggregation.apply(&scores),
            scores,
        }
    }

    pub fn aggregate(&self) -> f64 {
        self.aggregate
    }

    /// Per-frame scores in frame order.
    pub fn scores(&self) -> &[f64] {
        &self.scores
    }

    pub fn frame_count(&self) -> usize {
        self.scores.len()
    }

    pub fn min(&self) -> f64 {
        self.scores.iter().copied().fold(f64::INFINITY, f64::min)
    }

    pub fn max(&self) -> f64 {
        self.scores.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }
}

impl Aggregation {
    /// Reduce per-frame scores to one number. `scores` must not be empty.
    pub fn apply(self, scores: &[f64]) -> f64 {
        match self {
            Aggregation::Mean => scores.iter().sum::<f64>() / scores.len() as f64,
            Aggregation::Min => scores.iter().copied().fold(f64::INFINITY, f64::min),
            Aggregation::Median => {
                let mut sorted = scores.to_vec();
                sorted.sort_by(f64::total_cmp);
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 0 {
                    (sorted[mid - 1] + sorted[mid]) / 2.0
                } else {
                    sorted[mid]
                }
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CompareError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("frame {index} ({baseline} vs {modified}): {source}")]
    Metric {
        index: usize,
        baseline: String,
        modified: String,
        #[source]
        source: MetricError,
    },
}

/// Load both directories and score them frame by frame.
///
/// Sequences of different length are aligned by truncating to the shorter
/// one. If either directory yields no frames the result is
/// [`Comparison::Empty`]. A metric failure on any pair aborts the
/// comparison.
pub fn compare(
    baseline_dir: &Path,
    modified_dir: &Path,
    config: &ComparatorConfig,
) -> Result<Comparison, CompareError> {
    let baseline = loader::load(baseline_dir, config)?;
    let modified = loader::load(modified_dir, config)?;

    if baseline.is_empty() || modified.is_empty() {
        let empty = EmptySequence {
            baseline_dir: baseline_dir.to_path_buf(),
            modified_dir: modified_dir.to_path_buf(),
            baseline_frames: baseline.len(),
            modified_frames: modified.len(),
        };
        warn!(
            baseline = %baseline_dir.display(),
            modified = %modified_dir.display(),
            baseline_frames = empty.baseline_frames,
            modified_frames = empty.modified_frames,
            "nothing to compare"
        );
        return Ok(Comparison::Empty(empty));
    }

    score_sequences(&baseline, &modified, config).map(Comparison::Scored)
}

/// Score two non-empty sequences over their common prefix.
pub fn score_sequences(
    baseline: &FrameSequence,
    modified: &FrameSequence,
    config: &ComparatorConfig,
) -> Result<ComparisonResult, CompareError> {
    let length = baseline.len().min(modified.len());
    if baseline.len() != modified.len() {
        debug!(
            baseline_frames = baseline.len(),
            modified_frames = modified.len(),
            compared = length,
            "sequence lengths differ, truncating"
        );
    }
    info!(frames = length, "comparing frames");

    let mut scores = Vec::with_capacity(length);
    for (index, ((b_name, b_frame), (m_name, m_frame))) in
        baseline.iter().zip(modified.iter()).enumerate()
    {
        let score = metric::psnr(b_frame, m_frame, config.peak).map_err(|source| {
            CompareError::Metric {
                index,
                baseline: b_name.to_string(),
                modified: m_name.to_string(),
                source,
            }
        })?;
        debug!(index, baseline = b_name, modified = m_name, score, "frame scored");
        scores.push(score);
    }

    Ok(ComparisonResult::new(scores, config.aggregation))
}
