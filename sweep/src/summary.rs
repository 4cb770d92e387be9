use render_fidelity_common::config::VariantSpec;
use render_fidelity_common::record::json_score;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const SUMMARY_FILE: &str = "complete_parameter_study.json";

/// Everything one parameter study produced, persisted next to the runs.
#[derive(Debug, Clone, Serialize)]
pub struct StudySummary {
    pub materials_tested: Vec<String>,
    pub parameter_variations: Vec<VariantSpec>,
    pub results_by_material: BTreeMap<String, MaterialResults>,
    /// Materials whose baseline could not be produced, with the reason.
    pub skipped_materials: BTreeMap<String, String>,
    pub started_at: String,
    pub finished_at: String,
    pub aborted: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MaterialResults {
    pub baseline_config: Value,
    /// Run name ("baseline" or a variant name) -> simulator output dir.
    pub results_directories: BTreeMap<String, PathBuf>,
    pub psnr_comparisons: BTreeMap<String, VariantComparison>,
    pub failures: BTreeMap<String, VariantFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantComparison {
    pub parameter: String,
    /// Base config value, or `"N/A"` when the base config does not set it.
    pub baseline_value: Value,
    pub new_value: Value,
    #[serde(with = "json_score")]
    pub mean_psnr: f64,
    pub num_frames: usize,
    pub material: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Config,
    Simulation,
    Comparison,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantFailure {
    pub stage: FailureStage,
    pub reason: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SummaryError {
    #[error("failed to serialize summary: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to write summary {0}: {1}")]
    Write(String, std::io::Error),
}

impl StudySummary {
    pub fn write(&self, output_dir: &Path) -> Result<PathBuf, SummaryError> {
        let path = output_dir.join(SUMMARY_FILE);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)
            .map_err(|e| SummaryError::Write(path.display().to_string(), e))?;
        Ok(path)
    }

    /// Human-readable per-material report.
    pub fn render(&self) -> String {
        let rule = "=".repeat(80);
        let mut out = format!("\n{rule}\nCOMPLETE PARAMETER STUDY SUMMARY\n{rule}\n");

        for material in &self.materials_tested {
            if let Some(reason) = self.skipped_materials.get(material) {
                out.push_str(&format!(
                    "\n{} MATERIAL SKIPPED: {reason}\n",
                    material.to_uppercase()
                ));
                continue;
            }
            let Some(results) = self.results_by_material.get(material) else {
                continue;
            };
            out.push_str(&format!(
                "\n{} MATERIAL RESULTS:\n{}\n",
                material.to_uppercase(),
                "-".repeat(40)
            ));
            for (name, cmp) in &results.psnr_comparisons {
                out.push_str(&format!(
                    "  {name}:\n    Parameter: {}\n    Change: {} -> {}\n    \
                     PSNR vs baseline: {:.4}\n\n",
                    cmp.parameter,
                    display_value(&cmp.baseline_value),
                    display_value(&cmp.new_value),
                    cmp.mean_psnr,
                ));
            }
            for (name, failure) in &results.failures {
                out.push_str(&format!(
                    "  {name}: FAILED during {:?}: {}\n",
                    failure.stage, failure.reason
                ));
            }
        }
        if self.aborted {
            out.push_str("\nStudy aborted before all variants ran.\n");
        }
        out
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn summary() -> StudySummary {
        let mut metal = MaterialResults {
            baseline_config: json!({"n_grid": 100}),
            ..MaterialResults::default()
        };
        metal.psnr_comparisons.insert(
            "n_grid_60".into(),
            VariantComparison {
                parameter: "n_grid".into(),
                baseline_value: json!(100),
                new_value: json!(60),
                mean_psnr: 27.5,
                num_frames: 10,
                material: "metal".into(),
            },
        );
        metal.failures.insert(
            "damping_5.0".into(),
            VariantFailure {
                stage: FailureStage::Simulation,
                reason: "exit status: 1".into(),
            },
        );
        StudySummary {
            materials_tested: vec!["metal".into(), "snow".into()],
            parameter_variations: Vec::new(),
            results_by_material: BTreeMap::from([("metal".into(), metal)]),
            skipped_materials: BTreeMap::from([("snow".into(), "base config not found".into())]),
            started_at: "2026-01-01T00:00:00+00:00".into(),
            finished_at: "2026-01-01T01:00:00+00:00".into(),
            aborted: false,
        }
    }

    #[test]
    fn render_lists_results_failures_and_skips() {
        let text = summary().render();
        assert!(text.contains("METAL MATERIAL RESULTS"));
        assert!(text.contains("Change: 100 -> 60"));
        assert!(text.contains("PSNR vs baseline: 27.5000"));
        assert!(text.contains("damping_5.0: FAILED during Simulation"));
        assert!(text.contains("SNOW MATERIAL SKIPPED: base config not found"));
    }

    #[test]
    fn written_summary_is_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = summary().write(dir.path()).unwrap();
        assert!(path.ends_with(SUMMARY_FILE));
        let value: Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(
            value["results_by_material"]["metal"]["psnr_comparisons"]["n_grid_60"]["mean_psnr"],
            27.5
        );
        assert_eq!(
            value["results_by_material"]["metal"]["failures"]["damping_5.0"]["stage"],
            "simulation"
        );
    }
}
