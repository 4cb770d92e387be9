use chrono::Utc;
use render_fidelity_common::compare::{self, Comparison};
use render_fidelity_common::config::{ComparatorConfig, FailurePolicy, StudyConfig, VariantSpec};
use render_fidelity_common::record::PsnrRecord;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::simulator::Simulator;
use crate::summary::{
    FailureStage, MaterialResults, StudySummary, SummaryError, VariantComparison, VariantFailure,
};
use crate::variant;

#[derive(Debug, thiserror::Error)]
pub enum StudyError {
    #[error("failed to create {0}: {1}")]
    CreateDir(String, std::io::Error),
    #[error("unknown material {0}")]
    UnknownMaterial(String),
    #[error("study aborted at {material}/{run}: {reason}")]
    Aborted {
        material: String,
        run: String,
        reason: String,
    },
    #[error(transparent)]
    Summary(#[from] SummaryError),
}

/// Drives the simulator over every material and parameter variant and
/// scores each variant's frames against its material's baseline run.
pub struct ParameterStudy {
    study: StudyConfig,
    comparator: ComparatorConfig,
    simulator: Simulator,
}

/// Per-run failure that the [`FailurePolicy`] gets to rule on.
struct RunFailure {
    stage: FailureStage,
    reason: String,
}

impl RunFailure {
    fn new(stage: FailureStage, reason: impl ToString) -> Self {
        Self {
            stage,
            reason: reason.to_string(),
        }
    }
}

impl ParameterStudy {
    pub fn new(study: StudyConfig, comparator: ComparatorConfig, simulator: Simulator) -> Self {
        Self {
            study,
            comparator,
            simulator,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.study.output_dir
    }

    /// Run the study for all configured materials, or only `only`.
    ///
    /// The summary is written even when the study aborts, so partial
    /// results are kept.
    pub async fn run(&self, only: Option<&str>) -> Result<StudySummary, StudyError> {
        let materials: Vec<(String, PathBuf)> = match only {
            Some(name) => {
                let path = self
                    .study
                    .materials
                    .get(name)
                    .ok_or_else(|| StudyError::UnknownMaterial(name.to_string()))?;
                vec![(name.to_string(), path.clone())]
            }
            None => self
                .study
                .materials
                .iter()
                .map(|(name, path)| (name.clone(), path.clone()))
                .collect(),
        };

        std::fs::create_dir_all(&self.study.output_dir)
            .map_err(|e| StudyError::CreateDir(self.study.output_dir.display().to_string(), e))?;

        let mut summary = StudySummary {
            materials_tested: materials.iter().map(|(name, _)| name.clone()).collect(),
            parameter_variations: self.study.variants.clone(),
            results_by_material: BTreeMap::new(),
            skipped_materials: BTreeMap::new(),
            started_at: Utc::now().to_rfc3339(),
            finished_at: String::new(),
            aborted: false,
        };

        let mut abort = None;
        for (material, base_config_path) in &materials {
            let rule = "=".repeat(60);
            println!("\n{rule}\nTESTING {} MATERIAL\n{rule}", material.to_uppercase());
            if let Err(e) = self.run_material(material, base_config_path, &mut summary).await {
                abort = Some(e);
                break;
            }
        }

        summary.aborted = abort.is_some();
        summary.finished_at = Utc::now().to_rfc3339();
        let path = summary.write(&self.study.output_dir)?;
        info!(path = %path.display(), aborted = summary.aborted, "study summary written");

        match abort {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }

    async fn run_material(
        &self,
        material: &str,
        base_config_path: &Path,
        summary: &mut StudySummary,
    ) -> Result<(), StudyError> {
        let material_dir = self.study.output_dir.join(material);

        let baseline = self
            .prepare_baseline(material, base_config_path, &material_dir)
            .await;
        let base_config = match baseline {
            Ok(v) => v,
            Err(failure) => {
                error!(
                    material,
                    stage = ?failure.stage,
                    reason = %failure.reason,
                    "baseline failed"
                );
                println!("Failed to run {material} baseline simulation: {}", failure.reason);
                summary
                    .skipped_materials
                    .insert(material.to_string(), failure.reason.clone());
                return self.on_failure(material, "baseline", failure);
            }
        };

        let baseline_output = material_dir.join("baseline");
        let baseline_frames = self.simulator.frames_dir(&baseline_output);
        let results = summary
            .results_by_material
            .entry(material.to_string())
            .or_insert_with(|| MaterialResults {
                baseline_config: base_config.clone(),
                ..MaterialResults::default()
            });
        results
            .results_directories
            .insert("baseline".into(), baseline_output);

        for spec in &self.study.variants {
            println!("\n=== Running {} - {} ===", material.to_uppercase(), spec.name);
            match self
                .run_variant(material, spec, &base_config, &material_dir, &baseline_frames, results)
                .await
            {
                Ok(cmp) => {
                    println!("  PSNR vs {material} baseline: {:.4}", cmp.mean_psnr);
                    println!(
                        "  Parameter change: {} {} -> {}",
                        cmp.parameter, cmp.baseline_value, cmp.new_value
                    );
                    results.psnr_comparisons.insert(spec.name.clone(), cmp);
                }
                Err(failure) => {
                    warn!(
                        material,
                        variant = spec.name,
                        stage = ?failure.stage,
                        reason = %failure.reason,
                        "variant failed"
                    );
                    println!("  Failed {}: {}", spec.name, failure.reason);
                    results.failures.insert(
                        spec.name.clone(),
                        VariantFailure {
                            stage: failure.stage,
                            reason: failure.reason.clone(),
                        },
                    );
                    self.on_failure(material, &spec.name, failure)?;
                }
            }
        }
        Ok(())
    }

    fn on_failure(&self, material: &str, run: &str, failure: RunFailure) -> Result<(), StudyError> {
        match self.study.on_failure {
            FailurePolicy::Continue => Ok(()),
            FailurePolicy::Abort => Err(StudyError::Aborted {
                material: material.to_string(),
                run: run.to_string(),
                reason: failure.reason,
            }),
        }
    }

    /// Copy the base config into the material dir and render the baseline.
    async fn prepare_baseline(
        &self,
        material: &str,
        base_config_path: &Path,
        material_dir: &Path,
    ) -> Result<Value, RunFailure> {
        if !base_config_path.exists() {
            return Err(RunFailure::new(
                FailureStage::Config,
                format!("base config not found: {}", base_config_path.display()),
            ));
        }
        let base_config = variant::load_json(base_config_path)
            .map_err(|e| RunFailure::new(FailureStage::Config, e))?;

        std::fs::create_dir_all(material_dir)
            .map_err(|e| RunFailure::new(FailureStage::Config, e))?;
        let config_path = material_dir.join(format!("{material}_baseline_config.json"));
        variant::save_json(&base_config, &config_path)
            .map_err(|e| RunFailure::new(FailureStage::Config, e))?;

        println!("\n=== Running {} Baseline Simulation ===", material.to_uppercase());
        self.simulator
            .run(&config_path, &material_dir.join("baseline"))
            .await
            .map_err(|e| RunFailure::new(FailureStage::Simulation, e))?;
        Ok(base_config)
    }

    async fn run_variant(
        &self,
        material: &str,
        spec: &VariantSpec,
        base_config: &Value,
        material_dir: &Path,
        baseline_frames: &Path,
        results: &mut MaterialResults,
    ) -> Result<VariantComparison, RunFailure> {
        let applied = variant::apply(spec, base_config)
            .map_err(|e| RunFailure::new(FailureStage::Config, e))?;
        let config_path = material_dir.join(format!("{}_config.json", spec.name));
        variant::save_json(&applied.config, &config_path)
            .map_err(|e| RunFailure::new(FailureStage::Config, e))?;

        let output = material_dir.join(&spec.name);
        let run = self
            .simulator
            .run(&config_path, &output)
            .await
            .map_err(|e| RunFailure::new(FailureStage::Simulation, e))?;
        results
            .results_directories
            .insert(spec.name.clone(), run.output_dir.clone());

        if !run.frames_dir.is_dir() {
            return Err(RunFailure::new(
                FailureStage::Comparison,
                format!("frames directory {} does not exist", run.frames_dir.display()),
            ));
        }

        let comparator = self.comparator.clone();
        let (baseline, modified) = (baseline_frames.to_path_buf(), run.frames_dir.clone());
        let outcome = tokio::task::spawn_blocking(move || {
            compare::compare(&baseline, &modified, &comparator)
        })
        .await
        .map_err(|e| RunFailure::new(FailureStage::Comparison, e))?
        .map_err(|e| RunFailure::new(FailureStage::Comparison, e))?;

        let result = match outcome {
            Comparison::Scored(result) => result,
            Comparison::Empty(empty) => {
                return Err(RunFailure::new(FailureStage::Comparison, empty));
            }
        };

        let record = PsnrRecord::new(
            &result,
            self.comparator.aggregation,
            baseline_frames,
            &run.frames_dir,
        );
        record
            .write(&material_dir.join(format!("{}_psnr.json", spec.name)))
            .map_err(|e| RunFailure::new(FailureStage::Comparison, e))?;

        Ok(VariantComparison {
            parameter: spec.param.clone(),
            baseline_value: applied.baseline_value.unwrap_or_else(|| Value::from("N/A")),
            new_value: applied.new_value,
            mean_psnr: result.aggregate(),
            num_frames: result.frame_count(),
            material: material.to_string(),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::testutil::FakeSimulator;
    use render_fidelity_common::config::ParamChange;
    use serde_json::json;

    fn variant(name: &str, param: &str, value: Value) -> VariantSpec {
        VariantSpec {
            name: name.into(),
            param: param.into(),
            change: ParamChange::Absolute { value },
        }
    }

    fn study(fake: &FakeSimulator, policy: FailurePolicy) -> ParameterStudy {
        let base = fake.root().join("metal.json");
        std::fs::write(&base, r#"{"n_grid": 100, "softening": 0.1}"#).unwrap();
        let config = StudyConfig {
            output_dir: fake.root().join("study"),
            on_failure: policy,
            materials: BTreeMap::from([("metal".to_string(), base)]),
            variants: vec![
                variant("n_grid_60", "n_grid", json!(60)),
                variant("broken", "n_grid", json!(1)),
                variant("same", "softening", json!(0.1)),
            ],
        };
        ParameterStudy::new(config, ComparatorConfig::default(), fake.simulator())
    }

    fn fixtures(fake: &FakeSimulator) {
        fake.add_fixture("metal_baseline", 3, 0);
        fake.add_fixture("n_grid_60", 4, 5);
        fake.add_fixture("same", 3, 0);
    }

    #[tokio::test]
    async fn continue_policy_records_failure_and_moves_on() {
        let fake = FakeSimulator::new();
        fixtures(&fake);
        let study = study(&fake, FailurePolicy::Continue);

        let summary = study.run(None).await.unwrap();
        let metal = &summary.results_by_material["metal"];

        let n_grid = &metal.psnr_comparisons["n_grid_60"];
        assert_eq!(n_grid.num_frames, 3);
        assert!(n_grid.mean_psnr.is_finite());
        assert_eq!(n_grid.baseline_value, json!(100));
        assert_eq!(n_grid.new_value, json!(60));

        assert_eq!(metal.psnr_comparisons["same"].mean_psnr, f64::INFINITY);
        assert_eq!(metal.failures["broken"].stage, FailureStage::Simulation);
        assert!(!summary.aborted);

        let out = study.output_dir();
        assert!(out.join(crate::summary::SUMMARY_FILE).exists());
        assert!(out.join("metal/metal_baseline_config.json").exists());
        assert!(out.join("metal/n_grid_60_config.json").exists());
        let record = PsnrRecord::read(&out.join("metal/n_grid_60_psnr.json")).unwrap();
        assert_eq!(record.num_frames, 3);
        assert!(!out.join("metal/broken_psnr.json").exists());
    }

    #[tokio::test]
    async fn abort_policy_stops_at_first_failure() {
        let fake = FakeSimulator::new();
        fixtures(&fake);
        let study = study(&fake, FailurePolicy::Abort);

        let err = study.run(None).await.unwrap_err();
        match err {
            StudyError::Aborted { material, run, .. } => {
                assert_eq!(material, "metal");
                assert_eq!(run, "broken");
            }
            other => panic!("unexpected error {other}"),
        }
        let out = study.output_dir();
        assert!(out.join(crate::summary::SUMMARY_FILE).exists());
        assert!(out.join("metal/n_grid_60_psnr.json").exists());
        assert!(!out.join("metal/same_config.json").exists());
    }

    #[tokio::test]
    async fn empty_variant_frames_are_a_comparison_failure() {
        let fake = FakeSimulator::new();
        fixtures(&fake);
        // Renders only a video, no frames.
        fake.add_video("broken");
        let study = study(&fake, FailurePolicy::Continue);

        let summary = study.run(None).await.unwrap();
        let failure = &summary.results_by_material["metal"].failures["broken"];
        assert_eq!(failure.stage, FailureStage::Comparison);
        assert!(failure.reason.contains("no images found"));
    }

    #[tokio::test]
    async fn missing_base_config_skips_material() {
        let fake = FakeSimulator::new();
        let config = StudyConfig {
            output_dir: fake.root().join("study"),
            on_failure: FailurePolicy::Continue,
            materials: BTreeMap::from([("snow".to_string(), fake.root().join("absent.json"))]),
            variants: Vec::new(),
        };
        let study = ParameterStudy::new(config, ComparatorConfig::default(), fake.simulator());

        let summary = study.run(None).await.unwrap();
        assert!(summary.skipped_materials["snow"].contains("base config not found"));
        assert!(summary.results_by_material.is_empty());
    }

    #[tokio::test]
    async fn unknown_material_filter_is_rejected() {
        let fake = FakeSimulator::new();
        let study = study(&fake, FailurePolicy::Continue);
        let err = study.run(Some("jelly")).await.unwrap_err();
        assert!(matches!(err, StudyError::UnknownMaterial(name) if name == "jelly"));
    }
}
