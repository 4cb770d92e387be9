use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::simulator::Simulator;

#[derive(Debug, thiserror::Error)]
pub enum MaterialsError {
    #[error("model path does not exist: {0}")]
    MissingModel(String),
    #[error("unknown material {0}")]
    UnknownMaterial(String),
    #[error("failed to create {0}: {1}")]
    CreateDir(String, std::io::Error),
}

#[derive(Debug, Clone)]
pub struct MaterialRun {
    pub material: String,
    pub config_path: PathBuf,
    pub output_path: PathBuf,
    pub outcome: Result<Option<PathBuf>, String>,
}

impl MaterialRun {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Simulate each material's base config once, without any variation.
pub async fn run_materials(
    simulator: &Simulator,
    materials: &BTreeMap<String, PathBuf>,
    output_dir: &Path,
    only: Option<&str>,
) -> Result<Vec<MaterialRun>, MaterialsError> {
    if !simulator.model_path().exists() {
        return Err(MaterialsError::MissingModel(
            simulator.model_path().display().to_string(),
        ));
    }
    if let Some(name) = only {
        if !materials.contains_key(name) {
            return Err(MaterialsError::UnknownMaterial(name.to_string()));
        }
    }
    std::fs::create_dir_all(output_dir)
        .map_err(|e| MaterialsError::CreateDir(output_dir.display().to_string(), e))?;

    let mut runs = Vec::new();
    for (material, config_path) in materials {
        if only.is_some_and(|name| name != material.as_str()) {
            continue;
        }
        if !config_path.exists() {
            error!(material, config = %config_path.display(), "config file not found");
            println!("Config file not found: {}", config_path.display());
            continue;
        }

        println!("\n=== Running {} Material Simulation ===", material.to_uppercase());
        let output_path = output_dir.join(format!("{material}_simulation"));
        let outcome = simulator
            .run(config_path, &output_path)
            .await
            .map(|run| run.video)
            .map_err(|e| e.to_string());
        match &outcome {
            Ok(_) => info!(
                material,
                output = %output_path.display(),
                "material simulation finished"
            ),
            Err(e) => error!(material, error = %e, "material simulation failed"),
        }
        runs.push(MaterialRun {
            material: material.clone(),
            config_path: config_path.clone(),
            output_path,
            outcome,
        });
    }
    Ok(runs)
}

pub fn render_report(runs: &[MaterialRun]) -> String {
    let rule = "=".repeat(50);
    let mut out = format!("\n{rule}\nSIMULATION SUMMARY\n{rule}\n");
    for run in runs {
        let status = if run.succeeded() { "SUCCESS" } else { "FAILED" };
        out.push_str(&format!("{}: {status}\n", run.material.to_uppercase()));
        out.push_str(&format!("  Config: {}\n", run.config_path.display()));
        match &run.outcome {
            Ok(video) => {
                out.push_str(&format!("  Output: {}\n", run.output_path.display()));
                match video {
                    Some(path) => out.push_str(&format!("  Video: {}\n", path.display())),
                    None => out.push_str("  Video not found, but images should be available\n"),
                }
            }
            Err(e) => out.push_str(&format!("  Error: {e}\n")),
        }
    }
    out
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::testutil::FakeSimulator;

    #[tokio::test]
    async fn runs_each_material_and_reports() {
        let fake = FakeSimulator::new();
        fake.add_fixture("metal", 2, 0);
        fake.add_video("metal");
        let metal = fake.write_config("metal", &serde_json::json!({"material": "metal"}));
        let snow = fake.write_config("snow", &serde_json::json!({"material": "snow"}));
        let materials = BTreeMap::from([("metal".to_string(), metal), ("snow".to_string(), snow)]);
        let out = fake.root().join("part1");

        let runs = run_materials(&fake.simulator(), &materials, &out, None)
            .await
            .unwrap();
        assert_eq!(runs.len(), 2);
        assert!(runs[0].succeeded());
        assert!(runs[0].outcome.as_ref().unwrap().is_some());
        assert!(out.join("metal_simulation/0001.png").exists());
        assert!(!runs[1].succeeded());

        let report = render_report(&runs);
        assert!(report.contains("METAL: SUCCESS"));
        assert!(report.contains("SNOW: FAILED"));
    }

    #[tokio::test]
    async fn filter_selects_one_material() {
        let fake = FakeSimulator::new();
        fake.add_fixture("snow", 1, 0);
        let metal = fake.write_config("metal", &serde_json::json!({}));
        let snow = fake.write_config("snow", &serde_json::json!({}));
        let materials = BTreeMap::from([("metal".to_string(), metal), ("snow".to_string(), snow)]);

        let out = fake.root().join("out");
        let runs = run_materials(&fake.simulator(), &materials, &out, Some("snow"))
            .await
            .unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].material, "snow");
        assert!(runs[0].succeeded());
        assert_eq!(runs[0].outcome.as_ref().unwrap(), &None);
    }

    #[tokio::test]
    async fn missing_model_aborts_before_running() {
        let fake = FakeSimulator::new();
        let mut config = fake.config();
        config.model_path = fake.root().join("no-model");
        let err = run_materials(
            &Simulator::new(config),
            &BTreeMap::new(),
            &fake.root().join("out"),
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, MaterialsError::MissingModel(_)));
    }
}
