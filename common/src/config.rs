use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub comparator: ComparatorConfig,
    #[serde(default)]
    pub simulator: SimulatorConfig,
    #[serde(default)]
    pub study: StudyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Knobs for loading frames and scoring a pair of sequences.
#[derive(Debug, Clone, Deserialize)]
pub struct ComparatorConfig {
    /// File extension (without the dot) that marks a frame file.
    #[serde(default = "default_extension")]
    pub extension: String,
    /// Channel order the frame files were written in.
    #[serde(default)]
    pub channel_order: ChannelOrder,
    /// Peak signal value of a normalized sample.
    #[serde(default = "default_peak")]
    pub peak: f64,
    #[serde(default)]
    pub aggregation: Aggregation,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    #[default]
    Rgb,
    Bgr,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    #[default]
    Mean,
    Median,
    Min,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulatorConfig {
    #[serde(default = "default_program")]
    pub program: String,
    #[serde(default = "default_script")]
    pub script: String,
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,
    #[serde(default = "default_true")]
    pub render_img: bool,
    #[serde(default = "default_true")]
    pub compile_video: bool,
    #[serde(default = "default_true")]
    pub white_bg: bool,
    #[serde(default)]
    pub extra_args: Vec<String>,
    /// Subdirectory of a run's output dir that holds the rendered frames.
    /// When unset the frames are expected directly in the output dir.
    #[serde(default)]
    pub frames_subdir: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StudyConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub on_failure: FailurePolicy,
    /// Material name -> base simulator config (JSON).
    #[serde(default = "default_materials")]
    pub materials: BTreeMap<String, PathBuf>,
    #[serde(default = "default_variants")]
    pub variants: Vec<VariantSpec>,
}

/// What the study does after a variant fails to simulate or score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    #[default]
    Continue,
    Abort,
}

/// One parameter variation applied on top of a material's base config.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct VariantSpec {
    pub name: String,
    pub param: String,
    #[serde(flatten)]
    pub change: ParamChange,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ParamChange {
    /// Replace the parameter with this value.
    Absolute { value: serde_json::Value },
    /// Multiply the base value (1.0 when the base config lacks it).
    Relative { factor: f64 },
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for ComparatorConfig {
    fn default() -> Self {
        Self {
            extension: default_extension(),
            channel_order: ChannelOrder::default(),
            peak: default_peak(),
            aggregation: Aggregation::default(),
        }
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            script: default_script(),
            model_path: default_model_path(),
            render_img: true,
            compile_video: true,
            white_bg: true,
            extra_args: Vec::new(),
            frames_subdir: None,
        }
    }
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            on_failure: FailurePolicy::default(),
            materials: default_materials(),
            variants: default_variants(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
}

// Default value functions
fn default_extension() -> String {
    "png".into()
}
fn default_peak() -> f64 {
    1.0
}
fn default_program() -> String {
    "python".into()
}
fn default_script() -> String {
    "gs_simulation.py".into()
}
fn default_model_path() -> PathBuf {
    PathBuf::from("../pillow2sofa_whitebg-trained/")
}
fn default_true() -> bool {
    true
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("part2_parameter_study")
}
fn default_materials() -> BTreeMap<String, PathBuf> {
    BTreeMap::from([
        ("metal".into(), PathBuf::from("./config/pillow2sofa_metal.json")),
        ("snow".into(), PathBuf::from("./config/pillow2sofa_snow.json")),
    ])
}
fn default_variants() -> Vec<VariantSpec> {
    let absolute = |name: &str, param: &str, value: serde_json::Value| VariantSpec {
        name: name.into(),
        param: param.into(),
        change: ParamChange::Absolute { value },
    };
    vec![
        absolute("n_grid_60", "n_grid", json!(60)),
        absolute("n_grid_150", "n_grid", json!(150)),
        absolute("substep_dt_2e-5", "substep_dt", json!(2e-5)),
        absolute("substep_dt_5e-4", "substep_dt", json!(5e-4)),
        absolute("damping_0.1", "grid_v_damping_scale", json!(0.1)),
        absolute("damping_5.0", "grid_v_damping_scale", json!(5.0)),
        absolute("softening_0.001", "softening", json!(0.001)),
        absolute("softening_1.0", "softening", json!(1.0)),
    ]
}
fn default_log_level() -> String {
    "info".into()
}
