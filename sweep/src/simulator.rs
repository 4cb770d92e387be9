use render_fidelity_common::config::SimulatorConfig;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, error, info, warn};

const VIDEO_FILE: &str = "output.mp4";

#[derive(Debug, thiserror::Error)]
pub enum SimulatorError {
    #[error("failed to create output directory {0}: {1}")]
    OutputDir(String, std::io::Error),
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("simulator exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
}

/// What a finished simulator run left behind.
#[derive(Debug, Clone)]
pub struct SimulationRun {
    pub output_dir: PathBuf,
    pub frames_dir: PathBuf,
    /// Compiled video, if the simulator produced one.
    pub video: Option<PathBuf>,
}

/// Runs the external physics simulator as a child process.
#[derive(Debug, Clone)]
pub struct Simulator {
    config: SimulatorConfig,
}

impl Simulator {
    pub fn new(config: SimulatorConfig) -> Self {
        Self { config }
    }

    pub fn model_path(&self) -> &Path {
        &self.config.model_path
    }

    /// Directory the rendered frames of a run with this output dir land in.
    pub fn frames_dir(&self, output_dir: &Path) -> PathBuf {
        match &self.config.frames_subdir {
            Some(sub) => output_dir.join(sub),
            None => output_dir.to_path_buf(),
        }
    }

    /// Arguments passed after the program name.
    pub fn args(&self, config_path: &Path, output_dir: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            self.config.script.clone().into(),
            "--model_path".into(),
            self.config.model_path.clone().into(),
            "--output_path".into(),
            output_dir.into(),
            "--config".into(),
            config_path.into(),
        ];
        let flags = [
            (self.config.render_img, "--render_img"),
            (self.config.compile_video, "--compile_video"),
            (self.config.white_bg, "--white_bg"),
        ];
        args.extend(
            flags
                .into_iter()
                .filter(|(on, _)| *on)
                .map(|(_, flag)| OsString::from(flag)),
        );
        args.extend(self.config.extra_args.iter().map(OsString::from));
        args
    }

    /// Run one simulation and wait for it to exit.
    ///
    /// The output directory is created first. A non-zero exit is an error
    /// carrying the child's stderr.
    pub async fn run(
        &self,
        config_path: &Path,
        output_dir: &Path,
    ) -> Result<SimulationRun, SimulatorError> {
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|e| SimulatorError::OutputDir(output_dir.display().to_string(), e))?;

        let args = self.args(config_path, output_dir);
        info!(
            program = self.config.program,
            args = ?args,
            "running simulator"
        );

        let output = Command::new(&self.config.program)
            .args(&args)
            .stdin(std::process::Stdio::null())
            .output()
            .await
            .map_err(|source| SimulatorError::Spawn {
                program: self.config.program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!(status = %output.status, stderr = %stderr, "simulator exited with error");
            return Err(SimulatorError::Failed {
                status: output.status.to_string(),
                stderr,
            });
        }

        let video = output_dir.join(VIDEO_FILE);
        let video = if tokio::fs::try_exists(&video).await.unwrap_or(false) {
            Some(video)
        } else {
            debug!(output = %output_dir.display(), "no video produced");
            None
        };

        info!(output = %output_dir.display(), video = video.is_some(), "simulation complete");
        Ok(SimulationRun {
            output_dir: output_dir.to_path_buf(),
            frames_dir: self.frames_dir(output_dir),
            video,
        })
    }

    /// Logs a warning when the simulator program cannot be started.
    pub async fn check_available(&self) -> bool {
        match Command::new(&self.config.program).arg("--version").output().await {
            Ok(out) if out.status.success() => {
                debug!(program = self.config.program, "simulator program is available");
                true
            }
            Ok(_) => {
                warn!(
                    program = self.config.program,
                    "simulator program returned non-zero for --version; runs may fail"
                );
                true
            }
            Err(e) => {
                warn!(
                    program = self.config.program,
                    error = %e,
                    "simulator program not found on PATH; every run will fail"
                );
                false
            }
        }
    }
}
