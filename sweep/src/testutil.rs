//! A stand-in simulator for tests: a shell script that copies pre-rendered
//! fixture frames into the requested output directory. The fixture is picked
//! by the config file name, `{name}_config.json` -> `fixtures/{name}/`.

use image::{Rgb, RgbImage};
use render_fidelity_common::config::SimulatorConfig;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::simulator::Simulator;

const SCRIPT: &str = r#"
out=""; cfg=""; fix=""
while [ $# -gt 0 ]; do
  case "$1" in
    --output_path) out="$2"; shift 2 ;;
    --config) cfg="$2"; shift 2 ;;
    --fixtures) fix="$2"; shift 2 ;;
    *) shift ;;
  esac
done
name=$(basename "$cfg" _config.json)
if [ ! -d "$fix/$name" ]; then
  echo "no fixture for $name" >&2
  exit 1
fi
mkdir -p "$out"
cp "$fix/$name"/* "$out"/
"#;

pub struct FakeSimulator {
    dir: TempDir,
}

impl FakeSimulator {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fake_sim.sh"), SCRIPT).unwrap();
        std::fs::create_dir_all(dir.path().join("fixtures")).unwrap();
        std::fs::create_dir_all(dir.path().join("configs")).unwrap();
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn config(&self) -> SimulatorConfig {
        SimulatorConfig {
            program: "sh".into(),
            script: self.root().join("fake_sim.sh").display().to_string(),
            model_path: self.root().to_path_buf(),
            render_img: true,
            compile_video: true,
            white_bg: true,
            extra_args: vec![
                "--fixtures".into(),
                self.root().join("fixtures").display().to_string(),
            ],
            frames_subdir: None,
        }
    }

    pub fn simulator(&self) -> Simulator {
        Simulator::new(self.config())
    }

    /// Frames `i` in `0..count` are solid gray at `i * 30 + offset`.
    pub fn add_fixture(&self, name: &str, count: usize, offset: u8) {
        let dir = self.root().join("fixtures").join(name);
        std::fs::create_dir_all(&dir).unwrap();
        for i in 0..count {
            let v = (i as u8) * 30 + offset;
            RgbImage::from_pixel(4, 4, Rgb([v, v, v]))
                .save(dir.join(format!("{i:04}.png")))
                .unwrap();
        }
    }

    pub fn add_video(&self, name: &str) {
        let dir = self.root().join("fixtures").join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("output.mp4"), b"mp4").unwrap();
    }

    pub fn write_config(&self, name: &str, value: &serde_json::Value) -> PathBuf {
        let path = self.root().join("configs").join(format!("{name}_config.json"));
        std::fs::write(&path, serde_json::to_string_pretty(value).unwrap()).unwrap();
        path
    }
}
