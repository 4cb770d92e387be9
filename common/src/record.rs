use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::compare::ComparisonResult;
use crate::config::Aggregation;

/// Persisted outcome of one comparison, written as a flat JSON object.
///
/// `mean_psnr` holds the aggregate under whichever [`Aggregation`] was
/// configured; the key name is kept so existing readers of the files keep
/// working.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PsnrRecord {
    #[serde(with = "json_score")]
    pub mean_psnr: f64,
    #[serde(with = "json_score::list")]
    pub psnr_values: Vec<f64>,
    pub num_frames: usize,
    pub baseline_dir: String,
    pub modified_dir: String,
    #[serde(default)]
    pub aggregation: Aggregation,
}

impl PsnrRecord {
    pub fn new(
        result: &ComparisonResult,
        aggregation: Aggregation,
        baseline_dir: &Path,
        modified_dir: &Path,
    ) -> Self {
        Self {
            mean_psnr: result.aggregate(),
            psnr_values: result.scores().to_vec(),
            num_frames: result.frame_count(),
            baseline_dir: baseline_dir.display().to_string(),
            modified_dir: modified_dir.display().to_string(),
            aggregation,
        }
    }

    pub fn to_json(&self) -> Result<String, RecordError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, RecordError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn write(&self, path: &Path) -> Result<(), RecordError> {
        std::fs::write(path, self.to_json()?)
            .map_err(|e| RecordError::Io(path.display().to_string(), e))?;
        debug!(path = %path.display(), frames = self.num_frames, "PSNR record written");
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self, RecordError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| RecordError::Io(path.display().to_string(), e))?;
        Self::from_json(&json)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("record file {0}: {1}")]
    Io(String, std::io::Error),
    #[error("invalid record JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// JSON has no literal for infinity or NaN. Non-finite scores are written
/// as the strings `"Infinity"`, `"-Infinity"` and `"NaN"`; finite scores
/// stay plain numbers.
pub mod json_score {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    fn decode<E: serde::de::Error>(raw: Raw) -> Result<f64, E> {
        match raw {
            Raw::Number(v) => Ok(v),
            Raw::Text(s) => match s.as_str() {
                "Infinity" | "inf" => Ok(f64::INFINITY),
                "-Infinity" | "-inf" => Ok(f64::NEG_INFINITY),
                "NaN" | "nan" => Ok(f64::NAN),
                other => Err(E::custom(format!("invalid score {other:?}"))),
            },
        }
    }

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_str("NaN")
        } else if *value == f64::INFINITY {
            serializer.serialize_str("Infinity")
        } else if *value == f64::NEG_INFINITY {
            serializer.serialize_str("-Infinity")
        } else {
            serializer.serialize_f64(*value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        decode(Raw::deserialize(deserializer)?)
    }

    pub mod list {
        use serde::ser::SerializeSeq;
        use serde::{Deserialize, Deserializer, Serialize, Serializer};

        struct Score(f64);

        impl Serialize for Score {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                super::serialize(&self.0, serializer)
            }
        }

        pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
            let mut seq = serializer.serialize_seq(Some(values.len()))?;
            for v in values {
                seq.serialize_element(&Score(*v))?;
            }
            seq.end()
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Vec<f64>, D::Error> {
            Vec::<super::Raw>::deserialize(deserializer)?
                .into_iter()
                .map(super::decode)
                .collect()
        }
    }
}
