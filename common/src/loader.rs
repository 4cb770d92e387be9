use image::ImageReader;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::ComparatorConfig;
use crate::frame::{Frame, FrameSequence};

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to list frame directory {dir}: {source}")]
    ReadDir {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// File names in `dir` ending in `.{extension}`, sorted ascending.
///
/// Lexicographic order is the frame order, so writers are expected to
/// zero-pad frame indices.
pub fn frame_files(dir: &Path, extension: &str) -> Result<Vec<String>, LoadError> {
    let read_dir_err = |source| LoadError::ReadDir {
        dir: dir.to_path_buf(),
        source,
    };
    let suffix = format!(".{extension}");

    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(read_dir_err)? {
        let entry = entry.map_err(read_dir_err)?;
        match entry.file_name().into_string() {
            Ok(name) if name.ends_with(&suffix) => names.push(name),
            Ok(_) => {}
            Err(raw) => debug!(name = ?raw, "skipping non UTF-8 file name"),
        }
    }
    names.sort();
    Ok(names)
}

/// Decode every frame file in `dir` into a [`FrameSequence`].
///
/// A file that cannot be opened or decoded is logged and left out; the
/// returned sequence only holds frames that decoded. An empty sequence is
/// a valid result and is for the caller to handle.
pub fn load(dir: &Path, config: &ComparatorConfig) -> Result<FrameSequence, LoadError> {
    let names = frame_files(dir, &config.extension)?;
    let mut sequence = FrameSequence::new();

    for name in names {
        let path = dir.join(&name);
        let decoded = ImageReader::open(&path)
            .map_err(image::ImageError::IoError)
            .and_then(|reader| reader.with_guessed_format().map_err(image::ImageError::IoError))
            .and_then(|reader| reader.decode());

        match decoded {
            Ok(img) => {
                let frame = Frame::from_rgb32f(&img.to_rgb32f(), config.channel_order);
                sequence.push(name, frame);
            }
            Err(e) => {
                warn!(file = %path.display(), error = %e, "failed to decode frame, skipping");
            }
        }
    }

    debug!(
        dir = %dir.display(),
        frames = sequence.len(),
        "frame directory loaded"
    );
    Ok(sequence)
}
