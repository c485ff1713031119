// io.rs — Directory loader and result writer.
//
// Both sit outside the timed region. The loader is the only place that
// sees undecodable or empty files; it drops them with a warning, so every
// `Frame` the pipelines receive has at least one pixel.
//
// Output layout:
//
//   <root>/cpu/<id>   host results
//   <root>/gpu/<id>   accelerated results
//
// The identifier is the input file name, so the encoder is picked from the
// same extension the input had.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use crate::image::{ColorImage, Frame, ProcessedFrame};
use crate::stages::ExecutionPath;

#[derive(Debug, Error)]
pub enum FrameIoError {
    #[error("cannot read input directory {path}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot create output directory {path}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot write {path}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| extensions.iter().any(|want| want.eq_ignore_ascii_case(e)))
}

/// Decode every file in `dir` whose extension is in `extensions`.
///
/// Files are returned sorted by name. Each frame's identifier is its file
/// name. Files that fail to decode or have no pixels are skipped.
pub fn load_frames(dir: &Path, extensions: &[String]) -> Result<Vec<Frame>, FrameIoError> {
    let entries = fs::read_dir(dir).map_err(|source| FrameIoError::ReadDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && has_extension(p, extensions))
        .collect();
    paths.sort();

    let mut frames = Vec::with_capacity(paths.len());
    for path in paths {
        let Some(id) = path.file_name().and_then(|n| n.to_str()).map(str::to_owned) else {
            warn!(path = %path.display(), "skipping file with non-UTF-8 name");
            continue;
        };
        let decoded = match image::open(&path) {
            Ok(img) => img.to_rgb8(),
            Err(e) => {
                warn!(file = %id, error = %e, "skipping undecodable image");
                continue;
            }
        };
        let (w, h) = decoded.dimensions();
        if w == 0 || h == 0 {
            warn!(file = %id, "skipping empty image");
            continue;
        }
        debug!(file = %id, width = w, height = h, "loaded");
        let image = ColorImage::from_vec(w as usize, h as usize, 3, decoded.into_raw());
        frames.push(Frame::new(id, image));
    }
    Ok(frames)
}

/// Writes processed frames into per-path subdirectories of a root.
#[derive(Debug, Clone)]
pub struct FrameWriter {
    host_dir: PathBuf,
    accelerated_dir: PathBuf,
}

impl FrameWriter {
    /// Create `<root>/cpu` and `<root>/gpu`.
    pub fn new(root: &Path) -> Result<Self, FrameIoError> {
        let host_dir = root.join("cpu");
        let accelerated_dir = root.join("gpu");
        for dir in [&host_dir, &accelerated_dir] {
            fs::create_dir_all(dir).map_err(|source| FrameIoError::CreateDir {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(FrameWriter { host_dir, accelerated_dir })
    }

    pub fn dir_for(&self, path: ExecutionPath) -> &Path {
        match path {
            ExecutionPath::Host => &self.host_dir,
            ExecutionPath::Accelerated => &self.accelerated_dir,
        }
    }

    /// Encode one frame. The format follows the identifier's extension.
    pub fn write(&self, frame: &ProcessedFrame, path: ExecutionPath) -> Result<PathBuf, FrameIoError> {
        let dest = self.dir_for(path).join(&frame.id);
        let img = &frame.image;
        image::save_buffer(
            &dest,
            &img.to_packed_vec(),
            img.width() as u32,
            img.height() as u32,
            image::ExtendedColorType::L8,
        )
        .map_err(|source| FrameIoError::Encode { path: dest.clone(), source })?;
        Ok(dest)
    }

    /// Write a whole output sequence.
    pub fn write_all(&self, frames: &[ProcessedFrame], path: ExecutionPath) -> Result<(), FrameIoError> {
        for f in frames {
            self.write(f, path)?;
        }
        Ok(())
    }
}
