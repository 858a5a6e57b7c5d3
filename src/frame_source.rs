//! Frames read from a list of image files.

use image::RgbImage;
use std::path::{Path, PathBuf};

/// Iterates over image files as video frames.
///
/// Yields one item per path. An unreadable file yields `None`, which the
/// tracker treats as "no frame this tick".
#[derive(Debug, Clone)]
pub struct ImageSequence {
    paths: std::vec::IntoIter<PathBuf>,
}

impl ImageSequence {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            paths: paths.into_iter(),
        }
    }

    /// Size of the first readable image in `paths`, without decoding pixels.
    pub fn probe_dimensions<P: AsRef<Path>>(paths: &[P]) -> Option<(u32, u32)> {
        paths.iter().find_map(|path| image::image_dimensions(path).ok())
    }
}

impl Iterator for ImageSequence {
    type Item = Option<RgbImage>;

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.paths.next()?;
        match image::open(&path) {
            Ok(img) => Some(Some(img.to_rgb8())),
            Err(e) => {
                log::warn!("Failed to read frame {}: {e}", path.display());
                Some(None)
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.paths.size_hint()
    }
}

impl ExactSizeIterator for ImageSequence {}
