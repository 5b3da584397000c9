//! Image-directory frame source.

use std::path::{Path, PathBuf};

use super::{Frame, FrameSource};
use crate::error::Result;

/// Replays the images of a directory, in file-name order, as if they came from a camera.
///
/// Files that fail to decode are skipped. Once every file has been played the source closes,
/// unless it was created with `looping`. A directory with nothing decodable in it closes too.
pub struct ImageDirSource {
    files: Vec<PathBuf>,
    next: usize,
    looping: bool,
    open: bool,
    frame_count: u64,
}

impl ImageDirSource {
    pub fn new(dir: &Path, looping: bool) -> Result<Self> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        files.sort();

        log::info!("Replaying {} images from {:?}", files.len(), dir);

        Ok(Self {
            open: !files.is_empty(),
            files,
            next: 0,
            looping,
            frame_count: 0,
        })
    }
}

impl FrameSource for ImageDirSource {
    fn is_open(&self) -> bool {
        self.open
    }

    fn read(&mut self) -> Option<Frame> {
        if !self.open {
            return None;
        }

        // One pass over the directory at most.
        for _ in 0..self.files.len() {
            if self.next >= self.files.len() {
                if !self.looping {
                    self.open = false;
                    return None;
                }
                self.next = 0;
            }

            let path = &self.files[self.next];
            self.next += 1;

            match image::open(path) {
                Ok(img) => {
                    let frame = Frame::new(img.to_rgb8(), self.frame_count);
                    self.frame_count += 1;
                    return Some(frame);
                }
                Err(e) => log::warn!("Skipping {:?}: {}", path, e),
            }
        }

        log::error!("No decodable images left to replay");
        self.open = false;
        None
    }

    fn close(&mut self) {
        self.open = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::test_support::gradient;

    #[test]
    fn test_replays_in_order_then_closes() {
        let dir = tempfile::tempdir().unwrap();
        gradient(3, 2).save(dir.path().join("0.png")).unwrap();
        gradient(5, 4).save(dir.path().join("1.png")).unwrap();

        let mut source = ImageDirSource::new(dir.path(), false).unwrap();
        assert!(source.is_open());
        assert_eq!(source.read().unwrap().width(), 3);
        assert_eq!(source.read().unwrap().width(), 5);
        assert!(source.read().is_none());
        assert!(!source.is_open());
    }

    #[test]
    fn test_looping_replay_skips_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        gradient(3, 2).save(dir.path().join("0.png")).unwrap();
        std::fs::write(dir.path().join("1.png"), b"not an image").unwrap();
        gradient(5, 4).save(dir.path().join("2.png")).unwrap();

        let mut source = ImageDirSource::new(dir.path(), true).unwrap();
        let widths: Vec<u32> = (0..4).map(|_| source.read().unwrap().width()).collect();
        assert_eq!(widths, vec![3, 5, 3, 5]);
        assert!(source.is_open());
    }

    #[test]
    fn test_nothing_decodable_closes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("0.png"), b"junk").unwrap();
        std::fs::write(dir.path().join("1.png"), b"junk").unwrap();

        let mut source = ImageDirSource::new(dir.path(), true).unwrap();
        assert!(source.read().is_none());
        assert!(!source.is_open());
    }

    #[test]
    fn test_empty_directory_is_not_open() {
        let dir = tempfile::tempdir().unwrap();
        let source = ImageDirSource::new(dir.path(), true).unwrap();
        assert!(!source.is_open());
    }
}
