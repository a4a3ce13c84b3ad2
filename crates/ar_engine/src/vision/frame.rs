//! Camera frames and the frame source seam

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::RgbImage;
use thiserror::Error;

/// A decoded camera frame
///
/// The pixel buffer is reference counted so the pipeline can keep the last
/// frame around for re-presentation without copying it.
#[derive(Debug, Clone)]
pub struct Frame {
    index: u64,
    captured_at: Instant,
    image: Arc<RgbImage>,
}

impl Frame {
    /// Wrap a decoded RGB image as frame number `index`
    pub fn new(index: u64, image: RgbImage) -> Self {
        Self {
            index,
            captured_at: Instant::now(),
            image: Arc::new(image),
        }
    }

    /// Monotonic frame number assigned by the source
    pub fn index(&self) -> u64 {
        self.index
    }

    /// When the frame was acquired
    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// Frame width in pixels
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Frame height in pixels
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Frame resolution as `(width, height)`
    pub fn resolution(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// The RGB pixel buffer
    pub fn image(&self) -> &RgbImage {
        &self.image
    }
}

/// Outcome of asking a source for the next frame
#[derive(Debug, Clone)]
pub enum FramePoll {
    /// A new frame is available
    Frame(Frame),
    /// Nothing arrived within the timeout
    Timeout,
    /// The stream has ended; no further frames will arrive
    Closed,
}

/// Frame source errors
#[derive(Error, Debug)]
pub enum FrameSourceError {
    /// The capture device could not be opened
    #[error("Cannot open camera {device}: {reason}")]
    DeviceUnavailable {
        /// Device index or path that failed
        device: String,
        /// Why it failed
        reason: String,
    },

    /// A frame could not be read or decoded
    #[error("Frame read failed: {0}")]
    Read(String),
}

/// Source of camera frames
///
/// Implementations own the capture device. `next_frame` must not block for
/// longer than `timeout`.
pub trait FrameSource {
    /// Resolution of the frames this source produces
    fn resolution(&self) -> (u32, u32);

    /// Fetch the next frame, waiting at most `timeout`
    fn next_frame(&mut self, timeout: Duration) -> Result<FramePoll, FrameSourceError>;

    /// Release the capture device
    fn release(&mut self) {}
}

/// Frame source that replays a directory of still images in name order
///
/// Stands in for a live camera when running offline. All images must share
/// one resolution; the first image defines it.
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    cursor: usize,
    resolution: (u32, u32),
}

impl ImageSequenceSource {
    /// File extensions picked up from the directory
    const EXTENSIONS: [&'static str; 3] = ["png", "jpg", "jpeg"];

    /// Open a directory of frames
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, FrameSourceError> {
        let dir = dir.as_ref();
        let unavailable = |reason: String| FrameSourceError::DeviceUnavailable {
            device: dir.display().to_string(),
            reason,
        };

        let entries = std::fs::read_dir(dir).map_err(|e| unavailable(e.to_string()))?;
        let mut paths: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| Self::EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        let first = paths
            .first()
            .ok_or_else(|| unavailable("no image frames found".to_string()))?;
        let resolution = image::image_dimensions(first).map_err(|e| unavailable(e.to_string()))?;

        log::info!(
            "Frame sequence opened: {} frames at {}x{} from {:?}",
            paths.len(),
            resolution.0,
            resolution.1,
            dir
        );

        Ok(Self {
            paths,
            cursor: 0,
            resolution,
        })
    }

    /// Number of frames in the sequence
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Whether the sequence holds no frames
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl FrameSource for ImageSequenceSource {
    fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    fn next_frame(&mut self, _timeout: Duration) -> Result<FramePoll, FrameSourceError> {
        let Some(path) = self.paths.get(self.cursor) else {
            return Ok(FramePoll::Closed);
        };

        let image = image::open(path)
            .map_err(|e| FrameSourceError::Read(format!("{}: {}", path.display(), e)))?
            .to_rgb8();
        let index = self.cursor as u64;
        self.cursor += 1;

        Ok(FramePoll::Frame(Frame::new(index, image)))
    }

    fn release(&mut self) {
        self.cursor = self.paths.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_replays_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.png", "a.png"] {
            RgbImage::new(8, 4).save(dir.path().join(name)).unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut source = ImageSequenceSource::open(dir.path()).unwrap();
        assert_eq!(source.len(), 2);
        assert_eq!(source.resolution(), (8, 4));

        let timeout = Duration::from_millis(10);
        for expected in 0..2 {
            match source.next_frame(timeout).unwrap() {
                FramePoll::Frame(frame) => {
                    assert_eq!(frame.index(), expected);
                    assert_eq!(frame.resolution(), (8, 4));
                }
                other => panic!("expected a frame, got {other:?}"),
            }
        }
        assert!(matches!(source.next_frame(timeout).unwrap(), FramePoll::Closed));
    }

    #[test]
    fn test_empty_directory_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ImageSequenceSource::open(dir.path()),
            Err(FrameSourceError::DeviceUnavailable { .. })
        ));
    }
}
