//! Marker detection seam
//!
//! The detection primitive itself (thresholding, contour search, bit
//! decoding) lives behind [`MarkerDetector`]. The pipeline only sees marker
//! ids with their four image corners.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::frame::Frame;

/// Fiducial dictionary: bit-grid size and number of distinct ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MarkerDictionary {
    bits: u32,
    size: u32,
}

impl MarkerDictionary {
    /// Supported grid sizes
    const BITS: [u32; 4] = [4, 5, 6, 7];

    /// Supported dictionary sizes
    const SIZES: [u32; 4] = [50, 100, 250, 1000];

    /// Original ArUco dictionary name
    const ARUCO_ORIGINAL: &'static str = "DICT_ARUCO_ORIGINAL";

    /// Side length of the inner bit grid
    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Number of ids in the dictionary
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Whether `id` belongs to this dictionary
    pub fn contains(&self, id: u32) -> bool {
        id < self.size
    }
}

impl Default for MarkerDictionary {
    fn default() -> Self {
        Self { bits: 5, size: 100 }
    }
}

impl FromStr for MarkerDictionary {
    type Err = String;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        if name == Self::ARUCO_ORIGINAL {
            return Ok(Self { bits: 5, size: 1024 });
        }

        let unknown = || format!("Unknown marker dictionary '{name}'");
        let rest = name.strip_prefix("DICT_").ok_or_else(unknown)?;
        let (grid, size) = rest.split_once('_').ok_or_else(unknown)?;
        let (rows, cols) = grid.split_once('X').ok_or_else(unknown)?;

        let bits: u32 = rows.parse().map_err(|_| unknown())?;
        let size: u32 = size.parse().map_err(|_| unknown())?;
        if rows != cols || !Self::BITS.contains(&bits) || !Self::SIZES.contains(&size) {
            return Err(unknown());
        }

        Ok(Self { bits, size })
    }
}

impl fmt::Display for MarkerDictionary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.size == 1024 {
            f.write_str(Self::ARUCO_ORIGINAL)
        } else {
            write!(f, "DICT_{0}X{0}_{1}", self.bits, self.size)
        }
    }
}

/// One detected marker
///
/// Corners are pixel coordinates in detector order: top-left, top-right,
/// bottom-right, bottom-left of the printed marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedMarker {
    /// Marker id within the dictionary
    pub id: u32,
    /// Corner pixel coordinates
    pub corners: [[f64; 2]; 4],
    /// Detector confidence; higher is better
    #[serde(default = "DetectedMarker::full_confidence")]
    pub confidence: f32,
}

impl DetectedMarker {
    fn full_confidence() -> f32 {
        1.0
    }
}

/// Faults raised by the detection primitive
///
/// "No marker found" is not an error; detectors return an empty list.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectionError {
    /// The frame buffer cannot be processed
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// The detector itself failed
    #[error("Detection backend fault: {0}")]
    BackendFault(String),
}

/// Detection primitive
pub trait MarkerDetector {
    /// Find all markers of `dictionary` in `frame`
    fn detect_markers(
        &mut self,
        frame: &Frame,
        dictionary: &MarkerDictionary,
    ) -> Result<Vec<DetectedMarker>, DetectionError>;

    /// Release any backend resources
    fn release(&mut self) {}
}

/// Recorded detections keyed by frame index
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionLog {
    /// Detections per frame; absent frames have none
    pub frames: BTreeMap<u64, Vec<DetectedMarker>>,
}

/// Detector that replays a recorded [`DetectionLog`]
///
/// Pairs with `ImageSequenceSource` for offline runs.
#[derive(Debug, Default)]
pub struct ReplayDetector {
    log: DetectionLog,
    released: bool,
}

impl ReplayDetector {
    /// Replay an in-memory log
    pub fn new(log: DetectionLog) -> Self {
        Self {
            log,
            released: false,
        }
    }

    /// Load a RON detection log
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DetectionError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| DetectionError::BackendFault(format!("{}: {}", path.display(), e)))?;
        let log: DetectionLog = ron::from_str(&contents)
            .map_err(|e| DetectionError::BackendFault(format!("{}: {}", path.display(), e)))?;

        log::info!(
            "Loaded detection log with {} frames from {:?}",
            log.frames.len(),
            path
        );
        Ok(Self::new(log))
    }
}

impl MarkerDetector for ReplayDetector {
    fn detect_markers(
        &mut self,
        frame: &Frame,
        dictionary: &MarkerDictionary,
    ) -> Result<Vec<DetectedMarker>, DetectionError> {
        if self.released {
            return Err(DetectionError::BackendFault("detector released".to_string()));
        }
        if frame.width() == 0 || frame.height() == 0 {
            return Err(DetectionError::MalformedFrame("empty frame buffer".to_string()));
        }

        Ok(self
            .log
            .frames
            .get(&frame.index())
            .map(|markers| {
                markers
                    .iter()
                    .filter(|m| dictionary.contains(m.id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn release(&mut self) {
        self.released = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn test_parse_dictionary_names() {
        let dict: MarkerDictionary = "DICT_5X5_100".parse().unwrap();
        assert_eq!((dict.bits(), dict.size()), (5, 100));
        assert_eq!(dict.to_string(), "DICT_5X5_100");

        let original: MarkerDictionary = "DICT_ARUCO_ORIGINAL".parse().unwrap();
        assert_eq!(original.size(), 1024);

        for bad in ["DICT_5X4_100", "DICT_9X9_100", "DICT_5X5_77", "5X5_100", ""] {
            assert!(bad.parse::<MarkerDictionary>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn test_dictionary_membership() {
        let dict = MarkerDictionary::default();
        assert!(dict.contains(0));
        assert!(dict.contains(99));
        assert!(!dict.contains(100));
    }

    #[test]
    fn test_replay_filters_by_frame_and_dictionary() {
        let square = [[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0]];
        let mut log = DetectionLog::default();
        log.frames.insert(
            1,
            vec![
                DetectedMarker { id: 7, corners: square, confidence: 0.9 },
                DetectedMarker { id: 500, corners: square, confidence: 1.0 },
            ],
        );
        let mut detector = ReplayDetector::new(log);
        let dict = MarkerDictionary::default();

        let frame0 = Frame::new(0, RgbImage::new(4, 4));
        let frame1 = Frame::new(1, RgbImage::new(4, 4));
        assert!(detector.detect_markers(&frame0, &dict).unwrap().is_empty());

        let found = detector.detect_markers(&frame1, &dict).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, 7);
    }

    #[test]
    fn test_replay_log_from_ron() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("detections.ron");
        std::fs::write(
            &path,
            "(frames: {3: [(id: 4, corners: ((1.0, 2.0), (3.0, 2.0), (3.0, 4.0), (1.0, 4.0)))]})",
        )
        .unwrap();

        let mut detector = ReplayDetector::from_file(&path).unwrap();
        let frame = Frame::new(3, RgbImage::new(4, 4));
        let found = detector
            .detect_markers(&frame, &MarkerDictionary::default())
            .unwrap();
        assert_eq!(found[0].id, 4);
        assert_eq!(found[0].confidence, 1.0);
        assert_eq!(found[0].corners[2], [3.0, 4.0]);
    }

    #[test]
    fn test_malformed_frame_is_a_fault() {
        let mut detector = ReplayDetector::default();
        let frame = Frame::new(0, RgbImage::new(0, 0));
        assert!(matches!(
            detector.detect_markers(&frame, &MarkerDictionary::default()),
            Err(DetectionError::MalformedFrame(_))
        ));
    }
}
