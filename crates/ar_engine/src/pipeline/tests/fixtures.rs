//! Scripted collaborators for driving the pipeline frame by frame

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use image::RgbImage;
use nalgebra::Rotation3;

use crate::assets::{
    AssetError, GeometryData, GeometryLoader, LoadOptions, MaterialData, MaterialLoader,
    MaterialRange, ModelCatalog, ModelEntry, TexturePixels, Vertex,
};
use crate::core::config::ApplicationConfig;
use crate::foundation::math::Vec3d;
use crate::input::{Command, CommandSender};
use crate::pipeline::{ArPipeline, Collaborators};
use crate::render::{RecordingBackend, SharedRecording};
use crate::vision::pose::marker_object_points;
use crate::vision::{
    CameraIntrinsics, DetectedMarker, DetectionError, Frame, FramePoll, FrameSource,
    FrameSourceError, MarkerDetector, MarkerDictionary,
};

pub const WIDTH: u32 = 640;
pub const HEIGHT: u32 = 480;

/// One scripted acquisition
#[derive(Debug, Clone)]
pub enum Step {
    /// Deliver a frame; `true` puts a marker in it
    Frame(bool),
    /// Report a timeout
    Timeout,
    /// Report a detection fault for this frame
    DetectionFault,
    /// Device failure
    Fail,
}

pub fn intrinsics() -> CameraIntrinsics {
    CameraIntrinsics::from_fov(WIDTH, HEIGHT, 45.0, 0.01, 100.0)
}

/// Corners of a marker facing the camera 0.6 m away
pub fn marker_corners(size: f64) -> [[f64; 2]; 4] {
    let k = intrinsics();
    let rotation = Rotation3::from_euler_angles(std::f64::consts::PI + 0.2, 0.1, 0.0);
    let translation = Vec3d::new(0.02, -0.01, 0.6);
    marker_object_points(size).map(|p| {
        let pixel = k
            .project(&(rotation * Vec3d::new(p[0], p[1], 0.0) + translation))
            .unwrap();
        [pixel.x, pixel.y]
    })
}

struct ScriptedSource {
    resolution: (u32, u32),
    steps: VecDeque<Step>,
    next_index: u64,
    commands: Rc<RefCell<HashMap<u64, Vec<Command>>>>,
    sender: Rc<RefCell<Option<CommandSender>>>,
    faults: Rc<RefCell<Vec<u64>>>,
    released: Rc<Cell<bool>>,
}

impl FrameSource for ScriptedSource {
    fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    fn next_frame(&mut self, _timeout: Duration) -> Result<FramePoll, FrameSourceError> {
        let Some(step) = self.steps.pop_front() else {
            return Ok(FramePoll::Closed);
        };
        let index = self.next_index;
        self.next_index += 1;

        // Commands typed while this frame is in flight
        if let Some(commands) = self.commands.borrow_mut().remove(&index) {
            if let Some(sender) = self.sender.borrow().as_ref() {
                for command in commands {
                    sender.send(command);
                }
            }
        }

        match step {
            Step::Frame(_) => {}
            Step::DetectionFault => self.faults.borrow_mut().push(index),
            Step::Timeout => return Ok(FramePoll::Timeout),
            Step::Fail => {
                return Err(FrameSourceError::Read("device unplugged".to_string()));
            }
        }
        let (w, h) = self.resolution;
        Ok(FramePoll::Frame(Frame::new(index, RgbImage::new(w, h))))
    }

    fn release(&mut self) {
        self.released.set(true);
    }
}

struct ScriptedDetector {
    markers: HashMap<u64, Vec<DetectedMarker>>,
    faults: Rc<RefCell<Vec<u64>>>,
    released: Rc<Cell<bool>>,
}

impl MarkerDetector for ScriptedDetector {
    fn detect_markers(
        &mut self,
        frame: &Frame,
        _dictionary: &MarkerDictionary,
    ) -> Result<Vec<DetectedMarker>, DetectionError> {
        if self.faults.borrow().contains(&frame.index()) {
            return Err(DetectionError::BackendFault("scripted fault".to_string()));
        }
        Ok(self.markers.get(&frame.index()).cloned().unwrap_or_default())
    }

    fn release(&mut self) {
        self.released.set(true);
    }
}

/// One textured triangle per model; paths containing "missing" do not exist
struct FakeGeometry {
    loads: Rc<RefCell<Vec<PathBuf>>>,
}

impl GeometryLoader for FakeGeometry {
    fn load_model(&mut self, path: &Path, _options: LoadOptions) -> Result<GeometryData, AssetError> {
        if path.to_string_lossy().contains("missing") {
            return Err(AssetError::NotFound(path.to_path_buf()));
        }
        self.loads.borrow_mut().push(path.to_path_buf());
        Ok(GeometryData {
            triangles: vec![[Vertex::default(); 3]],
            ranges: vec![MaterialRange {
                material: Some(0),
                first_triangle: 0,
                triangle_count: 1,
            }],
            material_names: vec!["skin".to_string()],
            material_libraries: vec![path.with_extension("mtl")],
        })
    }
}

struct FakeMaterials;

impl MaterialLoader for FakeMaterials {
    fn load_materials(&mut self, _path: &Path) -> Result<Vec<MaterialData>, AssetError> {
        Ok(vec![MaterialData {
            texture: Some(TexturePixels {
                path: PathBuf::from("skin.png"),
                width: 2,
                height: 2,
                rgba: vec![128; 16],
            }),
            ..MaterialData::fallback("skin")
        }])
    }
}

/// Pipeline plus handles for observing its collaborators
pub struct Harness {
    pub pipeline: ArPipeline,
    pub backend: SharedRecording,
    pub loads: Rc<RefCell<Vec<PathBuf>>>,
    pub source_released: Rc<Cell<bool>>,
    pub detector_released: Rc<Cell<bool>>,
}

impl Harness {
    /// Geometry files loaded so far, as file stems
    pub fn loaded_models(&self) -> Vec<String> {
        self.loads
            .borrow()
            .iter()
            .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .collect()
    }
}

pub struct HarnessBuilder {
    config: ApplicationConfig,
    steps: Vec<Step>,
    commands: HashMap<u64, Vec<Command>>,
    resolution: (u32, u32),
    backend: RecordingBackend,
}

impl HarnessBuilder {
    pub fn new(steps: Vec<Step>) -> Self {
        let mut models = ModelCatalog::empty();
        for id in ["fox", "rocket", "missing"] {
            models.insert(id, ModelEntry::new(format!("models/{id}.obj"), 1.0));
        }
        let mut config = ApplicationConfig::default();
        config.models = models;
        config.display.window_width = WIDTH;
        config.display.window_height = HEIGHT;

        Self {
            config,
            steps,
            commands: HashMap::new(),
            resolution: (WIDTH, HEIGHT),
            backend: RecordingBackend::new(),
        }
    }

    pub fn config(mut self, edit: impl FnOnce(&mut ApplicationConfig)) -> Self {
        edit(&mut self.config);
        self
    }

    /// Send `command` through the queue while frame `index` is acquired
    pub fn command_during(mut self, index: u64, command: Command) -> Self {
        self.commands.entry(index).or_default().push(command);
        self
    }

    pub fn resolution(mut self, width: u32, height: u32) -> Self {
        self.resolution = (width, height);
        self
    }

    pub fn backend(mut self, backend: RecordingBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn build(self) -> Harness {
        let size = self.config.marker.size;
        let markers = self
            .steps
            .iter()
            .enumerate()
            .filter(|(_, step)| matches!(step, Step::Frame(true)))
            .map(|(i, _)| {
                let marker = DetectedMarker {
                    id: 7,
                    corners: marker_corners(size),
                    confidence: 1.0,
                };
                (i as u64, vec![marker])
            })
            .collect();

        let faults = Rc::new(RefCell::new(Vec::new()));
        let sender = Rc::new(RefCell::new(None));
        let source_released = Rc::new(Cell::new(false));
        let detector_released = Rc::new(Cell::new(false));
        let loads = Rc::new(RefCell::new(Vec::new()));
        let backend = SharedRecording::new(self.backend);

        let collaborators = Collaborators {
            frame_source: Box::new(ScriptedSource {
                resolution: self.resolution,
                steps: self.steps.into(),
                next_index: 0,
                commands: Rc::new(RefCell::new(self.commands)),
                sender: sender.clone(),
                faults: faults.clone(),
                released: source_released.clone(),
            }),
            detector: Box::new(ScriptedDetector {
                markers,
                faults,
                released: detector_released.clone(),
            }),
            geometry_loader: Box::new(FakeGeometry {
                loads: loads.clone(),
            }),
            material_loader: Box::new(FakeMaterials),
            backend: Box::new(backend.clone()),
        };

        let pipeline = ArPipeline::new(&self.config, intrinsics(), collaborators).unwrap();
        *sender.borrow_mut() = Some(pipeline.command_sender());

        Harness {
            pipeline,
            backend,
            loads,
            source_released,
            detector_released,
        }
    }
}
