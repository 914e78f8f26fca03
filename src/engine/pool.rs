//! Model Pool
//!
//! Loads the face models once per process, on first use. Concurrent callers
//! that arrive during the load wait for it instead of starting their own.
//! A failed load is remembered and reported; it is not retried.

use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use image::DynamicImage;
use ndarray::Array4;
use openvino::{CompiledModel, Core, ElementType, InferRequest, Shape, Tensor};
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{error, info, warn};

use super::attribute::AttributeAnalyzer;
use super::detector::FaceDetector;
use super::landmarks::LandmarkRegressor;
use super::preprocess::crop_face_square;
use super::traits::{FaceLandmarker, FaceObservation, LandmarkerSource};
use crate::config::{InferenceConfig, ModelsConfig};

/// Wrapper for OpenVINO CompiledModel that implements Send + Sync
#[derive(Clone)]
pub struct SafeCompiledModel(pub Arc<CompiledModel>);
unsafe impl Send for SafeCompiledModel {}
unsafe impl Sync for SafeCompiledModel {}

impl SafeCompiledModel {
    /// Create an inference request
    /// OpenVINO CompiledModel methods are thread-safe in C++, but Rust bindings
    /// require &mut self.
    pub fn create_infer_request(&self) -> Result<InferRequest> {
        unsafe {
            let ptr = Arc::as_ptr(&self.0) as *mut CompiledModel;
            (*ptr).create_infer_request().map_err(|e| e.into())
        }
    }

    /// Run one inference on an NCHW input and hand back the finished request
    pub fn infer(&self, input_tensor: &Array4<f32>) -> Result<InferRequest> {
        let dims: Vec<i64> = input_tensor.shape().iter().map(|&d| d as i64).collect();
        let input_data = input_tensor
            .as_slice()
            .context("Input tensor is not contiguous")?;

        let mut request = self.create_infer_request()?;
        let mut input = Tensor::new(ElementType::F32, &Shape::new(&dims)?)?;
        unsafe {
            let tensor_data = input.get_raw_data_mut()?.as_mut_ptr() as *mut f32;
            std::ptr::copy_nonoverlapping(input_data.as_ptr(), tensor_data, input_data.len());
        }

        request.set_input_tensor(&input)?;
        request.infer()?;
        Ok(request)
    }
}

impl Deref for SafeCompiledModel {
    type Target = CompiledModel;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Read a whole output tensor as f32
pub fn read_tensor_f32(tensor: &Tensor) -> Result<Vec<f32>> {
    let total_elements: i64 = tensor.get_shape()?.get_dimensions().iter().product();

    let data: Vec<f32> = unsafe {
        let ptr = tensor.get_raw_data()?.as_ptr() as *const f32;
        std::slice::from_raw_parts(ptr, total_elements as usize).to_vec()
    };

    Ok(data)
}

/// Model types that can be loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelType {
    Detector,
    Landmarks,
    GenderAge,
    Emotion,
}

impl ModelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::Detector => "detector",
            ModelType::Landmarks => "landmarks",
            ModelType::GenderAge => "gender_age",
            ModelType::Emotion => "emotion",
        }
    }
}

/// Lifecycle of a lazily loaded, process-wide resource
#[derive(Debug)]
pub enum ModelState<T> {
    Uninitialized,
    Loading,
    Ready(Arc<T>),
    Failed(String),
}

impl<T> ModelState<T> {
    pub fn describe(&self) -> String {
        match self {
            ModelState::Uninitialized => "uninitialized".to_string(),
            ModelState::Loading => "loading".to_string(),
            ModelState::Ready(_) => "ready".to_string(),
            ModelState::Failed(reason) => format!("failed: {}", reason),
        }
    }
}

/// Load-once cell. The first caller starts the loader as its own task, so
/// the load completes even if that caller goes away. Every caller, first
/// or not, waits for the outcome on a watch channel.
pub struct ModelCell<T> {
    inner: Arc<CellInner<T>>,
}

struct CellInner<T> {
    state: RwLock<ModelState<T>>,
    settled: watch::Sender<bool>,
}

impl<T: Send + Sync + 'static> ModelCell<T> {
    pub fn new() -> Self {
        let (settled, _) = watch::channel(false);
        Self {
            inner: Arc::new(CellInner {
                state: RwLock::new(ModelState::Uninitialized),
                settled,
            }),
        }
    }

    /// The loaded value, if loading has already finished successfully
    pub fn get(&self) -> Option<Arc<T>> {
        match &*self.inner.state.read() {
            ModelState::Ready(value) => Some(value.clone()),
            _ => None,
        }
    }

    pub async fn get_or_load<F>(&self, name: &str, load: F) -> Option<Arc<T>>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        // Fast path
        if let Some(done) = self.settled() {
            return done;
        }

        // Subscribe before starting so the completion cannot be missed
        let mut settled = self.inner.settled.subscribe();

        let first = {
            let mut state = self.inner.state.write();
            match *state {
                ModelState::Uninitialized => {
                    *state = ModelState::Loading;
                    true
                }
                _ => false,
            }
        };
        if first {
            self.spawn_load(name.to_string(), load);
        }

        if settled.wait_for(|done| *done).await.is_err() {
            warn!("{} loader went away before finishing", name);
        }
        self.settled().flatten()
    }

    pub fn describe(&self) -> String {
        self.inner.state.read().describe()
    }

    fn spawn_load<F>(&self, name: String, load: F)
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            info!("Loading {}", name);
            let start = Instant::now();

            let outcome = match tokio::task::spawn_blocking(load).await {
                Ok(result) => result,
                Err(e) => Err(anyhow::anyhow!("loader task failed: {}", e)),
            };

            let next = match outcome {
                Ok(value) => {
                    info!("{} loaded in {:?}", name, start.elapsed());
                    ModelState::Ready(Arc::new(value))
                }
                Err(e) => {
                    error!("Failed to load {}: {:#}", name, e);
                    ModelState::Failed(format!("{:#}", e))
                }
            };
            *inner.state.write() = next;
            inner.settled.send_replace(true);
        });
    }

    /// `Some(outcome)` once loading has finished either way
    fn settled(&self) -> Option<Option<Arc<T>>> {
        match &*self.inner.state.read() {
            ModelState::Ready(value) => Some(Some(value.clone())),
            ModelState::Failed(_) => Some(None),
            ModelState::Uninitialized | ModelState::Loading => None,
        }
    }
}

impl<T: Send + Sync + 'static> Default for ModelCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Margin around the detector box for the landmark and attribute crops
const FACE_CROP_MARGIN: f32 = 0.1;

/// The compiled face model set
pub struct FaceModels {
    detector: FaceDetector,
    landmarks: LandmarkRegressor,
    /// Attribute models are optional; without them faces carry no details
    attributes: Option<AttributeAnalyzer>,
}

impl FaceModels {
    /// Read and compile every model. Detector and landmarks are required.
    pub fn load(device: &str, paths: &ModelsConfig) -> Result<Self> {
        let mut core = Core::new().context("Failed to initialise OpenVINO")?;

        let detector = compile(&mut core, device, ModelType::Detector, &paths.detector)?;
        let landmarks = compile(&mut core, device, ModelType::Landmarks, &paths.landmarks)?;

        let gender_age = compile(&mut core, device, ModelType::GenderAge, &paths.gender_age);
        let emotion = compile(&mut core, device, ModelType::Emotion, &paths.emotion);
        let attributes = match (gender_age, emotion) {
            (Ok(gender_age), emotion) => {
                let emotion = emotion
                    .map_err(|e| warn!("Emotion model unavailable, expressions disabled: {:#}", e))
                    .ok();
                Some(AttributeAnalyzer::new(gender_age, emotion))
            }
            (Err(e), _) => {
                warn!("Gender/age model unavailable, face details disabled: {:#}", e);
                None
            }
        };

        Ok(Self {
            detector: FaceDetector::new(detector),
            landmarks: LandmarkRegressor::new(landmarks),
            attributes,
        })
    }
}

fn compile(core: &mut Core, device: &str, model_type: ModelType, path: &Path) -> Result<SafeCompiledModel> {
    let path_str = path
        .to_str()
        .with_context(|| format!("Model path is not UTF-8: {}", path.display()))?;
    info!("Compiling {} model from {} on {}", model_type.as_str(), path_str, device);

    let model = core
        .read_model_from_file(path_str, "")
        .with_context(|| format!("Failed to read {} model", model_type.as_str()))?;
    let compiled = core
        .compile_model(&model, device.into())
        .with_context(|| format!("Failed to compile {} model", model_type.as_str()))?;

    Ok(SafeCompiledModel(Arc::new(compiled)))
}

impl FaceLandmarker for FaceModels {
    fn detect_best_face(&self, image: &DynamicImage, min_confidence: f32) -> Result<Option<FaceObservation>> {
        let Some(face) = self.detector.detect_best(image, min_confidence)? else {
            return Ok(None);
        };

        let (crop, (left, top)) = crop_face_square(image, face.x1, face.y1, face.x2, face.y2, FACE_CROP_MARGIN);
        let landmarks = self.landmarks.predict(&crop, (left, top))?;

        // Missing details never cost the face its regions
        let details = self.attributes.as_ref().and_then(|analyzer| {
            analyzer
                .analyze(&crop)
                .map_err(|e| warn!("Face attribute analysis failed: {:#}", e))
                .ok()
        });

        Ok(Some(FaceObservation {
            x1: face.x1,
            y1: face.y1,
            x2: face.x2,
            y2: face.y2,
            confidence: face.confidence,
            landmarks,
            details,
        }))
    }
}

/// Process-wide face model pool
pub struct ModelPool {
    device: String,
    paths: ModelsConfig,
    models: ModelCell<FaceModels>,
}

impl ModelPool {
    pub fn new(inference: &InferenceConfig, paths: &ModelsConfig) -> Self {
        Self {
            device: inference.device.clone(),
            paths: paths.clone(),
            models: ModelCell::new(),
        }
    }

    /// Load the model set now, or return the earlier outcome
    pub async fn models(&self) -> Option<Arc<FaceModels>> {
        let device = self.device.clone();
        let paths = self.paths.clone();
        self.models
            .get_or_load("face models", move || FaceModels::load(&device, &paths))
            .await
    }

    pub fn is_ready(&self) -> bool {
        self.models.get().is_some()
    }
}

#[async_trait]
impl LandmarkerSource for ModelPool {
    async fn landmarker(&self) -> Option<Arc<dyn FaceLandmarker>> {
        self.models().await.map(|models| models as Arc<dyn FaceLandmarker>)
    }

    fn status(&self) -> String {
        self.models.describe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_model_type_as_str() {
        assert_eq!(ModelType::Detector.as_str(), "detector");
        assert_eq!(ModelType::Landmarks.as_str(), "landmarks");
    }

    #[tokio::test]
    async fn test_cell_loads_once() {
        let cell = Arc::new(ModelCell::<u32>::new());
        let loads = Arc::new(AtomicUsize::new(0));
        assert_eq!(cell.describe(), "uninitialized");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cell = cell.clone();
            let loads = loads.clone();
            handles.push(tokio::spawn(async move {
                cell.get_or_load("test", move || {
                    loads.fetch_add(1, Ordering::SeqCst);
                    std::thread::sleep(std::time::Duration::from_millis(20));
                    Ok(7)
                })
                .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().as_deref(), Some(&7));
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(cell.describe(), "ready");
        assert_eq!(cell.get().as_deref(), Some(&7));
    }

    fn slow_loader(loads: Arc<AtomicUsize>) -> impl FnOnce() -> Result<u32> + Send + 'static {
        move || {
            loads.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(300));
            Ok(2)
        }
    }

    #[tokio::test]
    async fn test_cell_load_survives_dropped_caller() {
        let cell = Arc::new(ModelCell::<u32>::new());
        let loads = Arc::new(AtomicUsize::new(0));

        let first = {
            let cell = cell.clone();
            let load = slow_loader(loads.clone());
            tokio::spawn(async move { cell.get_or_load("test", load).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        first.abort();
        assert!(first.await.unwrap_err().is_cancelled());
        assert_eq!(cell.describe(), "loading");

        // The second caller joins the running load instead of starting another
        let second = cell.get_or_load("test", slow_loader(loads.clone())).await;
        assert_eq!(second.as_deref(), Some(&2));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(cell.describe(), "ready");
    }

    #[tokio::test]
    async fn test_cell_failure_is_sticky() {
        let cell = ModelCell::<u32>::new();
        let first = cell.get_or_load("test", || Err(anyhow::anyhow!("missing file"))).await;
        assert!(first.is_none());
        assert_eq!(cell.describe(), "failed: missing file");

        // A later loader is never run
        let second = cell.get_or_load("test", || Ok(1)).await;
        assert!(second.is_none());
        assert!(cell.get().is_none());
    }

    #[test]
    fn test_pool_starts_uninitialized() {
        let config = crate::config::Config::default();
        let pool = ModelPool::new(&config.inference, &config.models);
        assert!(!pool.is_ready());
        assert_eq!(pool.status(), "uninitialized");
    }
}
