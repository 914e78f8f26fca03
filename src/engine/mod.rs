//! Inference engine module
//!
//! OpenVINO face models behind the `FaceLandmarker` trait:
//! - SCRFD face detection
//! - 68-point landmarks
//! - Age, gender and expression attributes
//! - Load-once model pool

pub mod attribute;
pub mod detector;
pub mod landmarks;
pub mod pool;
pub mod preprocess;
pub mod traits;

pub use pool::{FaceModels, ModelPool};
pub use traits::{FaceLandmarker, FaceObservation, LandmarkerSource, NoLandmarker};
