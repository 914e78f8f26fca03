//! Service layer module

pub mod skin_service;
pub mod types;

pub use skin_service::SkinAnalysisService;
pub use types::*;
