//! Generation module - request normalization and orchestration

pub mod normalizer;
pub mod orchestrator;
pub mod reference;
pub mod request;

pub use normalizer::RequestNormalizer;
pub use orchestrator::GenerationOrchestrator;
pub use reference::{StyleReference, TempReference};
pub use request::{
    ExampleRequest, GenerationRequest, GenerationResult, RawExampleRequest, RawGenerateRequest,
    RawUpscaleRequest, UpscaleRequest,
};
