pub mod extraction;
pub mod pipeline_models;
pub mod pipeline_service;

pub use pipeline_models::{ChatMessage, PipelineOutcome};
pub use pipeline_service::{
    AgentBuilder, ArtifactStore, DesignPipeline, ModelingAgent, PipelineError,
};
