pub mod batch_executor;
pub mod config;
pub mod error;
pub mod face_pipeline;
pub mod pipeline_logger;
pub mod response;
