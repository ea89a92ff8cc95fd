//! Gemini Veo text-to-video integration.
//!
//! Submits generation jobs to the Gemini API, polls the returned long-running
//! operations, and downloads finished videos.

mod client;
mod types;

pub use client::{remove_partial, VeoClient, VeoError, VEO_API_BASE_URL};
pub use types::{
    GenerateVideoResponse, GeneratedSample, Operation, OperationError, OperationResponse, Video,
    SAMPLE_COUNT,
};
