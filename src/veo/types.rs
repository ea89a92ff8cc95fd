//! Wire types for the Gemini long-running video generation endpoints.

use serde::{Deserialize, Serialize};

use crate::request::GenerationRequest;

/// Number of videos requested per operation.
pub const SAMPLE_COUNT: u32 = 1;

/// Body of a `predictLongRunning` call.
#[derive(Debug, Serialize)]
pub(crate) struct PredictRequest<'a> {
    pub instances: Vec<Instance<'a>>,
    pub parameters: Parameters<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct Instance<'a> {
    pub prompt: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct Parameters<'a> {
    #[serde(rename = "sampleCount")]
    pub sample_count: u32,
    #[serde(rename = "aspectRatio")]
    pub aspect_ratio: &'a str,
    pub resolution: &'a str,
}

impl<'a> PredictRequest<'a> {
    pub fn from_request(request: &'a GenerationRequest) -> Self {
        Self {
            instances: vec![Instance {
                prompt: request.prompt(),
            }],
            parameters: Parameters {
                sample_count: SAMPLE_COUNT,
                aspect_ratio: request.aspect_ratio().as_str(),
                resolution: request.resolution().as_str(),
            },
        }
    }
}

/// Handle to an in-flight generation job, as last reported by the service.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Operation {
    pub name: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub response: Option<OperationResponse>,
    #[serde(default)]
    pub error: Option<OperationError>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OperationResponse {
    #[serde(rename = "generateVideoResponse", default)]
    pub generate_video_response: Option<GenerateVideoResponse>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GenerateVideoResponse {
    #[serde(rename = "generatedSamples", default)]
    pub generated_samples: Vec<GeneratedSample>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeneratedSample {
    #[serde(default)]
    pub video: Option<Video>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Video {
    #[serde(default)]
    pub uri: Option<String>,
}

/// Error payload attached to an operation or an error response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OperationError {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// Envelope of a non-2xx JSON response.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub error: OperationError,
}

impl Operation {
    /// An operation that has not finished yet.
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            done: false,
            response: None,
            error: None,
        }
    }

    /// A finished operation carrying one sample per URI.
    pub fn completed<I, S>(name: impl Into<String>, uris: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let generated_samples = uris
            .into_iter()
            .map(|uri| GeneratedSample {
                video: Some(Video {
                    uri: Some(uri.into()),
                }),
            })
            .collect();

        Self {
            name: name.into(),
            done: true,
            response: Some(OperationResponse {
                generate_video_response: Some(GenerateVideoResponse { generated_samples }),
            }),
            error: None,
        }
    }

    /// A finished operation that reports an error.
    pub fn failed(name: impl Into<String>, code: i32, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            done: true,
            response: None,
            error: Some(OperationError {
                code,
                message: message.into(),
                status: None,
            }),
        }
    }

    /// URI of the first generated video, if any.
    pub fn first_video_uri(&self) -> Option<&str> {
        self.response
            .as_ref()?
            .generate_video_response
            .as_ref()?
            .generated_samples
            .first()?
            .video
            .as_ref()?
            .uri
            .as_deref()
            .filter(|uri| !uri.is_empty())
    }
}
