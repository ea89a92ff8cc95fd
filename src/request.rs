//! Request Builder - turns the editable form fields into a generation request.
//!
//! The builder holds the live values the user edits (prompt, aspect ratio,
//! resolution and model tier). A [`GenerationRequest`] is only produced when
//! the prompt is non-empty after trimming, and is immutable once built.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Backing model used for the fast tier.
pub const FAST_MODEL_ID: &str = "veo-3.1-fast-generate-preview";

/// Backing model used for the quality tier.
pub const QUALITY_MODEL_ID: &str = "veo-3.1-generate-preview";

/// Prompt the editor starts with.
pub const DEFAULT_PROMPT: &str = "Create a high-tech cinematic video showing individual CPU components \
arriving from different directions in a dramatic, futuristic environment. Start with a dark \
technological space filled with floating holographic grids, particle effects, and glowing circuit \
patterns. One by one, CPU elements appear: the silicon wafer, transistor layers, gold connectors, \
pins, cooling plate, microchip layers, and circuit pathways. Each part enters the scene in smooth \
motion\u{2014}some sliding in, some dropping from above, some materializing through digital warp portals. \
Use glowing neon colors like electric blue, green, and purple to highlight edges.
As all components reach the center, activate an energy field: particles swirl, light beams connect, \
and the parts rotate in synchronization. Show them snapping, locking, and magnetically pulling \
together with detailed sci-fi VFX. Micro-circuits light up as the internal layers fuse, forming the \
final CPU body. End with a powerful flash of energy as the fully assembled CPU hovers in the air, \
glowing with an activated core. The camera performs a slow dramatic orbit around the finished chip. \
Add ultra-realistic CGI, crisp reflections, volumetric lighting, 4K details, smooth animations, and \
a premium tech-reveal atmosphere";

/// Output frame shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "16:9")]
    Landscape,
    #[serde(rename = "9:16")]
    Portrait,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 2] = [AspectRatio::Landscape, AspectRatio::Portrait];

    /// Wire value understood by the generation service.
    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Landscape => "16:9",
            AspectRatio::Portrait => "9:16",
        }
    }
}

/// Output resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "720p")]
    Hd,
    #[default]
    #[serde(rename = "1080p")]
    FullHd,
}

impl Resolution {
    pub const ALL: [Resolution; 2] = [Resolution::Hd, Resolution::FullHd];

    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Hd => "720p",
            Resolution::FullHd => "1080p",
        }
    }

    /// Label used by the configuration panel.
    pub fn label(&self) -> &'static str {
        match self {
            Resolution::Hd => "720p (HD)",
            Resolution::FullHd => "1080p (FHD)",
        }
    }
}

/// Coarse quality/speed selector.
///
/// Each tier maps to exactly one backing model through a fixed table that
/// the user cannot edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    #[default]
    Fast,
    Quality,
}

impl ModelTier {
    pub const ALL: [ModelTier; 2] = [ModelTier::Fast, ModelTier::Quality];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelTier::Fast => "fast",
            ModelTier::Quality => "quality",
        }
    }

    /// Backing model identifier for this tier.
    pub fn model_id(&self) -> &'static str {
        match self {
            ModelTier::Fast => FAST_MODEL_ID,
            ModelTier::Quality => QUALITY_MODEL_ID,
        }
    }

    /// Short description shown under the tier selector.
    pub fn blurb(&self) -> &'static str {
        match self {
            ModelTier::Fast => "Turbo (Fast): optimized for speed. Good for drafts.",
            ModelTier::Quality => "Pro (Quality): supports higher detail, takes longer.",
        }
    }
}

/// Error returned when a form field value cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {field} '{value}', expected one of: {expected}")]
pub struct ParseChoiceError {
    pub field: &'static str,
    pub value: String,
    pub expected: &'static str,
}

impl FromStr for AspectRatio {
    type Err = ParseChoiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "16:9" | "landscape" => Ok(AspectRatio::Landscape),
            "9:16" | "portrait" => Ok(AspectRatio::Portrait),
            other => Err(ParseChoiceError {
                field: "aspect ratio",
                value: other.to_string(),
                expected: "16:9, 9:16",
            }),
        }
    }
}

impl FromStr for Resolution {
    type Err = ParseChoiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "720p" | "720" | "hd" => Ok(Resolution::Hd),
            "1080p" | "1080" | "fhd" => Ok(Resolution::FullHd),
            other => Err(ParseChoiceError {
                field: "resolution",
                value: other.to_string(),
                expected: "720p, 1080p",
            }),
        }
    }
}

impl FromStr for ModelTier {
    type Err = ParseChoiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fast" | "turbo" => Ok(ModelTier::Fast),
            "quality" | "pro" => Ok(ModelTier::Quality),
            other => Err(ParseChoiceError {
                field: "model tier",
                value: other.to_string(),
                expected: "fast, quality",
            }),
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced while building a request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("Empty prompt")]
    EmptyPrompt,
}

/// A validated, immutable generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    prompt: String,
    aspect_ratio: AspectRatio,
    resolution: Resolution,
    tier: ModelTier,
}

impl GenerationRequest {
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn aspect_ratio(&self) -> AspectRatio {
        self.aspect_ratio
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn tier(&self) -> ModelTier {
        self.tier
    }

    /// Backing model identifier selected by the tier.
    pub fn model_id(&self) -> &'static str {
        self.tier.model_id()
    }
}

/// Live, editable form state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestBuilder {
    pub prompt: String,
    pub aspect_ratio: AspectRatio,
    pub resolution: Resolution,
    pub tier: ModelTier,
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self {
            prompt: DEFAULT_PROMPT.to_string(),
            aspect_ratio: AspectRatio::default(),
            resolution: Resolution::default(),
            tier: ModelTier::default(),
        }
    }
}

impl RequestBuilder {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn aspect_ratio(mut self, aspect_ratio: AspectRatio) -> Self {
        self.aspect_ratio = aspect_ratio;
        self
    }

    pub fn resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn tier(mut self, tier: ModelTier) -> Self {
        self.tier = tier;
        self
    }

    /// Whether the submit action is enabled.
    pub fn can_submit(&self) -> bool {
        !self.prompt.trim().is_empty()
    }

    /// Number of characters in the prompt, as shown under the editor.
    pub fn prompt_chars(&self) -> usize {
        self.prompt.chars().count()
    }

    /// Snapshot the current fields into a request.
    ///
    /// The prompt is carried verbatim; trimming is only used for validation.
    pub fn build(&self) -> Result<GenerationRequest, RequestError> {
        if !self.can_submit() {
            return Err(RequestError::EmptyPrompt);
        }

        Ok(GenerationRequest {
            prompt: self.prompt.clone(),
            aspect_ratio: self.aspect_ratio,
            resolution: self.resolution,
            tier: self.tier,
        })
    }
}
