//! CLI enum types for aspect ratio, resolution and render engine options.

use clap::ValueEnum;

use crate::request::{AspectRatio, ModelTier, Resolution};

/// Video aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AspectArg {
    /// Landscape
    #[value(name = "16:9")]
    Landscape,
    /// Portrait
    #[value(name = "9:16")]
    Portrait,
}

impl From<AspectArg> for AspectRatio {
    fn from(a: AspectArg) -> Self {
        match a {
            AspectArg::Landscape => AspectRatio::Landscape,
            AspectArg::Portrait => AspectRatio::Portrait,
        }
    }
}

/// Output resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResolutionArg {
    #[value(name = "720p")]
    Hd,
    #[value(name = "1080p")]
    FullHd,
}

impl From<ResolutionArg> for Resolution {
    fn from(r: ResolutionArg) -> Self {
        match r {
            ResolutionArg::Hd => Resolution::Hd,
            ResolutionArg::FullHd => Resolution::FullHd,
        }
    }
}

/// Render engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TierArg {
    /// Faster generation, good for iterating
    Fast,
    /// Highest fidelity, slower
    Quality,
}

impl From<TierArg> for ModelTier {
    fn from(t: TierArg) -> Self {
        match t {
            TierArg::Fast => ModelTier::Fast,
            TierArg::Quality => ModelTier::Quality,
        }
    }
}
