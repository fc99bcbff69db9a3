//! Generation request parameters: wire shape, defaults and validation.
//!
//! A [`GenerateRequest`] is what clients send; [`GenerateRequest::into_parameters`]
//! validates it and fills defaults to produce the concrete
//! [`GenerationParameters`] that the binder consumes.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Limits and defaults
// ---------------------------------------------------------------------------

/// Smallest accepted image edge in pixels.
pub const MIN_DIMENSION: i64 = 128;
/// Largest accepted image edge in pixels.
pub const MAX_DIMENSION: i64 = 2048;

pub const DEFAULT_WIDTH: u32 = 512;
pub const DEFAULT_HEIGHT: u32 = 1024;
pub const DEFAULT_STEPS: u32 = 30;
pub const DEFAULT_GUIDANCE: f64 = 3.5;
pub const DEFAULT_MAX_SHIFT: f64 = 1.15;
pub const DEFAULT_BASE_SHIFT: f64 = 0.5;
pub const DEFAULT_DENOISE: f64 = 1.0;
pub const DEFAULT_BATCH_COUNT: i64 = 1;

// ---------------------------------------------------------------------------
// Data structures
// ---------------------------------------------------------------------------

/// Body of `POST /generate`. Everything but `prompt` is optional.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct GenerateRequest {
    #[serde(default)]
    pub prompt: String,
    #[validate(range(min = 128, max = 2048, message = "width must be between 128 and 2048"))]
    pub width: Option<i64>,
    #[validate(range(min = 128, max = 2048, message = "height must be between 128 and 2048"))]
    pub height: Option<i64>,
    pub seed: Option<u32>,
    #[validate(range(min = 1, message = "steps must be at least 1"))]
    pub steps: Option<u32>,
    pub guidance: Option<f64>,
    pub max_shift: Option<f64>,
    pub base_shift: Option<f64>,
    pub denoise: Option<f64>,
    pub batch_count: Option<i64>,
}

/// Fully resolved parameters for one generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationParameters {
    /// Positive prompt, already trimmed and non-empty.
    pub prompt: String,
    pub width: u32,
    pub height: u32,
    /// Requested seed; random when the client did not supply one.
    pub seed: u32,
    pub steps: u32,
    pub guidance: f64,
    pub max_shift: f64,
    pub base_shift: f64,
    pub denoise: f64,
    /// Images per submission, within `[1, max_queue_size]`.
    pub batch_count: u32,
}

// ---------------------------------------------------------------------------
// Public functions
// ---------------------------------------------------------------------------

impl GenerateRequest {
    /// Validate the request and apply defaults.
    ///
    /// `batch_count` is clamped into `[1, max_queue_size]` rather than
    /// rejected. Out-of-range dimensions and an empty prompt are errors.
    pub fn into_parameters(self, max_queue_size: usize) -> Result<GenerationParameters, CoreError> {
        self.validate()
            .map_err(|e| CoreError::Validation(e.to_string()))?;

        let prompt = self.prompt.trim();
        if prompt.is_empty() {
            return Err(CoreError::Validation(
                "prompt must not be empty".to_string(),
            ));
        }

        Ok(GenerationParameters {
            prompt: prompt.to_string(),
            width: dimension_or(self.width, DEFAULT_WIDTH),
            height: dimension_or(self.height, DEFAULT_HEIGHT),
            seed: self.seed.unwrap_or_else(random_seed),
            steps: self.steps.unwrap_or(DEFAULT_STEPS),
            guidance: self.guidance.unwrap_or(DEFAULT_GUIDANCE),
            max_shift: self.max_shift.unwrap_or(DEFAULT_MAX_SHIFT),
            base_shift: self.base_shift.unwrap_or(DEFAULT_BASE_SHIFT),
            denoise: self.denoise.unwrap_or(DEFAULT_DENOISE),
            batch_count: clamp_batch_count(
                self.batch_count.unwrap_or(DEFAULT_BATCH_COUNT),
                max_queue_size,
            ),
        })
    }
}

/// Draw a seed uniformly from the full `u32` range.
pub fn random_seed() -> u32 {
    rand::random::<u32>()
}

/// Clamp a requested batch count into `[1, max]`.
pub fn clamp_batch_count(requested: i64, max: usize) -> u32 {
    let max = max.max(1) as i64;
    requested.clamp(1, max) as u32
}

/// Render a sampler number the way the sampler node expects its text inputs:
/// shortest round-trip form, always with a fractional part.
pub fn format_decimal(value: f64) -> String {
    format!("{value:?}")
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

/// Range was already validated; only the default needs applying.
fn dimension_or(value: Option<i64>, default: u32) -> u32 {
    value
        .filter(|v| (MIN_DIMENSION..=MAX_DIMENSION).contains(v))
        .map(|v| v as u32)
        .unwrap_or(default)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
