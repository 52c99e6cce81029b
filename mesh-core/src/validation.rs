//! Input validation at the store boundary.
//!
//! Everything that enters the mesh passes through here first. Rejections
//! surface as [`MeshError::InvalidInput`]; accepted values are normalized
//! (importance clamped to [0, 1]).

use crate::config::MemoryConfig;
use crate::error::{MeshError, Result};

/// Importance used when the caller does not pass one.
pub const DEFAULT_IMPORTANCE: f32 = 0.5;

/// Check content before it is stored.
///
/// # Errors
/// Returns [`MeshError::InvalidInput`] when the content is empty after
/// trimming, or longer than `config.max_content_chars` characters.
pub fn validate_content(content: &str, config: &MemoryConfig) -> Result<()> {
    if content.trim().is_empty() {
        return Err(MeshError::invalid("content", "content is empty"));
    }

    let chars = content.chars().count();
    if chars > config.max_content_chars {
        return Err(MeshError::invalid(
            "content",
            format!(
                "content too long: {chars} chars (max: {})",
                config.max_content_chars
            ),
        ));
    }

    Ok(())
}

/// Clamp a finite importance into [0, 1].
///
/// # Errors
/// Returns [`MeshError::InvalidInput`] for NaN or infinite values.
pub fn clamp_importance(importance: f32) -> Result<f32> {
    if !importance.is_finite() {
        return Err(MeshError::invalid(
            "importance",
            format!("importance must be finite, got {importance}"),
        ));
    }
    Ok(importance.clamp(0.0, 1.0))
}
