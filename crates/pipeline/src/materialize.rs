//! Turns history outputs into client-ready `data:` URIs.

use std::io;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use fluxgen_comfyui::messages::{HistoryEntry, ImageRef};
use fluxgen_core::error::CoreError;

pub const DATA_URI_PREFIX: &str = "data:image/png;base64,";

/// Resolves image references from a history entry against inline data or
/// the engine's output directory.
#[derive(Debug, Clone)]
pub struct ImageMaterializer {
    output_dir: PathBuf,
}

impl ImageMaterializer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Materialize every image of the first image-bearing output, in
    /// engine order.
    pub async fn materialize(
        &self,
        task_id: &str,
        entry: &HistoryEntry,
    ) -> Result<Vec<String>, CoreError> {
        if entry.outputs.is_empty() {
            return Err(CoreError::Validation("no output data".to_string()));
        }

        let (node_id, images) = entry
            .first_image_output()
            .ok_or_else(|| CoreError::Validation("no image output node".to_string()))?;

        if images.is_empty() {
            return Err(CoreError::Validation(format!(
                "output node {node_id} produced no images"
            )));
        }

        let mut uris = Vec::with_capacity(images.len());
        for image in images {
            let payload = self.payload_for(image).await?;
            uris.push(to_data_uri(&payload));
        }

        tracing::debug!(task_id, node_id, count = uris.len(), "Images materialized");
        Ok(uris)
    }

    async fn payload_for(&self, image: &ImageRef) -> Result<String, CoreError> {
        if let Some(inline) = image.base64.as_deref().filter(|b| !b.is_empty()) {
            return Ok(inline.to_string());
        }

        let filename = image
            .filename
            .as_deref()
            .filter(|f| !f.is_empty())
            .ok_or_else(|| CoreError::Validation("image has neither data nor filename".to_string()))?;

        let path = match image.subfolder.as_deref().filter(|s| !s.is_empty()) {
            Some(sub) => self.output_dir.join(sub).join(filename),
            None => self.output_dir.join(filename),
        };

        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(STANDARD.encode(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(CoreError::Validation(format!(
                "image file not found: {}",
                path.display()
            ))),
            Err(e) => Err(CoreError::Internal(format!(
                "failed to read {}: {e}",
                path.display()
            ))),
        }
    }
}

/// Right-pad with `=` to a multiple of four.
pub fn pad_base64(payload: &str) -> String {
    let missing = (4 - payload.len() % 4) % 4;
    format!("{payload}{}", "=".repeat(missing))
}

pub fn to_data_uri(payload: &str) -> String {
    format!("{DATA_URI_PREFIX}{}", pad_base64(payload))
}
