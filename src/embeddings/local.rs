//! Local embedding service using fastembed
//!
//! Runs the embedding model locally via ONNX Runtime. The model is
//! downloaded on first use and cached; subsequent runs load from cache.
//! fastembed is synchronous, so every call goes through a blocking task.

use crate::embeddings::EmbeddingService;
use crate::error::{IasoError, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::task;
use tracing::{debug, info};

/// Local embedding service backed by fastembed
pub struct LocalEmbedder {
    /// The underlying fastembed model; Mutex because fastembed's embed
    /// takes &mut self
    model: Arc<Mutex<TextEmbedding>>,
    model_name: String,
    dimensions: usize,
}

impl LocalEmbedder {
    /// Create a new local embedder for the given model name
    ///
    /// Downloads the model if not already cached (may take 30-120 seconds
    /// depending on model size and network speed).
    pub async fn new(model_name: &str, cache_dir: Option<PathBuf>) -> Result<Self> {
        let embedding_model = Self::model_name_to_enum(model_name)?;
        let dimensions = Self::model_dimensions(model_name)?;

        info!(
            "Initializing local embedding service: model={}, dimensions={}",
            model_name, dimensions
        );

        let mut init_options = InitOptions::default();
        init_options.model_name = embedding_model;
        init_options.show_download_progress = false;
        if let Some(dir) = cache_dir {
            init_options.cache_dir = dir;
        }

        // Model load may download; keep it off the async runtime
        let model = task::spawn_blocking(move || TextEmbedding::try_new(init_options))
            .await
            .map_err(|e| IasoError::Other(format!("Task join error: {}", e)))?
            .map_err(|e| IasoError::Embedding(format!("Failed to load model: {}", e)))?;

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            model_name: model_name.to_string(),
            dimensions,
        })
    }

    /// Map model name string to fastembed's EmbeddingModel enum
    fn model_name_to_enum(model_name: &str) -> Result<EmbeddingModel> {
        match model_name {
            "all-MiniLM-L6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
            "all-MiniLM-L12-v2" => Ok(EmbeddingModel::AllMiniLML12V2),
            "bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
            "bge-base-en-v1.5" => Ok(EmbeddingModel::BGEBaseENV15),
            "nomic-embed-text-v1.5" => Ok(EmbeddingModel::NomicEmbedTextV15),
            _ => Err(IasoError::Config(config::ConfigError::Message(format!(
                "Unsupported embedding model: '{}'",
                model_name
            )))),
        }
    }

    /// Dimensionality for each supported model
    fn model_dimensions(model_name: &str) -> Result<usize> {
        match model_name {
            "all-MiniLM-L6-v2" | "all-MiniLM-L12-v2" | "bge-small-en-v1.5" => Ok(384),
            "bge-base-en-v1.5" => Ok(768),
            "nomic-embed-text-v1.5" => Ok(768),
            _ => Err(IasoError::Config(config::ConfigError::Message(format!(
                "Unsupported embedding model: '{}'",
                model_name
            )))),
        }
    }
}

#[async_trait]
impl EmbeddingService for LocalEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!("Embedding text ({} chars)", text.len());

        let model = Arc::clone(&self.model);
        let text = text.to_string();
        let dimensions = self.dimensions;

        let mut embeddings = task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|e| IasoError::Embedding(format!("Model lock poisoned: {}", e)))?;
            model
                .embed(vec![text], None)
                .map_err(|e| IasoError::Embedding(format!("Embedding failed: {}", e)))
        })
        .await
        .map_err(|e| IasoError::Other(format!("Task join error: {}", e)))??;

        let embedding = embeddings
            .pop()
            .ok_or_else(|| IasoError::Embedding("Model returned no embedding".to_string()))?;

        if embedding.len() != dimensions {
            return Err(IasoError::Embedding(format!(
                "Dimension mismatch: expected {}, got {}",
                dimensions,
                embedding.len()
            )));
        }

        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
