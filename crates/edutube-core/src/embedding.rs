//! Embedding service for video feature preparation.
//!
//! Each video is reduced to its title plus the top RAKE phrases of its
//! description and transcript, prefixed with a classification instruction,
//! embedded, L2-normalized and stored. Videos already embedded with the same
//! model are not re-embedded.

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::AppError;
use crate::keywords::RakeExtractor;
use crate::models::{VideoEmbedding, VideoText};
use crate::traits::{EmbeddingProvider, EmbeddingStore};

/// Instruction prepended to every embedding input.
pub const EDUCATIONAL_INSTRUCTION: &str = "Instruct: Classify the following video by whether it serves any form of educational purpose, \
such as tutorials, seminars, conferences, workshops, lectures, or other formats designed to teach \
or explain concepts, skills, or knowledge.\nQuery: ";

/// Embedding job configuration.
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Texts per provider call, capped by the provider's own limit.
    pub batch_size: usize,
    pub description_phrases: usize,
    pub transcript_phrases: usize,
    /// Prefix prepended to each input. `None` sends the bare text.
    pub instruction: Option<String>,
    /// Maximum number of videos to embed in one run.
    pub limit: Option<usize>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            batch_size: 64,
            description_phrases: 10,
            transcript_phrases: 20,
            instruction: Some(EDUCATIONAL_INSTRUCTION.to_string()),
            limit: None,
        }
    }
}

/// Result of an embedding run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmbeddingSummary {
    pub pending: usize,
    pub embedded: usize,
    pub batches: usize,
    pub cancelled: bool,
}

/// Builds the text that is embedded for one video, without the instruction.
pub fn build_embedding_input(
    video: &VideoText,
    rake: &RakeExtractor,
    description_phrases: usize,
    transcript_phrases: usize,
) -> String {
    let description = video
        .description
        .as_deref()
        .map(|d| rake.top_phrases(d, description_phrases))
        .unwrap_or_default();
    let transcript = video
        .transcript
        .as_deref()
        .map(|t| rake.top_phrases(t, transcript_phrases))
        .unwrap_or_default();

    format!(
        "Title: {}\nDescription Keywords: {}\nTranscript Keywords: {}",
        video.title, description, transcript
    )
}

/// Scales `vector` to unit length. A zero vector is left untouched.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
}

/// Service that embeds pending videos.
pub struct EmbeddingService<S: EmbeddingStore, E: EmbeddingProvider> {
    store: S,
    provider: E,
    config: EmbeddingConfig,
    rake: RakeExtractor,
}

impl<S: EmbeddingStore, E: EmbeddingProvider> EmbeddingService<S, E> {
    pub fn new(store: S, provider: E) -> Self {
        Self::with_config(store, provider, EmbeddingConfig::default())
    }

    pub fn with_config(store: S, provider: E, config: EmbeddingConfig) -> Self {
        Self {
            store,
            provider,
            config,
            rake: RakeExtractor::new(),
        }
    }

    /// Full input text for one video, instruction included.
    pub fn input_for(&self, video: &VideoText) -> String {
        let body = build_embedding_input(
            video,
            &self.rake,
            self.config.description_phrases,
            self.config.transcript_phrases,
        );
        match &self.config.instruction {
            Some(instruction) => format!("{}{}", instruction, body),
            None => body,
        }
    }

    /// Embeds every pending video, one batch at a time.
    ///
    /// Each batch is stored before the next is requested, so cancellation
    /// between batches keeps all finished work.
    pub async fn embed_pending(
        &self,
        cancel_token: CancellationToken,
    ) -> Result<EmbeddingSummary, AppError> {
        let model = self.provider.model().to_string();
        let pending = self.store.pending_texts(&model, self.config.limit).await?;
        let batch_size = self
            .config
            .batch_size
            .min(self.provider.max_batch_size())
            .max(1);

        info!(
            provider = self.provider.name(),
            model = %model,
            pending = pending.len(),
            batch_size,
            "Embedding videos"
        );

        let mut summary = EmbeddingSummary {
            pending: pending.len(),
            ..Default::default()
        };

        for chunk in pending.chunks(batch_size) {
            if cancel_token.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let inputs: Vec<String> = chunk.iter().map(|v| self.input_for(v)).collect();
            let vectors = self.provider.generate_batch(&inputs).await?;

            if vectors.len() != chunk.len() {
                return Err(AppError::Generic(format!(
                    "{} returned {} embeddings for {} inputs",
                    self.provider.name(),
                    vectors.len(),
                    chunk.len()
                )));
            }

            let mut records = Vec::with_capacity(chunk.len());
            for (video, mut vector) in chunk.iter().zip(vectors) {
                if vector.len() != self.provider.dimension() {
                    return Err(AppError::Generic(format!(
                        "embedding for {} has dimension {}, expected {}",
                        video.video_id,
                        vector.len(),
                        self.provider.dimension()
                    )));
                }
                l2_normalize(&mut vector);
                records.push(VideoEmbedding {
                    video_id: video.video_id.clone(),
                    model: model.clone(),
                    vector,
                });
            }

            self.store.store_embeddings(&records).await?;
            summary.embedded += records.len();
            summary.batches += 1;
            info!(
                embedded = summary.embedded,
                pending = summary.pending,
                "Embedding batch stored"
            );
        }

        Ok(summary)
    }
}
