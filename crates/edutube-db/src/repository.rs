//! Video repository for SQLite.
//!
//! One repository over the whole store: the harvester sinks write through it,
//! the worklist queries read from it, and it backs the embedding store and
//! the training sample.
//!
//! Append-only facts (videos, keywords, transcripts, comments, labels) are
//! written with `INSERT OR IGNORE`; refreshable facts (channels, embeddings)
//! with `INSERT OR REPLACE`. Every multi-row write runs in one transaction.

use chrono::Utc;
use edutube_core::config::HarvesterKind;
use edutube_core::error::AppError;
use edutube_core::models::{
    ChannelLookup, CommentPage, DatabaseStats, SampleCandidate, SearchPage, TrainingExample,
    TranscriptRecord, VideoEmbedding, VideoLabel, VideoText,
};
use sqlx::SqlitePool;

/// Repository for harvested data in SQLite.
///
/// # Examples
///
/// ```no_run
/// use edutube_core::DbConfig;
/// use edutube_db::VideoRepository;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = edutube_db::connect("sqlite://youtube_data.db", &DbConfig::default()).await?;
/// let repo = VideoRepository::new(pool);
/// let stats = repo.get_stats().await?;
/// println!("{} videos", stats.videos);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct VideoRepository {
    pool: SqlitePool,
}

impl VideoRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // =========================================================================
    // Harvested records
    // =========================================================================

    /// Stores a page of search results and links each video to the keyword.
    ///
    /// Returns the number of videos that were new.
    pub async fn insert_search_page(&self, page: &SearchPage) -> Result<u64, AppError> {
        let mut tx = self.pool.begin().await.map_err(AppError::DatabaseError)?;
        let mut inserted = 0;

        for video in &page.videos {
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO videos (
                    video_id, title, channel_title, published_at, description, tags,
                    default_audio_language, default_language, duration, definition, caption,
                    view_count, like_count, comment_count, paid_product_placement, collected_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&video.video_id)
            .bind(&video.title)
            .bind(&video.channel_title)
            .bind(&video.published_at)
            .bind(&video.description)
            .bind(video.tags.join(","))
            .bind(&video.default_audio_language)
            .bind(&video.default_language)
            .bind(&video.duration)
            .bind(&video.definition)
            .bind(video.caption)
            .bind(video.view_count)
            .bind(video.like_count)
            .bind(video.comment_count)
            .bind(video.paid_product_placement)
            .bind(video.collected_at)
            .execute(&mut *tx)
            .await
            .map_err(AppError::DatabaseError)?;
            inserted += result.rows_affected();

            sqlx::query("INSERT OR IGNORE INTO video_keywords (video_id, keyword) VALUES (?, ?)")
                .bind(&video.video_id)
                .bind(&page.keyword)
                .execute(&mut *tx)
                .await
                .map_err(AppError::DatabaseError)?;
        }

        tx.commit().await.map_err(AppError::DatabaseError)?;
        Ok(inserted)
    }

    /// Stores a transcript. An existing transcript for the video is kept.
    pub async fn insert_transcript(&self, record: &TranscriptRecord) -> Result<bool, AppError> {
        let source_language = record
            .translated_from
            .as_deref()
            .unwrap_or(&record.language_code);

        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO transcripts (video_id, transcript, kind, translatable, source_language)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.video_id)
        .bind(&record.text)
        .bind(record.kind_label())
        .bind(record.translatable)
        .bind(source_language)
        .execute(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(result.rows_affected() > 0)
    }

    /// Replaces the channel row and links the video to it.
    pub async fn upsert_channel(&self, lookup: &ChannelLookup) -> Result<(), AppError> {
        let channel = &lookup.channel;
        let mut tx = self.pool.begin().await.map_err(AppError::DatabaseError)?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO channels (
                channel_id, title, description, localized_title, localized_description,
                published_at, country, likes_playlist, uploads_playlist,
                view_count, subscriber_count, video_count, fetched_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&channel.channel_id)
        .bind(&channel.title)
        .bind(&channel.description)
        .bind(&channel.localized_title)
        .bind(&channel.localized_description)
        .bind(&channel.published_at)
        .bind(&channel.country)
        .bind(&channel.likes_playlist)
        .bind(&channel.uploads_playlist)
        .bind(channel.view_count)
        .bind(channel.subscriber_count)
        .bind(channel.video_count)
        .bind(channel.fetched_at)
        .execute(&mut *tx)
        .await
        .map_err(AppError::DatabaseError)?;

        sqlx::query("UPDATE videos SET channel_id = ? WHERE video_id = ?")
            .bind(&channel.channel_id)
            .bind(&lookup.video_id)
            .execute(&mut *tx)
            .await
            .map_err(AppError::DatabaseError)?;

        tx.commit().await.map_err(AppError::DatabaseError)?;
        Ok(())
    }

    /// Stores one page of comment threads and replies.
    pub async fn insert_comment_page(&self, page: &CommentPage) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await.map_err(AppError::DatabaseError)?;

        for thread in &page.threads {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO comments (
                    thread_id, video_id, text, like_count, published_at, updated_at, total_reply_count
                )
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&thread.thread_id)
            .bind(&thread.video_id)
            .bind(&thread.text)
            .bind(thread.like_count)
            .bind(&thread.published_at)
            .bind(&thread.updated_at)
            .bind(thread.total_reply_count)
            .execute(&mut *tx)
            .await
            .map_err(AppError::DatabaseError)?;
        }

        for reply in &page.replies {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO replies (
                    reply_id, thread_id, video_id, text, like_count, published_at, updated_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&reply.reply_id)
            .bind(&reply.thread_id)
            .bind(&reply.video_id)
            .bind(&reply.text)
            .bind(reply.like_count)
            .bind(&reply.published_at)
            .bind(&reply.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(AppError::DatabaseError)?;
        }

        tx.commit().await.map_err(AppError::DatabaseError)?;
        Ok(())
    }

    /// Stores a classifier label. The first label for a video wins.
    pub async fn insert_label(&self, label: &VideoLabel) -> Result<bool, AppError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO gpt_labels (video_id, label, model, labeled_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&label.video_id)
        .bind(label.educational)
        .bind(&label.model)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Worklists
    // =========================================================================

    /// Every video, ordered by id.
    pub async fn all_video_ids(&self) -> Result<Vec<String>, AppError> {
        self.ids("SELECT video_id FROM videos ORDER BY video_id")
            .await
    }

    /// Videos with no transcript that the supplement pass has not given up on.
    pub async fn videos_missing_transcript(&self) -> Result<Vec<String>, AppError> {
        sqlx::query_scalar(
            r#"
            SELECT v.video_id
            FROM videos v
            WHERE NOT EXISTS (SELECT 1 FROM transcripts t WHERE t.video_id = v.video_id)
              AND NOT EXISTS (
                  SELECT 1 FROM failed_items f
                  WHERE f.harvester = ? AND f.item_id = v.video_id
              )
            ORDER BY v.video_id
            "#,
        )
        .bind(HarvesterKind::SupplementTranscripts.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DatabaseError)
    }

    /// Videos whose channel has not been resolved.
    pub async fn videos_missing_channel(&self) -> Result<Vec<String>, AppError> {
        self.ids("SELECT video_id FROM videos WHERE channel_id IS NULL ORDER BY video_id")
            .await
    }

    /// Training-sample videos without a classifier label.
    pub async fn unlabeled_sample_ids(&self) -> Result<Vec<String>, AppError> {
        self.ids(
            r#"
            SELECT s.video_id
            FROM training_sample s
            WHERE NOT EXISTS (SELECT 1 FROM gpt_labels g WHERE g.video_id = s.video_id)
            ORDER BY s.video_id
            "#,
        )
        .await
    }

    async fn ids(&self, query: &'static str) -> Result<Vec<String>, AppError> {
        sqlx::query_scalar(query)
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::DatabaseError)
    }

    // =========================================================================
    // Training sample
    // =========================================================================

    /// Videos with a transcript and no manual label, with their keywords.
    ///
    /// Ordered by video id, keywords sorted, so sampling is reproducible.
    pub async fn sample_candidates(&self) -> Result<Vec<SampleCandidate>, AppError> {
        let rows: Vec<(String, Option<String>)> = sqlx::query_as(
            r#"
            SELECT v.video_id, k.keyword
            FROM videos v
            JOIN transcripts t ON t.video_id = v.video_id
            LEFT JOIN video_keywords k ON k.video_id = v.video_id
            WHERE NOT EXISTS (SELECT 1 FROM manual_labels m WHERE m.video_id = v.video_id)
            ORDER BY v.video_id, k.keyword
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        let mut candidates: Vec<SampleCandidate> = Vec::new();
        for (video_id, keyword) in rows {
            match candidates.last_mut() {
                Some(last) if last.video_id == video_id => last.keywords.extend(keyword),
                _ => candidates.push(SampleCandidate {
                    video_id,
                    keywords: keyword.into_iter().collect(),
                }),
            }
        }
        Ok(candidates)
    }

    /// Returns true if a training sample has been stored.
    pub async fn training_sample_exists(&self) -> Result<bool, AppError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM training_sample")
            .fetch_one(&self.pool)
            .await
            .map_err(AppError::DatabaseError)?;
        Ok(count > 0)
    }

    /// Replaces the training sample with `video_ids`, storing each id's index as `position`.
    pub async fn replace_training_sample(&self, video_ids: &[String]) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await.map_err(AppError::DatabaseError)?;
        let created_at = Utc::now();

        sqlx::query("DELETE FROM training_sample")
            .execute(&mut *tx)
            .await
            .map_err(AppError::DatabaseError)?;

        for (position, video_id) in video_ids.iter().enumerate() {
            sqlx::query(
                "INSERT OR IGNORE INTO training_sample (video_id, position, created_at) VALUES (?, ?, ?)",
            )
            .bind(video_id)
            .bind(position as i64)
            .bind(created_at)
            .execute(&mut *tx)
            .await
            .map_err(AppError::DatabaseError)?;
        }

        tx.commit().await.map_err(AppError::DatabaseError)?;
        Ok(())
    }

    /// Training-sample rows with the text the classifier needs, ordered by stored `position`.
    pub async fn training_examples(&self) -> Result<Vec<TrainingExample>, AppError> {
        let rows: Vec<(String, String, Option<String>, Option<String>)> = sqlx::query_as(
            r#"
            SELECT s.video_id, v.title, v.description, t.transcript
            FROM training_sample s
            JOIN videos v ON v.video_id = s.video_id
            LEFT JOIN transcripts t ON t.video_id = s.video_id
            ORDER BY s.position
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(rows
            .into_iter()
            .map(|(video_id, title, description, transcript)| TrainingExample {
                video_id,
                title,
                description,
                transcript,
            })
            .collect())
    }

    // =========================================================================
    // Embeddings
    // =========================================================================

    /// Videos with no embedding for `model`, ordered by id.
    pub async fn videos_without_embedding(
        &self,
        model: &str,
        limit: Option<usize>,
    ) -> Result<Vec<VideoText>, AppError> {
        // SQLite treats a negative LIMIT as no limit
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let rows: Vec<(String, String, Option<String>, Option<String>)> = sqlx::query_as(
            r#"
            SELECT v.video_id, v.title, v.description, t.transcript
            FROM videos v
            LEFT JOIN transcripts t ON t.video_id = v.video_id
            WHERE NOT EXISTS (
                SELECT 1 FROM video_embeddings e
                WHERE e.video_id = v.video_id AND e.model = ?
            )
            ORDER BY v.video_id
            LIMIT ?
            "#,
        )
        .bind(model)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(rows
            .into_iter()
            .map(|(video_id, title, description, transcript)| VideoText {
                video_id,
                title,
                description,
                transcript,
            })
            .collect())
    }

    /// Upserts embeddings in one transaction.
    pub async fn upsert_embeddings(&self, embeddings: &[VideoEmbedding]) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await.map_err(AppError::DatabaseError)?;
        let created_at = Utc::now();

        for embedding in embeddings {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO video_embeddings (video_id, model, dimension, embedding, created_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&embedding.video_id)
            .bind(&embedding.model)
            .bind(embedding.vector.len() as i64)
            .bind(encode_vector(&embedding.vector))
            .bind(created_at)
            .execute(&mut *tx)
            .await
            .map_err(AppError::DatabaseError)?;
        }

        tx.commit().await.map_err(AppError::DatabaseError)?;
        Ok(())
    }

    /// Reads back an embedding.
    pub async fn get_embedding(
        &self,
        video_id: &str,
        model: &str,
    ) -> Result<Option<Vec<f32>>, AppError> {
        let blob: Option<Vec<u8>> = sqlx::query_scalar(
            "SELECT embedding FROM video_embeddings WHERE video_id = ? AND model = ?",
        )
        .bind(video_id)
        .bind(model)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(blob.map(|b| decode_vector(&b)))
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    /// Returns row counts across the store.
    pub async fn get_stats(&self) -> Result<DatabaseStats, AppError> {
        let row: StatsRow = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM videos) AS videos,
                (SELECT COUNT(*) FROM videos WHERE channel_id IS NOT NULL) AS videos_with_channel,
                (SELECT COUNT(*) FROM transcripts) AS transcripts,
                (SELECT COUNT(*) FROM channels) AS channels,
                (SELECT COUNT(*) FROM comments) AS comments,
                (SELECT COUNT(*) FROM replies) AS replies,
                (SELECT COUNT(*) FROM video_embeddings) AS embeddings,
                (SELECT COUNT(*) FROM training_sample) AS training_sample,
                (SELECT COUNT(*) FROM gpt_labels) AS labels
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        let failed_items: Vec<(String, i64)> = sqlx::query_as(
            "SELECT harvester, COUNT(*) FROM failed_items GROUP BY harvester ORDER BY harvester",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(DatabaseStats {
            videos: row.videos,
            videos_with_channel: row.videos_with_channel,
            transcripts: row.transcripts,
            channels: row.channels,
            comments: row.comments,
            replies: row.replies,
            embeddings: row.embeddings,
            training_sample: row.training_sample,
            labels: row.labels,
            failed_items,
        })
    }
}

/// Helper struct for deserializing stats query results
#[derive(sqlx::FromRow)]
struct StatsRow {
    videos: i64,
    videos_with_channel: i64,
    transcripts: i64,
    channels: i64,
    comments: i64,
    replies: i64,
    embeddings: i64,
    training_sample: i64,
    labels: i64,
}

/// Little-endian `f32` bytes.
fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

// =============================================================================
// Trait Implementation: EmbeddingStore
// =============================================================================

impl edutube_core::traits::EmbeddingStore for VideoRepository {
    async fn pending_texts(
        &self,
        model: &str,
        limit: Option<usize>,
    ) -> Result<Vec<VideoText>, AppError> {
        VideoRepository::videos_without_embedding(self, model, limit).await
    }

    async fn store_embeddings(&self, embeddings: &[VideoEmbedding]) -> Result<(), AppError> {
        VideoRepository::upsert_embeddings(self, embeddings).await
    }
}
