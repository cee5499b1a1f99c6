//! SQLite connection and schema bootstrap.
//!
//! The schema is created idempotently on every start, one statement at a time.

use std::str::FromStr;

use edutube_core::DbConfig;
use edutube_core::error::AppError;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

/// DDL statements, executed in order.
pub const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS videos (
        video_id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        channel_title TEXT,
        channel_id TEXT,
        published_at TEXT,
        description TEXT,
        tags TEXT,
        default_audio_language TEXT,
        default_language TEXT,
        duration TEXT,
        definition TEXT,
        caption INTEGER,
        view_count INTEGER,
        like_count INTEGER,
        comment_count INTEGER,
        paid_product_placement INTEGER,
        collected_at TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS video_keywords (
        video_id TEXT NOT NULL,
        keyword TEXT NOT NULL,
        PRIMARY KEY (video_id, keyword)
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_video_keywords_keyword ON video_keywords(keyword)",
    r#"CREATE TABLE IF NOT EXISTS transcripts (
        video_id TEXT PRIMARY KEY,
        transcript TEXT NOT NULL,
        kind TEXT NOT NULL,
        translatable INTEGER NOT NULL,
        source_language TEXT
    )"#,
    r#"CREATE TABLE IF NOT EXISTS channels (
        channel_id TEXT PRIMARY KEY,
        title TEXT,
        description TEXT,
        localized_title TEXT,
        localized_description TEXT,
        published_at TEXT,
        country TEXT,
        likes_playlist TEXT,
        uploads_playlist TEXT,
        view_count INTEGER,
        subscriber_count INTEGER,
        video_count INTEGER,
        fetched_at TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS comments (
        thread_id TEXT PRIMARY KEY,
        video_id TEXT NOT NULL,
        text TEXT NOT NULL,
        like_count INTEGER NOT NULL DEFAULT 0,
        published_at TEXT,
        updated_at TEXT,
        total_reply_count INTEGER NOT NULL DEFAULT 0
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_comments_video ON comments(video_id)",
    r#"CREATE TABLE IF NOT EXISTS replies (
        reply_id TEXT PRIMARY KEY,
        thread_id TEXT NOT NULL,
        video_id TEXT NOT NULL,
        text TEXT NOT NULL,
        like_count INTEGER NOT NULL DEFAULT 0,
        published_at TEXT,
        updated_at TEXT
    )"#,
    r#"CREATE TABLE IF NOT EXISTS failed_items (
        harvester TEXT NOT NULL,
        item_id TEXT NOT NULL,
        reason TEXT NOT NULL,
        failed_at TEXT NOT NULL,
        PRIMARY KEY (harvester, item_id)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS video_embeddings (
        video_id TEXT NOT NULL,
        model TEXT NOT NULL,
        dimension INTEGER NOT NULL,
        embedding BLOB NOT NULL,
        created_at TEXT NOT NULL,
        PRIMARY KEY (video_id, model)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS manual_labels (
        video_id TEXT PRIMARY KEY,
        label INTEGER NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS training_sample (
        video_id TEXT PRIMARY KEY,
        position INTEGER NOT NULL,
        created_at TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS gpt_labels (
        video_id TEXT PRIMARY KEY,
        label INTEGER NOT NULL,
        model TEXT NOT NULL,
        labeled_at TEXT NOT NULL
    )"#,
];

/// Opens a connection pool, creating the database file when missing.
///
/// # Examples
///
/// ```no_run
/// use edutube_core::DbConfig;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = edutube_db::connect("sqlite://youtube_data.db", &DbConfig::default()).await?;
/// edutube_db::init_schema(&pool).await?;
/// # Ok(())
/// # }
/// ```
pub async fn connect(database_url: &str, config: &DbConfig) -> Result<SqlitePool, AppError> {
    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(AppError::DatabaseError)?
        .create_if_missing(true);

    SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await
        .map_err(AppError::DatabaseError)
}

/// Creates every table and index that does not exist yet.
pub async fn init_schema(pool: &SqlitePool) -> Result<(), AppError> {
    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(AppError::DatabaseError)?;
    }
    tracing::debug!(statements = SCHEMA.len(), "Schema initialized");
    Ok(())
}
