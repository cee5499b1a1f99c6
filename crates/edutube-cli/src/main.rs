use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use sqlx::SqlitePool;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use edutube_cli::{Command, Config, HarvestArgs};
use edutube_client::{
    ChannelFetcherFactory, CommentFetcherFactory, LabelFetcherFactory, OpenAIClient,
    SearchFetcherFactory, TranscriptFetcherFactory, TranscriptMode, YouTubeClientFactory,
};
use edutube_core::sampling::{keyword_distribution, weighted_sample};
use edutube_core::traits::{Fetcher, FetcherFactory, ResultSink, WorkSource};
use edutube_core::{
    AppError, CredentialPool, DbConfig, EmbeddingConfig, EmbeddingService, EmbeddingSummary,
    HarvestConfig, HarvestResult, HarvestService, HarvesterKind, ProgressTracker, SampleConfig,
    TracingReporter, load_credentials, load_keywords, load_tuning_config,
};
use edutube_db::{
    ChannelSink, CommentSink, LabelSink, SearchSink, SqliteFailureLedger, TranscriptSink,
    VideoQuery, VideoRepository, VideoWorklist,
};

/// Conventional exit status for a run stopped by SIGINT.
const INTERRUPTED_EXIT: u8 = 130;

/// How a command ended when no fatal error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunEnd {
    Completed,
    Interrupted,
}

impl RunEnd {
    fn exit_status(self) -> u8 {
        match self {
            RunEnd::Completed => 0,
            RunEnd::Interrupted => INTERRUPTED_EXIT,
        }
    }
}

/// Shared state for every command.
struct AppContext {
    pool: SqlitePool,
    repo: VideoRepository,
    state_dir: PathBuf,
    tuning_path: Option<PathBuf>,
    cancel_token: CancellationToken,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenv().ok();

    let config = Config::parse();

    let filter = EnvFilter::try_new(&config.log_level)
        .with_context(|| format!("Invalid log filter '{}'", config.log_level))?;
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install tracing subscriber")?;

    info!("Connecting to database...");
    let pool = edutube_db::connect(&config.database_url, &DbConfig::default())
        .await
        .context("Failed to connect to database")?;
    edutube_db::init_schema(&pool)
        .await
        .context("Failed to initialize database schema")?;

    std::fs::create_dir_all(&config.state_dir).with_context(|| {
        format!(
            "Failed to create state directory '{}'",
            config.state_dir.display()
        )
    })?;

    let cancel_token = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel_token.clone()));

    let ctx = AppContext {
        repo: VideoRepository::new(pool.clone()),
        pool: pool.clone(),
        state_dir: config.state_dir,
        tuning_path: config.tuning,
        cancel_token,
    };

    let outcome = run_command(&ctx, config.command).await;
    pool.close().await;

    match outcome {
        Ok(end) => {
            if end == RunEnd::Interrupted {
                info!("Interrupted. Rerun the same command to resume.");
            }
            Ok(ExitCode::from(end.exit_status()))
        }
        Err(e) => {
            error!(error = %e, fatal = e.is_fatal(), "Run aborted");
            eprintln!("\n{}", e.user_message());
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Cancels `token` on Ctrl+C or SIGTERM.
///
/// The running harvester finishes its current item, flushes its progress
/// file and returns an interrupted result.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, stopping after the current item..."),
        _ = terminate => info!("Received SIGTERM, stopping after the current item..."),
    }

    token.cancel();
}

async fn run_command(ctx: &AppContext, command: Command) -> Result<RunEnd, AppError> {
    match command {
        Command::SearchVideos {
            keywords,
            credentials,
            harvest,
        } => {
            let keywords = load_keywords(&keywords)?;
            info!(keywords = keywords.len(), "Loaded keyword list");
            run_harvest(
                ctx,
                HarvesterKind::Search,
                SearchFetcherFactory::new(YouTubeClientFactory::new()),
                SearchSink::new(ctx.repo.clone()),
                &keywords,
                youtube_pool(&credentials)?,
                &harvest,
            )
            .await
        }
        Command::Transcripts { harvest } => {
            run_harvest(
                ctx,
                HarvesterKind::Transcripts,
                TranscriptFetcherFactory::new(TranscriptMode::EnglishOnly)?,
                TranscriptSink::new(ctx.repo.clone()),
                &VideoWorklist::new(ctx.repo.clone(), VideoQuery::All),
                CredentialPool::anonymous(),
                &harvest,
            )
            .await
        }
        Command::SupplementTranscripts { harvest } => {
            run_harvest(
                ctx,
                HarvesterKind::SupplementTranscripts,
                TranscriptFetcherFactory::new(TranscriptMode::AnyLanguage)?,
                TranscriptSink::new(ctx.repo.clone()),
                &VideoWorklist::new(ctx.repo.clone(), VideoQuery::MissingTranscript),
                CredentialPool::anonymous(),
                &harvest,
            )
            .await
        }
        Command::Channels {
            credentials,
            harvest,
        } => {
            run_harvest(
                ctx,
                HarvesterKind::Channels,
                ChannelFetcherFactory::new(YouTubeClientFactory::new()),
                ChannelSink::new(ctx.repo.clone()),
                &VideoWorklist::new(ctx.repo.clone(), VideoQuery::MissingChannel),
                youtube_pool(&credentials)?,
                &harvest,
            )
            .await
        }
        Command::Comments {
            credentials,
            harvest,
        } => {
            run_harvest(
                ctx,
                HarvesterKind::Comments,
                CommentFetcherFactory::new(YouTubeClientFactory::new()),
                CommentSink::new(ctx.repo.clone()),
                &VideoWorklist::new(ctx.repo.clone(), VideoQuery::All),
                youtube_pool(&credentials)?,
                &harvest,
            )
            .await
        }
        Command::Embed {
            openai_api_key,
            model,
            batch_size,
            limit,
        } => embed(ctx, &openai_api_key, &model, batch_size, limit).await,
        Command::Sample { size, seed, force } => {
            draw_sample(&ctx.repo, SampleConfig { size, seed }, force).await?;
            Ok(RunEnd::Completed)
        }
        Command::Label {
            keywords,
            credentials,
            openai_api_key,
            model,
            harvest,
        } => {
            let examples = ctx.repo.training_examples().await?;
            if examples.is_empty() {
                return Err(AppError::ConfigError(
                    "No training sample found. Run `edutube sample` first.".to_string(),
                ));
            }
            let keywords = load_keywords(&keywords)?;
            let keys = match (credentials, openai_api_key) {
                (Some(path), _) => load_credentials(&path)?,
                (None, Some(key)) if !key.trim().is_empty() => vec![key.trim().to_string()],
                _ => {
                    return Err(AppError::ConfigError(
                        "Labeling needs --credentials or OPENAI_API_KEY".to_string(),
                    ));
                }
            };

            info!(examples = examples.len(), model = %model, "Labeling training sample");
            run_harvest(
                ctx,
                HarvesterKind::Labels,
                LabelFetcherFactory::with_model(examples, keywords, &model, None),
                LabelSink::new(ctx.repo.clone()),
                &VideoWorklist::new(ctx.repo.clone(), VideoQuery::UnlabeledSample),
                CredentialPool::new(keys)?,
                &harvest,
            )
            .await
        }
        Command::Status { failed } => {
            show_status(ctx, failed).await?;
            Ok(RunEnd::Completed)
        }
    }
}

fn youtube_pool(path: &Path) -> Result<CredentialPool, AppError> {
    let keys = load_credentials(path)?;
    info!(credentials = keys.len(), path = %path.display(), "Loaded YouTube API keys");
    CredentialPool::new(keys)
}

/// Runs one harvester over its worklist with the tuned retry and pacing policy.
async fn run_harvest<F, S, W>(
    ctx: &AppContext,
    kind: HarvesterKind,
    factory: F,
    sink: S,
    source: &W,
    mut credentials: CredentialPool,
    args: &HarvestArgs,
) -> Result<RunEnd, AppError>
where
    F: FetcherFactory,
    S: ResultSink<Record = <F::Fetcher as Fetcher>::Record>,
    W: WorkSource,
{
    let ledger = SqliteFailureLedger::new(ctx.pool.clone());
    if args.retry_failed {
        let cleared = ledger.clear(kind).await?;
        info!(harvester = %kind, cleared, "Cleared failure ledger");
    }

    let tuning = load_tuning_config(ctx.tuning_path.clone())?;
    let harvest_config = HarvestConfig::for_kind(kind).with_tuning(kind, tuning.as_ref());
    let tracker = ProgressTracker::new(ctx.state_dir.join(kind.state_file_name()));

    let service =
        HarvestService::with_config(kind, factory, sink, ledger, tracker, harvest_config);
    let result = service
        .run_with_progress(
            source,
            &mut credentials,
            &TracingReporter,
            ctx.cancel_token.clone(),
        )
        .await?;

    print_harvest_summary(kind, &result);

    Ok(if result.is_interrupted() {
        RunEnd::Interrupted
    } else {
        RunEnd::Completed
    })
}

fn print_harvest_summary(kind: HarvesterKind, result: &HarvestResult) {
    let stats = &result.stats;
    info!("");
    info!("═══════════════════════════════════════════════════════");
    info!("Harvest {}: {}", result.status, kind);
    info!("═══════════════════════════════════════════════════════");
    info!("  Worklist:            {}", result.worklist_len);
    info!("  Started at:          {}", result.start_position);
    info!("  ✓ Succeeded:         {}", stats.succeeded);
    info!("  ✗ Failed:            {}", stats.failed_permanently);
    info!("  ↻ Retries exhausted: {}", stats.retries_exhausted);
    info!("  = Skipped (ledger):  {}", stats.skipped_failed);
    info!("───────────────────────────────────────────────────────");
    info!("  Pages persisted:     {}", stats.pages);
    info!("  Key rotations:       {}", stats.rotations);
    info!("  Run id:              {}", result.run_id);
    info!("═══════════════════════════════════════════════════════");
}

async fn embed(
    ctx: &AppContext,
    api_key: &str,
    model: &str,
    batch_size: usize,
    limit: Option<usize>,
) -> Result<RunEnd, AppError> {
    let client = OpenAIClient::with_model(api_key, model)?;
    let config = EmbeddingConfig {
        batch_size,
        limit,
        ..EmbeddingConfig::default()
    };
    let service = EmbeddingService::with_config(ctx.repo.clone(), client, config);

    let summary = service.embed_pending(ctx.cancel_token.clone()).await?;
    print_embedding_summary(model, &summary);

    Ok(if summary.cancelled {
        RunEnd::Interrupted
    } else {
        RunEnd::Completed
    })
}

fn print_embedding_summary(model: &str, summary: &EmbeddingSummary) {
    info!("");
    info!("═══════════════════════════════════════════════════════");
    info!("Embedding complete: {}", model);
    info!("═══════════════════════════════════════════════════════");
    info!("  Pending:             {}", summary.pending);
    info!("  Embedded:            {}", summary.embedded);
    info!("  Batches:             {}", summary.batches);
    info!("═══════════════════════════════════════════════════════");
}

async fn draw_sample(
    repo: &VideoRepository,
    config: SampleConfig,
    force: bool,
) -> Result<(), AppError> {
    if repo.training_sample_exists().await? && !force {
        info!("Training sample already exists, reusing it (pass --force to redraw)");
        return Ok(());
    }

    let candidates = repo.sample_candidates().await?;
    let sample = weighted_sample(&candidates, &config)?;
    if sample.len() < config.size {
        warn!(
            requested = config.size,
            drawn = sample.len(),
            "Fewer eligible candidates than requested"
        );
    }
    repo.replace_training_sample(&sample).await?;

    println!(
        "\nTraining sample: {} of {} candidates (seed {})\n",
        sample.len(),
        candidates.len(),
        config.seed
    );
    for (keyword, count) in keyword_distribution(&candidates, &sample) {
        println!("  {:<40} {:>6}", keyword, count);
    }
    println!();

    Ok(())
}

async fn show_status(ctx: &AppContext, failed: Option<HarvesterKind>) -> Result<(), AppError> {
    let stats = ctx.repo.get_stats().await?;

    println!("\nDatabase Statistics\n");
    println!("  Videos:                {}", stats.videos);
    println!("  With channel:          {}", stats.videos_with_channel);
    println!("  Transcripts:           {}", stats.transcripts);
    println!("  Channels:              {}", stats.channels);
    println!("  Comments:              {}", stats.comments);
    println!("  Replies:               {}", stats.replies);
    println!("  Embeddings:            {}", stats.embeddings);
    println!("  Training sample:       {}", stats.training_sample);
    println!("  Labels:                {}", stats.labels);

    if !stats.failed_items.is_empty() {
        println!("\nFailure ledger\n");
        for (harvester, count) in &stats.failed_items {
            println!("  {:<22} {}", harvester, count);
        }
    }

    let mut pending = Vec::new();
    for kind in HarvesterKind::ALL {
        let tracker = ProgressTracker::new(ctx.state_dir.join(kind.state_file_name()));
        if tracker.exists() {
            pending.push((kind, tracker.load()?));
        }
    }
    if !pending.is_empty() {
        println!("\nPending progress files\n");
        for (kind, state) in &pending {
            println!(
                "  {:<22} last position {} ({}){}",
                kind,
                state.last_completed_position,
                state.last_completed_item.as_deref().unwrap_or("-"),
                state
                    .updated_at
                    .map(|t| format!(", updated {}", t.to_rfc3339()))
                    .unwrap_or_default()
            );
        }
    }

    if let Some(kind) = failed {
        let ledger = SqliteFailureLedger::new(ctx.pool.clone());
        let entries = ledger.list(kind).await?;
        println!("\nFailed items: {} ({})\n", kind, entries.len());
        for entry in entries {
            println!(
                "  {}  {}  {}",
                entry.failed_at.to_rfc3339(),
                entry.item_id,
                entry.reason
            );
        }
    }
    println!();

    Ok(())
}
