use clap::{Args, Parser, Subcommand};
use edutube_core::HarvesterKind;
use std::path::PathBuf;
use std::sync::LazyLock;

static VERSION_INFO: LazyLock<String> = LazyLock::new(|| {
    let version = env!("CARGO_PKG_VERSION");

    // Use VERGEN_GIT_SHA for the commit hash (with safe slicing)
    let commit = option_env!("VERGEN_GIT_SHA")
        .map(|s| s.chars().take(7).collect::<String>())
        .unwrap_or_else(|| "unknown".to_string());

    let built = option_env!("VERGEN_BUILD_DATE").unwrap_or("unknown"); // YYYY-MM-DD
    let target = option_env!("VERGEN_CARGO_TARGET_TRIPLE").unwrap_or("unknown");
    let rustc = option_env!("VERGEN_RUSTC_SEMVER").unwrap_or("unknown");

    format!("{version}\ncommit: {commit}\nbuilt: {built}\ntarget: {target}\nrustc: {rustc}")
});

pub fn version_info() -> &'static str {
    &VERSION_INFO
}

/// CLI configuration parsed from command line arguments and environment variables
#[derive(Parser, Debug)]
#[command(name = "edutube")]
#[command(
    author,
    version = version_info(),
    about = "Resumable YouTube harvester and feature preparation for educational-video classification"
)]
#[command(after_help = "Examples:
  edutube search-videos --keywords keywords.json --credentials api_keys.json
  edutube transcripts
  edutube channels --credentials api_keys.json
  edutube embed --limit 500
  edutube sample --size 3000 --seed 42
  edutube status --failed comments

Every harvester saves its position after each item. Interrupt with Ctrl-C and
rerun the same command to continue where it stopped.")]
pub struct Config {
    /// SQLite database connection URL
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://youtube_data.db")]
    pub database_url: String,

    /// Log filter, e.g. "info" or "edutube_core=debug"
    #[arg(long, env = "EDUTUBE_LOG", default_value = "info")]
    pub log_level: String,

    /// Custom path to the harvest.toml tuning file
    #[arg(long, env = "EDUTUBE_TUNING", value_name = "PATH")]
    pub tuning: Option<PathBuf>,

    /// Directory holding the per-harvester progress files
    #[arg(long, env = "EDUTUBE_STATE_DIR", default_value = ".", value_name = "DIR")]
    pub state_dir: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every harvester subcommand.
#[derive(Args, Debug, Clone)]
pub struct HarvestArgs {
    /// Clear this harvester's failure ledger first so given-up items are retried
    #[arg(long)]
    pub retry_failed: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Search videos for every keyword and store their metadata
    #[command(after_help = "Example: edutube search-videos --keywords keywords.json --credentials api_keys.json")]
    SearchVideos {
        /// JSON file of the form {\"keywords\": [...]}
        #[arg(long, env = "EDUTUBE_KEYWORDS", default_value = "keywords.json")]
        keywords: PathBuf,
        /// JSON file of the form {\"keys\": [...]} with YouTube API keys
        #[arg(long, env = "EDUTUBE_CREDENTIALS", default_value = "api_keys.json")]
        credentials: PathBuf,
        #[command(flatten)]
        harvest: HarvestArgs,
    },
    /// Fetch English transcripts for every stored video
    Transcripts {
        #[command(flatten)]
        harvest: HarvestArgs,
    },
    /// Fetch transcripts in any language for videos still without one
    SupplementTranscripts {
        #[command(flatten)]
        harvest: HarvestArgs,
    },
    /// Resolve and store the channel of every video
    Channels {
        /// JSON file of the form {\"keys\": [...]} with YouTube API keys
        #[arg(long, env = "EDUTUBE_CREDENTIALS", default_value = "api_keys.json")]
        credentials: PathBuf,
        #[command(flatten)]
        harvest: HarvestArgs,
    },
    /// Fetch every comment thread and reply of every video
    Comments {
        /// JSON file of the form {\"keys\": [...]} with YouTube API keys
        #[arg(long, env = "EDUTUBE_CREDENTIALS", default_value = "api_keys.json")]
        credentials: PathBuf,
        #[command(flatten)]
        harvest: HarvestArgs,
    },
    /// Embed keyword summaries of every video not yet embedded with the model
    #[command(after_help = "Example: OPENAI_API_KEY=sk-... edutube embed --model text-embedding-3-small --limit 1000")]
    Embed {
        /// OpenAI API key
        #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
        openai_api_key: String,
        /// Embedding model name
        #[arg(long, env = "EMBEDDING_MODEL", default_value = edutube_client::openai::DEFAULT_EMBEDDING_MODEL)]
        model: String,
        /// Texts per API call
        #[arg(long, default_value = "64")]
        batch_size: usize,
        /// Maximum number of videos to embed in this run
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Draw the keyword-balanced training sample
    Sample {
        /// Number of videos to draw
        #[arg(long, default_value = "3000")]
        size: usize,
        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,
        /// Replace an existing sample
        #[arg(long)]
        force: bool,
    },
    /// Label the training sample with a chat model
    #[command(after_help = "Examples:
  OPENAI_API_KEY=sk-... edutube label --keywords keywords.json
  edutube label --keywords keywords.json --credentials openai_keys.json")]
    Label {
        /// JSON file of the form {\"keywords\": [...]} given to the classifier
        #[arg(long, env = "EDUTUBE_KEYWORDS", default_value = "keywords.json")]
        keywords: PathBuf,
        /// JSON file of the form {\"keys\": [...]} with OpenAI keys, rotated on quota errors
        #[arg(long)]
        credentials: Option<PathBuf>,
        /// Single OpenAI API key, ignored when a credential file is given
        #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
        openai_api_key: Option<String>,
        /// Chat model name
        #[arg(long, env = "LABEL_MODEL", default_value = edutube_client::classifier::DEFAULT_CHAT_MODEL)]
        model: String,
        #[command(flatten)]
        harvest: HarvestArgs,
    },
    /// Show table counts, failure-ledger counts and pending progress files
    Status {
        /// List the failure-ledger entries of one harvester
        #[arg(long, value_name = "HARVESTER")]
        failed: Option<HarvesterKind>,
    },
}
