use anyhow::Result;
use clap::builder::FalseyValueParser;
use clap::error::ErrorKind;
use clap::{Args, CommandFactory, Parser};
use color_eyre::config::HookBuilder;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod ci;
mod handlers;

/// A command-line error that should be reported as a usage error
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct UsageError(pub String);

/// ltd - Upload documentation builds to LSST the Docs
#[derive(Parser, Debug)]
#[command(name = "ltd")]
#[command(version)]
#[command(about = "Upload documentation site builds to LSST the Docs", long_about = None)]
pub struct Cli {
    /// Log level (warning, info, debug)
    #[arg(long, global = true, value_parser = ["warning", "info", "debug"])]
    log_level: Option<String>,

    /// LTD Keeper API host
    #[arg(long, global = true, env = "LTD_HOST")]
    host: Option<String>,

    /// LTD Keeper username
    #[arg(short = 'u', long = "user", global = true, env = "LTD_USERNAME")]
    user: Option<String>,

    /// LTD Keeper password
    #[arg(short = 'p', long, global = true, env = "LTD_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Command to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Upload a new site build through LTD Keeper
    Upload(UploadArgs),

    /// Synchronize a local directory with a bucket prefix
    Sync(SyncArgs),

    /// Copy a bucket directory to another prefix
    Copy(CopyArgs),

    /// Delete every object under a bucket prefix
    Delete(DeleteArgs),

    /// Purge a surrogate key from the Fastly cache
    Purge(PurgeArgs),

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug, Clone, Copy)]
pub enum ConfigAction {
    /// Show the current configuration
    Show,
    /// Validate the configuration file
    Validate,
}

#[derive(Args, Debug)]
pub struct UploadArgs {
    /// Product (project) name
    #[arg(long, visible_alias = "project")]
    pub product: String,

    /// Organization, required by LTD Keeper v2 servers
    #[arg(long, env = "LTD_ORG")]
    pub org: Option<String>,

    /// Directory with files to upload
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,

    /// Git ref, or space-delimited list of git refs
    #[arg(long)]
    pub git_ref: Option<String>,

    /// Take the git ref from the GitHub Actions environment
    #[arg(long, conflicts_with = "travis")]
    pub gh: bool,

    /// Take the git ref from the Travis CI environment
    #[arg(long)]
    pub travis: bool,

    /// Upload on a Travis CI push event (default)
    #[arg(long, overrides_with = "no_travis_push")]
    pub on_travis_push: bool,
    /// Skip the upload on a Travis CI push event
    #[arg(long, overrides_with = "on_travis_push")]
    pub no_travis_push: bool,

    /// Upload on a Travis CI pull request event
    #[arg(long, overrides_with = "no_travis_pr")]
    pub on_travis_pr: bool,
    /// Skip the upload on a Travis CI pull request event (default)
    #[arg(long, overrides_with = "on_travis_pr")]
    pub no_travis_pr: bool,

    /// Upload on a Travis CI API event (default)
    #[arg(long, overrides_with = "no_travis_api")]
    pub on_travis_api: bool,
    /// Skip the upload on a Travis CI API event
    #[arg(long, overrides_with = "on_travis_api")]
    pub no_travis_api: bool,

    /// Upload on a Travis CI cron event (default)
    #[arg(long, overrides_with = "no_travis_cron")]
    pub on_travis_cron: bool,
    /// Skip the upload on a Travis CI cron event
    #[arg(long, overrides_with = "on_travis_cron")]
    pub no_travis_cron: bool,

    /// Skip the upload, making the command a no-op
    #[arg(long, env = "LTD_SKIP_UPLOAD", value_parser = FalseyValueParser::new())]
    pub skip: bool,
}

impl UploadArgs {
    pub fn ci_env(&self) -> Option<ci::CiEnv> {
        if self.travis {
            Some(ci::CiEnv::Travis)
        } else if self.gh {
            Some(ci::CiEnv::GitHubActions)
        } else {
            None
        }
    }

    pub fn travis_events(&self) -> ci::TravisEvents {
        ci::TravisEvents {
            push: !self.no_travis_push,
            pull_request: self.on_travis_pr,
            api: !self.no_travis_api,
            cron: !self.no_travis_cron,
        }
    }
}

/// AWS credentials and connection options
#[derive(Args, Debug, Clone)]
pub struct AwsArgs {
    /// AWS access key ID
    #[arg(long, env = "AWS_ACCESS_KEY_ID", hide_env_values = true)]
    pub aws_id: Option<String>,

    /// AWS secret access key
    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    pub aws_secret: Option<String>,

    /// AWS profile name
    #[arg(long, env = "AWS_PROFILE")]
    pub aws_profile: Option<String>,

    /// AWS region
    #[arg(long)]
    pub aws_region: Option<String>,

    /// Custom endpoint URL for S3-compatible stores
    #[arg(long)]
    pub aws_endpoint: Option<String>,
}

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Bucket name
    #[arg(long)]
    pub bucket: String,

    /// Root prefix in the bucket
    #[arg(long)]
    pub path: String,

    /// Local directory to upload
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,

    /// Surrogate-Key metadata for every object
    #[arg(long)]
    pub surrogate_key: Option<String>,

    /// Cache-Control header for every object
    #[arg(long)]
    pub cache_control: Option<String>,

    /// Surrogate-Control metadata for every object
    #[arg(long)]
    pub surrogate_control: Option<String>,

    /// Canned ACL for every object
    #[arg(long)]
    pub acl: Option<String>,

    /// Do not write directory redirect objects
    #[arg(long)]
    pub no_dir_redirects: bool,

    #[command(flatten)]
    pub aws: AwsArgs,
}

#[derive(Args, Debug)]
pub struct CopyArgs {
    /// Bucket name
    #[arg(long)]
    pub bucket: String,

    /// Source directory prefix
    #[arg(long)]
    pub src: String,

    /// Destination directory prefix (replaced)
    #[arg(long)]
    pub dest: String,

    /// Surrogate-Key metadata override
    #[arg(long)]
    pub surrogate_key: Option<String>,

    /// Cache-Control header override
    #[arg(long)]
    pub cache_control: Option<String>,

    /// Surrogate-Control metadata override
    #[arg(long)]
    pub surrogate_control: Option<String>,

    /// Do not write a redirect object for the destination directory
    #[arg(long)]
    pub no_dir_redirect: bool,

    #[command(flatten)]
    pub aws: AwsArgs,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Bucket name
    #[arg(long)]
    pub bucket: String,

    /// Prefix to delete
    #[arg(long)]
    pub path: String,

    #[command(flatten)]
    pub aws: AwsArgs,
}

#[derive(Args, Debug)]
pub struct PurgeArgs {
    /// Surrogate key to purge
    #[arg(long)]
    pub surrogate_key: String,

    /// Fastly service ID
    #[arg(long, env = "FASTLY_SERVICE_ID")]
    pub service_id: Option<String>,

    /// Fastly API key
    #[arg(long, env = "FASTLY_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,
}

fn init_logging(level: &str) {
    let level = match level {
        "warning" => "warn",
        other => other,
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("warn,ltd={level},ltd_conveyor_core={level}"))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(level == "debug")
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Setup error handling
    if let Err(e) = HookBuilder::default().install() {
        eprintln!("Warning: Failed to install error handler: {}", e);
    }

    // Parse CLI arguments
    let cli = Cli::parse();

    let context = handlers::Context::new(&cli)?;
    init_logging(&context.log_level);

    // Execute command
    let result = match cli.command {
        Commands::Upload(args) => handlers::handle_upload(&context, args).await,
        Commands::Sync(args) => handlers::handle_sync(&context, args).await,
        Commands::Copy(args) => handlers::handle_copy(&context, args).await,
        Commands::Delete(args) => handlers::handle_delete(&context, args).await,
        Commands::Purge(args) => handlers::handle_purge(&context, args).await,
        Commands::Config { action } => handlers::handle_config(&context, action).await,
    };

    match result {
        Err(e) => match e.downcast::<UsageError>() {
            Ok(usage) => Cli::command().error(ErrorKind::MissingRequiredArgument, usage).exit(),
            Err(e) => Err(e),
        },
        Ok(()) => Ok(()),
    }
}
