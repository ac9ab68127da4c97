//! Command handlers for the ltd CLI

use crate::ci::{resolve_git_refs, travis_skip_message, CiEnv};
use crate::{
    AwsArgs, Cli, ConfigAction, CopyArgs, DeleteArgs, PurgeArgs, SyncArgs, UploadArgs, UsageError,
};
use anyhow::Result;
use ltd_conveyor_core::config::DEFAULT_KEEPER_HOST;
use ltd_conveyor_core::{
    config_exists, copy_dir, delete_prefix, get_config_path, load_config, open_bucket, sync_dir,
    upload_build, validate_config, BucketOptions, ConfigFile, CopyOptions, Error, FastlyClient,
    KeeperClient, KeeperSession, PresignedUploader, S3Bucket, StoreCredentials, SyncOptions,
};
use tracing::debug;

/// Settings shared by every command, merged from flags, environment and
/// the config file
pub struct Context {
    pub config: ConfigFile,
    pub log_level: String,
    pub host: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub http: reqwest::Client,
}

impl Context {
    pub fn new(cli: &Cli) -> Result<Self> {
        let config = match load_config() {
            Ok(config) => config,
            Err(Error::ConfigNotFound(_)) => ConfigFile::default(),
            Err(e) => return Err(e.into()),
        };
        let keeper = config.keeper.clone();

        let log_level = cli
            .log_level
            .clone()
            .or_else(|| config.logging.as_ref().map(|l| l.level.clone()))
            .unwrap_or_else(|| "info".to_string());
        let host = cli
            .host
            .clone()
            .or_else(|| keeper.as_ref().map(|k| k.host.clone()))
            .unwrap_or_else(|| DEFAULT_KEEPER_HOST.to_string());
        let user = cli
            .user
            .clone()
            .or_else(|| keeper.as_ref().and_then(|k| k.username.clone()));
        let password = cli
            .password
            .clone()
            .or_else(|| keeper.as_ref().and_then(|k| k.password.clone()));

        let http = reqwest::Client::builder()
            .user_agent(concat!("ltd-conveyor/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            config,
            log_level,
            host,
            user,
            password,
            http,
        })
    }

    fn keeper_credentials(&self) -> Result<(&str, &str), UsageError> {
        match (self.user.as_deref(), self.password.as_deref()) {
            (Some(user), Some(password)) => Ok((user, password)),
            _ => Err(UsageError(
                "An LTD Keeper username and password are required (--user/--password or LTD_USERNAME/LTD_PASSWORD).".to_string(),
            )),
        }
    }

    fn store_credentials(&self, aws: &AwsArgs) -> Result<StoreCredentials, UsageError> {
        match (&aws.aws_id, &aws.aws_secret, &aws.aws_profile) {
            (Some(id), Some(secret), _) => Ok(StoreCredentials::KeyPair {
                access_key_id: id.clone(),
                secret_access_key: secret.clone(),
            }),
            (Some(_), None, _) | (None, Some(_), _) => Err(UsageError(
                "Both --aws-id and --aws-secret are required".to_string(),
            )),
            (None, None, Some(profile)) => Ok(StoreCredentials::Profile(profile.clone())),
            (None, None, None) => self
                .config
                .aws
                .as_ref()
                .and_then(|aws| aws.credentials())
                .ok_or_else(|| {
                    UsageError(
                        "AWS credentials are required: pass --aws-id and --aws-secret, or --aws-profile"
                            .to_string(),
                    )
                }),
        }
    }

    async fn open_bucket(&self, bucket: &str, aws: &AwsArgs) -> Result<S3Bucket> {
        let credentials = self.store_credentials(aws)?;
        let configured = self
            .config
            .aws
            .as_ref()
            .map(|aws| aws.bucket_options())
            .unwrap_or_default();
        let options = BucketOptions {
            region: aws.aws_region.clone().or(configured.region),
            endpoint_url: aws.aws_endpoint.clone().or(configured.endpoint_url),
        };
        Ok(open_bucket(bucket, &credentials, &options).await?)
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Handle upload command
pub async fn handle_upload(context: &Context, args: UploadArgs) -> Result<()> {
    if args.skip {
        println!("Skipping ltd upload.");
        return Ok(());
    }

    let ci = args.ci_env();
    let events = args.travis_events();
    debug!(ci = ?ci, events = ?events, "CI environment");

    if ci == Some(CiEnv::Travis) {
        if let Some(message) = travis_skip_message(&events, env_var)? {
            println!("{}", message);
            return Ok(());
        }
    }

    let (user, password) = context.keeper_credentials()?;
    let git_refs = resolve_git_refs(ci, args.git_ref.as_deref(), env_var)?;
    let org = args.org.clone().or_else(|| {
        context
            .config
            .keeper
            .as_ref()
            .and_then(|keeper| keeper.org.clone())
    });

    println!(
        "Uploading {} as {} ({})...",
        args.dir.display(),
        args.product,
        git_refs.join(" ")
    );

    let client = KeeperClient::new(context.http.clone(), &context.host, user, password);
    let session = KeeperSession::connect(client, org.as_deref()).await?;
    let uploader = PresignedUploader::new(context.http.clone());

    let build = upload_build(&session, &uploader, &args.dir, &args.product, &git_refs).await?;

    println!("  ✅ Build uploaded: {}", build.self_url);
    if let Some(published_url) = &build.published_url {
        println!("  Published at: {}", published_url);
    }

    Ok(())
}

/// Handle sync command
pub async fn handle_sync(context: &Context, args: SyncArgs) -> Result<()> {
    if !args.dir.is_dir() {
        return Err(UsageError(format!("{} is not a directory", args.dir.display())).into());
    }

    let bucket = context.open_bucket(&args.bucket, &args.aws).await?;
    let options = SyncOptions {
        upload_dir_redirect_objects: !args.no_dir_redirects,
        surrogate_key: args.surrogate_key,
        cache_control: args.cache_control,
        surrogate_control: args.surrogate_control,
        acl: args.acl,
    };

    println!(
        "Synchronizing {} with s3://{}/{}...",
        args.dir.display(),
        args.bucket,
        args.path
    );
    let report = sync_dir(&bucket, &args.path, &args.dir, &options).await?;

    println!("  ✅ Uploaded {} files", report.files_uploaded);
    println!(
        "  Deleted {} files and {} directories",
        report.files_deleted, report.directories_deleted
    );
    if options.upload_dir_redirect_objects {
        println!("  Wrote {} directory redirect objects", report.redirect_objects);
    }

    Ok(())
}

/// Handle copy command
pub async fn handle_copy(context: &Context, args: CopyArgs) -> Result<()> {
    let bucket = context.open_bucket(&args.bucket, &args.aws).await?;
    let options = CopyOptions {
        surrogate_key: args.surrogate_key,
        cache_control: args.cache_control,
        surrogate_control: args.surrogate_control,
        create_directory_redirect_object: !args.no_dir_redirect,
    };

    println!(
        "Copying s3://{}/{} to {}...",
        args.bucket, args.src, args.dest
    );
    let copied = copy_dir(&bucket, &args.src, &args.dest, &options).await?;
    println!("  ✅ Copied {} objects", copied);

    Ok(())
}

/// Handle delete command
pub async fn handle_delete(context: &Context, args: DeleteArgs) -> Result<()> {
    let bucket = context.open_bucket(&args.bucket, &args.aws).await?;

    println!("Deleting s3://{}/{}...", args.bucket, args.path);
    let deleted = delete_prefix(&bucket, &args.path).await?;

    if deleted == 0 {
        println!("  Nothing to delete");
    } else {
        println!("  ✅ Deleted {} objects", deleted);
    }

    Ok(())
}

/// Handle purge command
pub async fn handle_purge(context: &Context, args: PurgeArgs) -> Result<()> {
    let fastly = context.config.fastly.clone().unwrap_or_default();
    let service_id = args.service_id.or(fastly.service_id).ok_or_else(|| {
        UsageError("A Fastly service ID is required (--service-id or FASTLY_SERVICE_ID)".to_string())
    })?;
    let api_key = args.api_key.or(fastly.api_key).ok_or_else(|| {
        UsageError("A Fastly API key is required (--api-key or FASTLY_API_KEY)".to_string())
    })?;

    println!("Purging surrogate key {}...", args.surrogate_key);
    let client = FastlyClient::new(context.http.clone(), &service_id, &api_key);
    client.purge_key(&args.surrogate_key).await?;
    println!("  ✅ Purge requested");

    Ok(())
}

/// Handle config commands
pub async fn handle_config(context: &Context, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            println!("Current configuration:");
            let status = if config_exists() { "" } else { " (not found)" };
            println!("  File: {}{}", get_config_path()?.display(), status);
            println!();

            println!("LTD Keeper:");
            println!("  Host: {}", context.host);
            println!("  User: {}", context.user.as_deref().unwrap_or("(not set)"));
            println!(
                "  Password: {}",
                if context.password.is_some() { "********" } else { "(not set)" }
            );
            let org = context
                .config
                .keeper
                .as_ref()
                .and_then(|keeper| keeper.org.as_deref());
            println!("  Org: {}", org.unwrap_or("(not set)"));
            println!();

            println!("AWS:");
            match &context.config.aws {
                Some(aws) => {
                    let auth = match aws.credentials() {
                        Some(StoreCredentials::KeyPair { .. }) => "Access Keys".to_string(),
                        Some(StoreCredentials::Profile(profile)) => format!("Profile '{}'", profile),
                        None => "(not set)".to_string(),
                    };
                    println!("  Auth: {}", auth);
                    println!("  Region: {}", aws.region.as_deref().unwrap_or("(default)"));
                    if let Some(endpoint) = &aws.endpoint_url {
                        println!("  Endpoint: {}", endpoint);
                    }
                }
                None => println!("  (not set)"),
            }
            println!();

            println!("Fastly:");
            let service_id = context
                .config
                .fastly
                .as_ref()
                .and_then(|fastly| fastly.service_id.as_deref());
            println!("  Service ID: {}", service_id.unwrap_or("(not set)"));
            println!();

            println!("Logging:");
            println!("  Level: {}", context.log_level);

            Ok(())
        }
        ConfigAction::Validate => {
            println!("Validating configuration...");

            let config = load_config()?;
            validate_config(&config)?;
            println!("  ✅ Valid configuration format");

            if let (Some(user), Some(password)) = (&context.user, &context.password) {
                println!("  Testing LTD Keeper login...");
                let client = KeeperClient::new(context.http.clone(), &context.host, user, password);
                client.get_token().await?;
                println!("  ✅ LTD Keeper login successful!");
            }

            Ok(())
        }
    }
}
