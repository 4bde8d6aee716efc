//! Command-line client for the ferry storage network.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use ferry_bridge::{BridgeClient, BucketRequest, TokenOperation};
use ferry_core::{ClientConfig, FrameId};
use ferry_signer::KeyPair;
use ferry_transfer::{DownloadResolver, TcpConnector, UploadOptions, UploadOrchestrator};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ferryctl")]
#[command(about = "Command-line client for the ferry storage network")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct GlobalArgs {
    /// Config file path
    #[arg(long, global = true, env = "FERRY_CONFIG")]
    config: Option<PathBuf>,

    /// Bridge URL (overrides config)
    #[arg(long, global = true)]
    bridge: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Key management commands
    Key {
        #[command(subcommand)]
        command: KeyCommands,
    },
    /// Show bridge information
    Info,
    /// Bucket management commands
    Buckets {
        #[command(subcommand)]
        command: BucketCommands,
    },
    /// File management commands
    Files {
        #[command(subcommand)]
        command: FileCommands,
    },
    /// Staging frame commands
    Frames {
        #[command(subcommand)]
        command: FrameCommands,
    },
    /// Upload a local file into a bucket
    Upload {
        /// Bucket ID
        bucket: String,
        /// File to upload
        file: PathBuf,
        /// PUSH token (created when omitted)
        #[arg(long)]
        token: Option<String>,
        /// Shard size in bytes (overrides config)
        #[arg(long)]
        shard_size: Option<u64>,
    },
    /// Download a file from a bucket
    Download {
        /// Bucket ID
        bucket: String,
        /// File ID
        file_id: String,
        /// Output path (stdout when omitted)
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// PULL token (created when omitted)
        #[arg(long)]
        token: Option<String>,
    },
}

#[derive(Subcommand)]
enum KeyCommands {
    /// Generate a new signing key pair
    Generate {
        /// Write the secret key to this file instead of printing it
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print the public key for a secret key
    Public {
        /// Read the secret key from a file
        #[arg(long)]
        file: Option<PathBuf>,
        /// Secret key value
        #[arg(long)]
        value: Option<String>,
    },
}

#[derive(Subcommand)]
enum BucketCommands {
    /// List buckets
    List,
    /// Create a bucket
    Create {
        /// Bucket name
        name: String,
        /// Public keys allowed to use the bucket
        #[arg(long = "pubkey")]
        pubkeys: Vec<String>,
    },
    /// Delete a bucket
    Remove {
        /// Bucket ID
        id: String,
    },
}

#[derive(Subcommand)]
enum FileCommands {
    /// List files in a bucket
    List {
        /// Bucket ID
        bucket: String,
    },
    /// Remove a file from a bucket
    Remove {
        /// Bucket ID
        bucket: String,
        /// File ID
        file_id: String,
    },
}

#[derive(Subcommand)]
enum FrameCommands {
    /// List staging frames
    List,
    /// Discard a staging frame
    Discard {
        /// Frame ID
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let Cli { global, command } = Cli::parse();

    match command {
        Commands::Key { command } => handle_key_command(command).await,
        Commands::Info => {
            let (_, client) = connect(&global)?;
            handle_info_command(&client).await
        }
        Commands::Buckets { command } => {
            let (_, client) = connect(&global)?;
            handle_bucket_command(command, &client).await
        }
        Commands::Files { command } => {
            let (_, client) = connect(&global)?;
            handle_file_command(command, &client).await
        }
        Commands::Frames { command } => {
            let (_, client) = connect(&global)?;
            handle_frame_command(command, &client).await
        }
        Commands::Upload {
            bucket,
            file,
            token,
            shard_size,
        } => {
            let (config, client) = connect(&global)?;
            handle_upload_command(&config, client, &bucket, &file, token, shard_size).await
        }
        Commands::Download {
            bucket,
            file_id,
            output,
            token,
        } => {
            let (config, client) = connect(&global)?;
            handle_download_command(&config, &client, &bucket, &file_id, output, token).await
        }
    }
}

fn connect(global: &GlobalArgs) -> Result<(ClientConfig, BridgeClient)> {
    let config = resolve_config(global)?;
    let client = BridgeClient::from_config(&config).context("failed to create bridge client")?;
    Ok((config, client))
}

async fn handle_key_command(command: KeyCommands) -> Result<()> {
    match command {
        KeyCommands::Generate { output } => {
            let keypair = KeyPair::generate();
            let secret_key = keypair.to_hex_secret();

            if let Some(path) = output {
                write_secret(&path, &secret_key).await?;
                println!("Secret key written to: {}", path.display());
            } else {
                println!("Secret key:");
                println!("{secret_key}");
            }

            println!("\nPublic key:");
            println!("{}", keypair.public_hex());
            println!("\nSet it for ferryctl with:");
            println!("  FERRY_AUTH__SECRET_KEY=<secret key>");
        }
        KeyCommands::Public { file, value } => {
            let secret_key = if let Some(path) = file {
                tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("failed to read key file: {}", path.display()))?
            } else if let Some(key) = value {
                key
            } else {
                anyhow::bail!("one of --file or --value is required");
            };

            let keypair =
                KeyPair::from_hex_secret(secret_key.trim()).context("failed to parse secret key")?;
            println!("{}", keypair.public_hex());
        }
    }
    Ok(())
}

async fn write_secret(path: &Path, secret_key: &str) -> Result<()> {
    tokio::fs::write(path, secret_key)
        .await
        .with_context(|| format!("failed to write key to {}", path.display()))?;

    // The file holds a private key
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(path, perms).await?;
    }

    Ok(())
}

async fn handle_info_command(client: &BridgeClient) -> Result<()> {
    let info = client
        .get_info()
        .await
        .context("failed to fetch bridge info")?;
    println!("{info:#}");
    Ok(())
}

async fn handle_bucket_command(command: BucketCommands, client: &BridgeClient) -> Result<()> {
    match command {
        BucketCommands::List => {
            let buckets = client.get_buckets().await.context("failed to list buckets")?;
            if buckets.is_empty() {
                println!("No buckets found.");
            } else {
                println!("{:<26} {:<32} {:<10}", "ID", "Name", "Status");
                println!("{}", "-".repeat(70));
                for bucket in buckets {
                    println!(
                        "{:<26} {:<32} {:<10}",
                        bucket.id,
                        bucket.name.as_deref().unwrap_or("-"),
                        bucket.status.as_deref().unwrap_or("-"),
                    );
                }
            }
        }
        BucketCommands::Create { name, pubkeys } => {
            let request = BucketRequest {
                name: Some(name),
                pubkeys: (!pubkeys.is_empty()).then_some(pubkeys),
                ..Default::default()
            };
            let bucket = client
                .create_bucket(&request)
                .await
                .context("failed to create bucket")?;
            println!("Bucket created successfully!");
            println!("\nBucket ID: {}", bucket.id);
            if let Some(name) = &bucket.name {
                println!("Name: {name}");
            }
        }
        BucketCommands::Remove { id } => {
            client
                .destroy_bucket_by_id(&id)
                .await
                .context("failed to remove bucket")?;
            println!("Bucket removed: {id}");
        }
    }
    Ok(())
}

async fn handle_file_command(command: FileCommands, client: &BridgeClient) -> Result<()> {
    match command {
        FileCommands::List { bucket } => {
            let files = client
                .list_files_in_bucket(&bucket)
                .await
                .context("failed to list files")?;
            if files.is_empty() {
                println!("No files found.");
            } else {
                println!("{:<26} {:<40} {:>12}", "ID", "Name", "Size");
                println!("{}", "-".repeat(80));
                for file in files {
                    println!(
                        "{:<26} {:<40} {:>12}",
                        file.id,
                        file.filename.as_deref().unwrap_or("-"),
                        file.size.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string()),
                    );
                }
            }
        }
        FileCommands::Remove { bucket, file_id } => {
            client
                .remove_file_from_bucket(&bucket, &file_id)
                .await
                .context("failed to remove file")?;
            println!("File removed: {file_id}");
        }
    }
    Ok(())
}

async fn handle_frame_command(command: FrameCommands, client: &BridgeClient) -> Result<()> {
    match command {
        FrameCommands::List => {
            let frames = client.get_frames().await.context("failed to list frames")?;
            if frames.is_empty() {
                println!("No staging frames.");
            } else {
                println!("{:<26} {:>8} {:<8}", "ID", "Shards", "Locked");
                println!("{}", "-".repeat(44));
                for frame in frames {
                    println!(
                        "{:<26} {:>8} {:<8}",
                        frame.id.as_str(),
                        frame.shards.len(),
                        frame.locked
                    );
                }
            }
        }
        FrameCommands::Discard { id } => {
            client
                .destroy_frame_by_id(&FrameId::new(id.clone()))
                .await
                .context("failed to discard frame")?;
            println!("Frame discarded: {id}");
        }
    }
    Ok(())
}

async fn handle_upload_command(
    config: &ClientConfig,
    client: BridgeClient,
    bucket: &str,
    file: &Path,
    token: Option<String>,
    shard_size: Option<u64>,
) -> Result<()> {
    let token = match token {
        Some(token) => token,
        None => {
            client
                .create_token(bucket, TokenOperation::Push)
                .await
                .context("failed to create upload token")?
                .token
        }
    };

    let mut options = UploadOptions::from(config);
    if let Some(shard_size) = shard_size {
        ferry_core::shard::validate_shard_size(shard_size)?;
        options.shard_size = shard_size;
    }

    let orchestrator =
        UploadOrchestrator::new(Arc::new(client), Arc::new(TcpConnector::new()), options);
    let entry = orchestrator
        .store_file(bucket, &token, file)
        .await
        .with_context(|| format!("failed to upload {}", file.display()))?;

    println!("File uploaded: {}", entry.id);
    if let Some(size) = entry.size {
        println!("Size: {size} bytes");
    }
    Ok(())
}

async fn handle_download_command(
    config: &ClientConfig,
    client: &BridgeClient,
    bucket: &str,
    file_id: &str,
    output: Option<PathBuf>,
    token: Option<String>,
) -> Result<()> {
    let token = match token {
        Some(token) => token,
        None => {
            client
                .create_token(bucket, TokenOperation::Pull)
                .await
                .context("failed to create download token")?
                .token
        }
    };

    let resolver = DownloadResolver::new(Arc::new(TcpConnector::new()), config.open_timeout());
    let muxer = resolver
        .resolve_file(client, bucket, &token, file_id)
        .await
        .with_context(|| format!("failed to resolve file {file_id}"))?;
    let mut reader = Box::pin(muxer.into_async_read());

    match output {
        Some(path) => {
            let mut file = tokio::fs::File::create(&path)
                .await
                .with_context(|| format!("failed to create {}", path.display()))?;
            let copied = tokio::io::copy(&mut reader, &mut file).await;
            let written = match copied {
                Ok(written) => written,
                Err(err) => {
                    drop(file);
                    let _ = tokio::fs::remove_file(&path).await;
                    return Err(err).context("download failed");
                }
            };
            file.flush().await?;
            eprintln!("Downloaded {written} bytes to {}", path.display());
        }
        None => {
            let mut stdout = tokio::io::stdout();
            tokio::io::copy(&mut reader, &mut stdout)
                .await
                .context("download failed")?;
            stdout.flush().await?;
        }
    }
    Ok(())
}

fn config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    let base = match std::env::var_os("XDG_CONFIG_HOME") {
        Some(path) => PathBuf::from(path),
        None => PathBuf::from(std::env::var_os("HOME")?).join(".config"),
    };
    Some(base.join("ferry").join("config.toml"))
}

fn load_config(path: Option<&Path>) -> Result<ClientConfig> {
    let mut figment = Figment::new();

    if let Some(path) = path
        && path.exists()
    {
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("FERRY_").split("__"));

    figment
        .extract()
        .map_err(|err| anyhow::anyhow!(err).context("failed to load client configuration"))
}

fn resolve_config(global: &GlobalArgs) -> Result<ClientConfig> {
    let path = config_path(global.config.as_deref());
    let mut config = load_config(path.as_deref())?;
    if let Some(bridge) = &global.bridge {
        config.bridge_url = bridge.clone();
    }
    config.validate().context("invalid client configuration")?;
    tracing::debug!(bridge = %config.bridge_url, "loaded configuration");
    Ok(config)
}
