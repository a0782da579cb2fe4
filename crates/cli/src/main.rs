//! Command-line client and key administration for gemvault.

mod api_client;

use anyhow::{Context, Result};
use api_client::{ApiClient, YankRequest};
use clap::{Args, Parser, Subcommand};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use gemvault_core::config::AppConfig;
use gemvault_core::{Permission, hash_key};
use gemvault_metadata::{AuthorizationRow, MetadataStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

const DEFAULT_SERVER: &str = "http://127.0.0.1:9292/private";

#[derive(Parser)]
#[command(name = "gemvaultctl")]
#[command(about = "Push, yank and authorize gems on a gemvault server")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct ApiArgs {
    /// URL of the private gem source, prefix included
    #[arg(long, env = "GEMVAULT_URL", default_value = DEFAULT_SERVER)]
    server: String,

    /// Authorization key
    #[arg(long, env = "GEMVAULT_KEY", hide_env_values = true)]
    key: String,
}

#[derive(Args, Clone)]
struct ServerConfigArgs {
    /// Server configuration file; names the metadata database
    #[arg(
        long,
        env = "GEMVAULT_CONFIG",
        default_value = "config/server.toml"
    )]
    config: PathBuf,
}

#[derive(Args, Clone)]
struct VersionArgs {
    /// Gem name
    gem_name: String,
    /// Version to change
    #[arg(long)]
    version: String,
    /// Platform of the version, if not plain ruby
    #[arg(long)]
    platform: Option<String>,
}

impl From<VersionArgs> for YankRequest {
    fn from(args: VersionArgs) -> Self {
        Self {
            gem_name: args.gem_name,
            version: args.version,
            platform: args.platform,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Push a .gem archive to the private source
    Push {
        /// Path to the .gem file
        gem: PathBuf,
        #[command(flatten)]
        api: ApiArgs,
    },
    /// Yank a version: hide it from indexes and downloads
    Yank {
        #[command(flatten)]
        target: VersionArgs,
        #[command(flatten)]
        api: ApiArgs,
    },
    /// Restore a yanked version
    Unyank {
        #[command(flatten)]
        target: VersionArgs,
        #[command(flatten)]
        api: ApiArgs,
    },
    /// Create an authorization key in the server's metadata database
    Authorize {
        /// Permission to grant: all, push, yank or fetch (repeatable; default all)
        #[arg(long = "permission", value_name = "PERMISSION")]
        permissions: Vec<String>,
        /// Human-readable name for the key
        #[arg(long)]
        name: Option<String>,
        /// Use this key instead of generating one
        #[arg(long)]
        key: Option<String>,
        #[command(flatten)]
        config: ServerConfigArgs,
    },
    /// Revoke an authorization key
    Revoke {
        /// The key to revoke
        key: String,
        #[command(flatten)]
        config: ServerConfigArgs,
    },
    /// List authorization keys (hashes are never shown)
    Keys {
        #[command(flatten)]
        config: ServerConfigArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let Cli { command } = Cli::parse();

    match command {
        Commands::Push { gem, api } => handle_push_command(&gem, &api).await,
        Commands::Yank { target, api } => {
            let client = ApiClient::new(&api.server, &api.key)?;
            println!("{}", client.yank(&target.into()).await?);
            Ok(())
        }
        Commands::Unyank { target, api } => {
            let client = ApiClient::new(&api.server, &api.key)?;
            println!("{}", client.unyank(&target.into()).await?);
            Ok(())
        }
        Commands::Authorize {
            permissions,
            name,
            key,
            config,
        } => handle_authorize_command(&permissions, name, key, &config.config).await,
        Commands::Revoke { key, config } => handle_revoke_command(&key, &config.config).await,
        Commands::Keys { config } => handle_keys_command(&config.config).await,
    }
}

async fn handle_push_command(gem: &Path, api: &ApiArgs) -> Result<()> {
    let data = tokio::fs::read(gem)
        .await
        .with_context(|| format!("failed to read {}", gem.display()))?;
    tracing::debug!(path = %gem.display(), size = data.len(), "pushing gem");

    let client = ApiClient::new(&api.server, &api.key)?;
    println!("{}", client.push(data).await?);
    Ok(())
}

async fn handle_authorize_command(
    permissions: &[String],
    name: Option<String>,
    key: Option<String>,
    config_path: &Path,
) -> Result<()> {
    let permissions = parse_permissions(permissions)?;
    let key = match key {
        Some(key) if key.trim().is_empty() => anyhow::bail!("key must not be blank"),
        Some(key) => key.trim().to_string(),
        None => generate_key(),
    };

    let metadata = open_metadata(config_path).await?;
    let key_hash = hash_key(&key);
    if let Some(existing) = metadata.get_authorization_by_hash(&key_hash).await? {
        anyhow::bail!(
            "key already recorded (id={}); revoke it or choose another key",
            existing.authorization_id
        );
    }

    let row = AuthorizationRow::new(key_hash, &permissions, name)?;
    metadata.create_authorization(&row).await?;

    let granted: Vec<&str> = permissions.iter().map(Permission::as_str).collect();
    println!("Authorization key: {key}");
    println!("  ID:          {}", row.authorization_id);
    println!("  Permissions: {}", granted.join(", "));
    eprintln!("Save the key now; only its hash is stored.");
    Ok(())
}

async fn handle_revoke_command(key: &str, config_path: &Path) -> Result<()> {
    let metadata = open_metadata(config_path).await?;
    let row = metadata
        .get_authorization_by_hash(&hash_key(key.trim()))
        .await?
        .ok_or_else(|| anyhow::anyhow!("no such authorization key"))?;
    if row.revoked_at.is_some() {
        anyhow::bail!("key {} is already revoked", row.authorization_id);
    }

    metadata
        .revoke_authorization(row.authorization_id, OffsetDateTime::now_utc())
        .await?;
    println!("Revoked key {}", row.authorization_id);
    Ok(())
}

async fn handle_keys_command(config_path: &Path) -> Result<()> {
    let metadata = open_metadata(config_path).await?;
    let rows = metadata.list_authorizations().await?;
    if rows.is_empty() {
        println!("No authorization keys.");
        return Ok(());
    }

    for row in rows {
        let permissions = row
            .to_authorization()
            .map(|auth| {
                let mut names: Vec<&str> = auth.permissions.iter().map(Permission::as_str).collect();
                names.sort_unstable();
                names.join(",")
            })
            .unwrap_or_else(|_| "<invalid>".to_string());
        let status = match row.revoked_at {
            Some(at) => format!("revoked {}", format_time(at)),
            None => "active".to_string(),
        };
        println!(
            "{}  {:<16}  {:<14}  created {}  {}",
            row.authorization_id,
            row.name.as_deref().unwrap_or("-"),
            permissions,
            format_time(row.created_at),
            status
        );
    }
    Ok(())
}

fn parse_permissions(names: &[String]) -> Result<Vec<Permission>> {
    if names.is_empty() {
        return Ok(vec![Permission::All]);
    }
    let mut permissions = Vec::with_capacity(names.len());
    for name in names {
        let permission = Permission::parse(name)
            .with_context(|| format!("unknown permission {name:?} (expected all, push, yank or fetch)"))?;
        if !permissions.contains(&permission) {
            permissions.push(permission);
        }
    }
    Ok(permissions)
}

/// Generate a random key: 16 bytes from a cryptographically secure RNG, hex encoded.
fn generate_key() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn format_time(at: OffsetDateTime) -> String {
    at.format(&Rfc3339).unwrap_or_else(|_| at.to_string())
}

/// Load the server configuration the same way `gemvaultd` does.
fn load_server_config(path: &Path) -> Result<AppConfig> {
    let mut figment = Figment::new();
    if path.exists() {
        figment = figment.merge(Toml::file(path));
    }

    let config: AppConfig = figment
        .merge(
            Env::prefixed("GEMVAULT_")
                .ignore(&["config", "url", "key"])
                .split("__"),
        )
        .extract()
        .context("failed to load server configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    Ok(config)
}

async fn open_metadata(config_path: &Path) -> Result<Arc<dyn MetadataStore>> {
    let config = load_server_config(config_path)?;
    gemvault_metadata::from_config(&config.metadata)
        .await
        .context("failed to open metadata store")
}
