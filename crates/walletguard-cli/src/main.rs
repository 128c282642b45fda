use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use walletguard_core::paths::{data_dir, DATA_DIR_ENV};
use walletguard_core::settings::load_settings;
use walletguard_core::storage::FileStore;
use walletguard_core::{AuthError, AuthService};

#[derive(Parser, Debug)]
#[command(name = "walletguard")]
#[command(author, version, about = "Wallet extension credential and session control", long_about = None)]
struct Cli {
    /// Directory holding store.json and settings.json
    #[arg(long, global = true, env = DATA_DIR_ENV)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the encrypted vault
    Register {
        #[arg(long)]
        salt: String,
    },
    /// Unlock the vault and start a new session
    Login {
        #[arg(long)]
        domain: String,
    },
    /// Show whether the current session is valid
    Status,
    /// Mark the current session as recently used
    Touch,
    /// End the current session
    Logout,
    /// Let a domain see an asset's balance
    Grant {
        #[arg(long)]
        domain: String,
        #[arg(long)]
        asset: String,
    },
    /// Check whether a domain may see an asset's balance
    Check {
        #[arg(long)]
        domain: String,
        #[arg(long)]
        asset: String,
    },
    /// List the assets a domain may see
    Grants {
        #[arg(long)]
        domain: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();
    let data = match cli.data_dir {
        Some(dir) => dir,
        None => data_dir()?,
    };
    std::fs::create_dir_all(&data)?;
    let settings = load_settings(data.join("settings.json"))?;
    let store = Arc::new(FileStore::open(data.join("store.json"))?);
    let auth = AuthService::new(store, &settings);

    match cli.command {
        Commands::Register { salt } => {
            let password = prompt_password_twice("Create vault password")?;
            let registration = auth.register_extension(&password, &salt).await?;
            println!("Vault created");
            println!("Public key: {}", registration.public_key);
        }
        Commands::Login { domain } => {
            let password = prompt_password_once("Vault password")?;
            let session = auth.login(&password, &domain).await?;
            println!("Session {} started at {}", session.id, session.created_at);
        }
        Commands::Status => match auth.validate_session().await {
            Ok(session) => {
                println!("Session {} is active", session.id);
                println!("  created:     {}", session.created_at);
                println!("  last active: {}", session.last_active);
                println!("  grants:      {}", session.grants.len());
            }
            Err(AuthError::NoSession) => println!("No active session"),
            Err(e) => return Err(e.into()),
        },
        Commands::Touch => {
            let session = auth.sessions().touch().await?;
            println!("Session {} last active {}", session.id, session.last_active);
        }
        Commands::Logout => {
            auth.logout().await?;
            println!("Logged out");
        }
        Commands::Grant { domain, asset } => {
            let password = prompt_password_once("Vault password")?;
            auth.enable_asset_for_domain(&password, &domain, &asset).await?;
            println!("{domain} may now see {asset}");
        }
        Commands::Check { domain, asset } => match auth.validate_domain_access(&domain, &asset).await {
            Ok(()) => println!("granted"),
            Err(AuthError::Permission(permission)) => {
                println!("{}", serde_json::to_string_pretty(&permission)?);
                return Err(anyhow!("{domain} has not been granted access to {asset}"));
            }
            Err(e) => return Err(e.into()),
        },
        Commands::Grants { domain } => {
            for asset in auth.grants().granted_assets(&domain).await? {
                println!("{asset}");
            }
        }
    }
    Ok(())
}

const PASSWORD_ENV: &str = "WALLETGUARD_PASSWORD";

fn prompt_password_once(prompt: &str) -> Result<String> {
    if let Ok(pw) = std::env::var(PASSWORD_ENV) {
        if !pw.is_empty() {
            return Ok(pw);
        }
    }
    let pw = rpassword::prompt_password(format!("{prompt}: "))
        .map_err(|e| anyhow!("password prompt: {e}"))?;
    if pw.is_empty() {
        return Err(anyhow!("password must not be empty"));
    }
    Ok(pw)
}

fn prompt_password_twice(prompt: &str) -> Result<String> {
    if let Ok(pw) = std::env::var(PASSWORD_ENV) {
        if !pw.is_empty() {
            return Ok(pw);
        }
    }
    let first = prompt_password_once(prompt)?;
    let second = rpassword::prompt_password("Confirm password: ")
        .map_err(|e| anyhow!("password prompt: {e}"))?;
    if first != second {
        return Err(anyhow!("password confirmation mismatch"));
    }
    Ok(first)
}
