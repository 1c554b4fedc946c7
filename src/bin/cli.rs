use std::path::PathBuf;
use std::sync::Arc;

use activo::config::Configuration;
use activo::crypto::PasswordManager;
use activo::database::Database;
use activo::messages::ErrorCatalog;
use activo::user::{Lookup, PostgresUserRepository, Profile, UserService};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about = "Activo administration commands", long_about = None)]
struct Args {
    /// Path to `config.yaml`.
    #[arg(long, short, env = "CONFIG_PATH")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug, Clone)]
enum Commands {
    /// Create an account holding every role.
    CreateSuperuser {
        #[arg(long)]
        email: String,
        #[arg(long, env = "ACTIVO_PASSWORD")]
        password: String,
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
    },
    /// Create a group, or add permissions to an existing one.
    CreateGroup {
        #[arg(long)]
        name: String,
        /// Permission such as `users.view_user`. Repeat to add several.
        #[arg(long = "permission")]
        permissions: Vec<String>,
    },
    /// Grant a permission directly to a user.
    Grant {
        #[arg(long)]
        email: String,
        #[arg(long)]
        permission: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = Configuration::default()
        .path(args.config.unwrap_or_default())
        .read()?;
    let Some(postgres) = &config.postgres else {
        return Err("missing `postgres` entry on `config.yaml` file".into());
    };

    let db = Database::from_config(postgres).await?;
    let users = UserService::new(
        Arc::new(PostgresUserRepository::new(db.postgres)),
        Arc::new(PasswordManager::new(config.argon2.clone())?),
        Arc::new(ErrorCatalog::with_overrides(config.messages.as_ref())),
    );

    match args.cmd {
        Commands::CreateSuperuser {
            email,
            password,
            first_name,
            last_name,
        } => {
            let profile = Profile {
                first_name,
                last_name,
                ..Default::default()
            };
            let user = users
                .create_superuser(&email, Some(&password), profile)
                .await?;

            println!("Superuser {} created with ID {}.", user.email, user.id);
        },
        Commands::CreateGroup { name, permissions } => {
            let group = users.create_group(&name, &permissions).await?;

            println!("Group {:?} ready with ID {}.", group.name, group.id);
        },
        Commands::Grant { email, permission } => {
            let Some(user) = users.find_by(Lookup::Email(&email)).await? else {
                return Err(format!("no user with email {email:?}").into());
            };
            users.grant(&user, &permission).await?;

            println!("{permission} granted to {}.", user.email);
        },
    }

    Ok(())
}
