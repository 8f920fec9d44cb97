//! # kavachctl
//!
//! Operator CLI for Kavach. Talks directly to Postgres using the same
//! repositories the server uses, the way `msmctl` talks directly to the
//! Kubernetes API rather than through an HTTP layer of its own.
//!
//! ```bash
//! kavachctl orgs list
//! kavachctl policy dump
//! kavachctl secrets rollback --environment <uuid> --version <id> --message "revert bad push"
//! kavachctl migrate
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kavach::authz::model::AuthorizationModel;
use kavach::config::Config;
use kavach::crypto::Cipher;
use kavach::policy::{PgPolicyStore, PolicyStore, PTYPE_GRANT, PTYPE_HIERARCHY, PTYPE_POLICY};
use kavach::resource::ResourceRepo;
use kavach::secret::SecretVersionEngine;

#[derive(Parser)]
#[command(name = "kavachctl")]
#[command(about = "Kavach operator CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Organization inspection
    Orgs {
        #[command(subcommand)]
        command: OrgsCommands,
    },
    /// Authorization policy inspection
    Policy {
        #[command(subcommand)]
        command: PolicyCommands,
    },
    /// Secret-version operations
    Secrets {
        #[command(subcommand)]
        command: SecretsCommands,
    },
    /// Run pending database migrations
    Migrate,
}

#[derive(Subcommand)]
enum OrgsCommands {
    /// List every organization owned by a user
    List {
        #[arg(long)]
        owner: uuid::Uuid,
    },
}

#[derive(Subcommand)]
enum PolicyCommands {
    /// Print the loaded policy/grant/hierarchy tuple counts
    Dump,
}

#[derive(Subcommand)]
enum SecretsCommands {
    /// Roll an environment back to an earlier version
    Rollback {
        #[arg(long)]
        environment: uuid::Uuid,
        #[arg(long)]
        version: String,
        #[arg(long)]
        message: String,
    },
    /// Show the diff between two versions
    Diff {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kavachctl=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load().context("failed to load configuration")?;
    let pool = kavach::db::connect(&config)
        .await
        .context("failed to connect to the database")?;

    match cli.command {
        Commands::Orgs { command } => match command {
            OrgsCommands::List { owner } => {
                let resources = ResourceRepo::new(pool);
                let orgs = resources
                    .list_organizations_owned_by(owner)
                    .await
                    .context("failed to list organizations")?;
                if orgs.is_empty() {
                    println!("No organizations owned by {owner}.");
                    return Ok(());
                }
                println!("{:<38} {:<24} {}", "ID", "NAME", "CREATED");
                println!("{}", "-".repeat(80));
                for org in orgs {
                    println!("{:<38} {:<24} {}", org.id, org.name, org.created_at);
                }
            }
        },
        Commands::Policy { command } => match command {
            PolicyCommands::Dump => {
                let store = PgPolicyStore::new(pool);
                let tuples = store
                    .load()
                    .await
                    .context("failed to load policy tuples")?;
                let (mut policy, mut grant, mut hierarchy) = (0usize, 0usize, 0usize);
                for tuple in &tuples {
                    match tuple.ptype.as_str() {
                        PTYPE_POLICY => policy += 1,
                        PTYPE_GRANT => grant += 1,
                        PTYPE_HIERARCHY => hierarchy += 1,
                        _ => {}
                    }
                }
                let model = AuthorizationModel::load_from_path(&config.model_file_path)
                    .context("failed to load authorization model file")?;
                println!("Model file: {}", config.model_file_path);
                println!(
                    "  [matchers] m = {}",
                    model.matcher_expression().unwrap_or("<none>")
                );
                println!("Policy tuples: {} total", tuples.len());
                println!("  p  (policy)    {policy}");
                println!("  g  (grant)     {grant}");
                println!("  g2 (hierarchy) {hierarchy}");
            }
        },
        Commands::Secrets { command } => match command {
            SecretsCommands::Rollback {
                environment,
                version,
                message,
            } => {
                let secrets = SecretVersionEngine::new(pool, Cipher::new(config.encryption_key));
                let summary = secrets
                    .rollback_to_version(environment, &version, &message)
                    .await
                    .context("rollback failed")?;
                println!("Created version {} ({} secrets).", summary.id, summary.secret_count);
            }
            SecretsCommands::Diff { from, to } => {
                let secrets = SecretVersionEngine::new(pool, Cipher::new(config.encryption_key));
                let entries = secrets
                    .get_version_diff(&from, &to)
                    .await
                    .context("diff failed")?;
                for entry in entries {
                    println!("{:?} {}", entry.kind, entry.name);
                }
            }
        },
        Commands::Migrate => {
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("migration failed")?;
            println!("Migrations applied.");
        }
    }

    Ok(())
}
