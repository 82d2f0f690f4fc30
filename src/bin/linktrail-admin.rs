use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use linktrail::config::Config;
use linktrail::models::{
    generate_token_secret, validate_blacklist_ip, validate_destination, validate_slug, Scope,
};
use linktrail::storage::{self, StorageError};
use linktrail::tracking::canonical_ip;
use linktrail::tracking::sanitize::sanitize_str;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "linktrail-admin")]
#[command(about = "Linktrail operator CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bulk upsert links from a `slug,destination` CSV or a `{slug: destination}` JSON file
    Import {
        file: PathBuf,
    },
    /// Manage API tokens
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },
    /// Manage the IP blacklist
    Blacklist {
        #[command(subcommand)]
        command: BlacklistCommands,
    },
}

#[derive(Subcommand)]
enum TokenCommands {
    /// Create a token; the secret is printed once
    Create {
        name: String,
        #[arg(required = true)]
        scopes: Vec<Scope>,
    },
    List,
    Revoke {
        id: i64,
    },
}

#[derive(Subcommand)]
enum BlacklistCommands {
    Add {
        ip: String,
        #[arg(long)]
        reason: Option<String>,
    },
    Remove {
        ip: String,
    },
    List,
}

/// Read `(slug, destination)` pairs; the format follows the file extension
fn read_link_rows(path: &Path) -> Result<Vec<(String, String)>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        let map: BTreeMap<String, String> =
            serde_json::from_str(&raw).context("expected a JSON object of slug to destination")?;
        return Ok(map.into_iter().collect());
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(raw.as_bytes());

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("malformed CSV at row {}", line + 1))?;
        match (record.get(0), record.get(1)) {
            (Some(slug), Some(destination)) => {
                rows.push((slug.to_string(), destination.to_string()))
            }
            _ => eprintln!("⚠ Row {}: expected slug,destination", line + 1),
        }
    }
    Ok(rows)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let storage = storage::open(&config.database).await?;

    match cli.command {
        Commands::Import { file } => {
            let rows = read_link_rows(&file)?;
            let (mut imported, mut skipped) = (0usize, 0usize);

            for (slug, destination) in rows {
                let valid = validate_slug(&slug)
                    .and_then(|slug| Ok((slug, validate_destination(&destination)?)));
                match valid {
                    Ok((slug, destination)) => {
                        storage.upsert_link(&slug, &destination).await?;
                        imported += 1;
                    }
                    Err(e) => {
                        eprintln!("⚠ Skipping '{}': {}", slug, e);
                        skipped += 1;
                    }
                }
            }

            println!("✓ Imported {} links ({} skipped)", imported, skipped);
        }
        Commands::Token { command } => match command {
            TokenCommands::Create { name, scopes } => {
                let name = sanitize_str(&name, 100);
                let mut unique: Vec<Scope> = Vec::new();
                for scope in scopes {
                    if !unique.contains(&scope) {
                        unique.push(scope);
                    }
                }

                let mut created = None;
                for _ in 0..3 {
                    match storage
                        .create_token(&name, &generate_token_secret(), &unique)
                        .await
                    {
                        Ok(token) => {
                            created = Some(token);
                            break;
                        }
                        Err(StorageError::Conflict) => continue,
                        Err(StorageError::Other(e)) => return Err(e),
                    }
                }
                let Some(token) = created else {
                    bail!("could not generate a unique token secret");
                };

                println!("✓ Created token #{} '{}'", token.id, token.name);
                println!("  scopes: {}", Scope::join(&token.scopes));
                println!("  secret: {}", token.token);
                println!("Store the secret now; it is not shown again.");
            }
            TokenCommands::List => {
                let tokens = storage.list_tokens().await?;
                if tokens.is_empty() {
                    println!("No API tokens found.");
                } else {
                    println!("{:<6} {:<30} {:<40} {}", "ID", "Name", "Scopes", "Last used");
                    println!("{}", "-".repeat(90));
                    for token in tokens {
                        let last_used = token
                            .last_used_at
                            .map(|t| t.to_string())
                            .unwrap_or_else(|| "never".to_string());
                        println!(
                            "{:<6} {:<30} {:<40} {}",
                            token.id,
                            token.name,
                            Scope::join(&token.scopes),
                            last_used
                        );
                    }
                }
            }
            TokenCommands::Revoke { id } => {
                if storage.delete_token(id).await? {
                    println!("✓ Revoked token #{}", id);
                } else {
                    println!("⚠ Token #{} not found", id);
                }
            }
        },
        Commands::Blacklist { command } => match command {
            BlacklistCommands::Add { ip, reason } => {
                let ip = validate_blacklist_ip(&ip)?;
                let reason = reason
                    .filter(|r| !r.is_empty())
                    .map(|r| sanitize_str(&r, 200));
                storage.add_to_blacklist(&ip, reason.as_deref()).await?;
                println!("✓ Blacklisted {}", ip);
            }
            BlacklistCommands::Remove { ip } => {
                let ip = canonical_ip(&ip);
                if storage.remove_from_blacklist(&ip).await? {
                    println!("✓ Removed {} from the blacklist", ip);
                } else {
                    println!("⚠ {} is not blacklisted", ip);
                }
            }
            BlacklistCommands::List => {
                let entries = storage.list_blacklist().await?;
                if entries.is_empty() {
                    println!("The blacklist is empty.");
                } else {
                    println!("{:<40} {}", "IP", "Reason");
                    println!("{}", "-".repeat(80));
                    for entry in entries {
                        println!("{:<40} {}", entry.ip, entry.reason.unwrap_or_default());
                    }
                }
            }
        },
    }

    Ok(())
}
