//! recordctl — command-line access to the user and stream record store.
//!
//! Run:
//! ```bash
//! # against Fauna (default backend)
//! FAUNA_DB_SECRET=fnA... recordctl get-user alice
//! FAUNA_DB_SECRET=fnA... recordctl save-user alice --set bio=hi --set followers=12
//!
//! # local demo, nothing persists across runs
//! STORAGE_PROVIDER=memory recordctl save-stream 2024-01-01 --set title='"Launch"'
//! ```
//!
//! Configuration: See `config.rs` for all environment variables.
//! Records are printed to stdout as JSON (`null` when absent); logs go to stderr.

mod config;

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use domain::adapters::memory_store::InMemoryStore;
use domain::fail_soft::FailSoftStore;
use domain::service::RecordStore;
use domain::{DocumentStore, Stream, User};
use fauna::FaunaClient;
use serde_json::{Map, Value};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

type SharedStore = Arc<dyn DocumentStore>;

#[derive(Parser)]
#[command(name = "recordctl")]
#[command(about = "Fetch and upsert user and stream records")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Turn failures into empty results; errors are only logged
    #[arg(long, global = true)]
    fail_soft: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch a user by login
    GetUser { login: String },
    /// Create or update a user keyed by login
    SaveUser {
        login: String,
        #[command(flatten)]
        fields: RecordFields,
    },
    /// Fetch a stream by its date
    GetStream { stream_date: String },
    /// Create or update a stream keyed by its date
    SaveStream {
        stream_date: String,
        #[command(flatten)]
        fields: RecordFields,
    },
}

#[derive(clap::Args)]
struct RecordFields {
    /// Existing document id; forces a replace of that document
    #[arg(long)]
    id: Option<String>,

    /// Attribute as key=value; the value is parsed as JSON when possible
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_attribute)]
    attributes: Vec<(String, Value)>,
}

impl RecordFields {
    fn into_parts(self) -> (Option<String>, Map<String, Value>) {
        (self.id, self.attributes.into_iter().collect())
    }
}

fn parse_attribute(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    if key.is_empty() {
        return Err("attribute key must not be empty".into());
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = config::Config::from_env()?;
    init_tracing(&cfg);
    cfg.warn_if_ephemeral();

    let store = build_store(&cfg)?;
    info!(
        version = %domain::about(),
        storage = ?cfg.storage_provider,
        strategy = cfg.save_strategy.as_str(),
        "record store ready"
    );
    let records = RecordStore::with_strategy(store, cfg.save_strategy);

    let output = if cli.fail_soft {
        run_fail_soft(FailSoftStore::new(records), cli.command).await?
    } else {
        run(&records, cli.command).await?
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn run(records: &RecordStore<SharedStore>, command: Command) -> anyhow::Result<Value> {
    let value = match command {
        Command::GetUser { login } => {
            let user = records
                .get_user(&login)
                .await
                .with_context(|| format!("get-user {login}"))?;
            serde_json::to_value(user)?
        }
        Command::SaveUser { login, fields } => {
            let user = build_user(login, fields);
            let saved = records
                .save_user(&user)
                .await
                .with_context(|| format!("save-user {}", user.login))?;
            serde_json::to_value(saved)?
        }
        Command::GetStream { stream_date } => {
            let stream = records
                .get_stream(&stream_date)
                .await
                .with_context(|| format!("get-stream {stream_date}"))?;
            serde_json::to_value(stream)?
        }
        Command::SaveStream { stream_date, fields } => {
            let stream = build_stream(stream_date, fields);
            let saved = records
                .save_stream(&stream)
                .await
                .with_context(|| format!("save-stream {}", stream.stream_date))?;
            serde_json::to_value(saved)?
        }
    };
    Ok(value)
}

async fn run_fail_soft(
    records: FailSoftStore<SharedStore>,
    command: Command,
) -> anyhow::Result<Value> {
    let value = match command {
        Command::GetUser { login } => serde_json::to_value(records.get_user(&login).await)?,
        Command::SaveUser { login, fields } => {
            serde_json::to_value(records.save_user(&build_user(login, fields)).await)?
        }
        Command::GetStream { stream_date } => {
            serde_json::to_value(records.get_stream(&stream_date).await)?
        }
        Command::SaveStream { stream_date, fields } => {
            serde_json::to_value(records.save_stream(&build_stream(stream_date, fields)).await)?
        }
    };
    Ok(value)
}

fn build_user(login: String, fields: RecordFields) -> User {
    let (id, attributes) = fields.into_parts();
    User {
        id,
        login,
        attributes,
    }
}

fn build_stream(stream_date: String, fields: RecordFields) -> Stream {
    let (id, attributes) = fields.into_parts();
    Stream {
        id,
        stream_date,
        attributes,
    }
}

// Construct the document store selected by config.
fn build_store(cfg: &config::Config) -> anyhow::Result<SharedStore> {
    match (&cfg.storage_provider, &cfg.fauna) {
        (config::StorageProvider::Fauna, Some(fauna_cfg)) => {
            let client = FaunaClient::new(fauna_cfg.clone()).context("fauna client init")?;
            info!(endpoint = client.endpoint(), "using fauna storage");
            Ok(Arc::new(client))
        }
        (config::StorageProvider::Fauna, None) => {
            anyhow::bail!("fauna storage selected but no fauna configuration loaded")
        }
        (config::StorageProvider::Memory, _) => Ok(Arc::new(InMemoryStore::new())),
    }
}

fn init_tracing(cfg: &config::Config) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match cfg.log_format {
        config::LogFormat::Json => {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_timer(fmt::time::SystemTime)
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        config::LogFormat::Pretty => {
            registry
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_writer(std::io::stderr),
                )
                .init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn attribute_values_parse_as_json_when_possible() {
        assert_eq!(parse_attribute("followers=12").unwrap(), ("followers".into(), json!(12)));
        assert_eq!(parse_attribute("live=true").unwrap(), ("live".into(), json!(true)));
        assert_eq!(parse_attribute("bio=hi there").unwrap(), ("bio".into(), json!("hi there")));
        assert_eq!(parse_attribute("note=a=b").unwrap(), ("note".into(), json!("a=b")));
        assert!(parse_attribute("novalue").is_err());
        assert!(parse_attribute("=x").is_err());
    }

    #[test]
    fn cli_parses_save_user() {
        let cli = Cli::try_parse_from([
            "recordctl", "save-user", "alice", "--id", "101", "--set", "bio=hi", "--fail-soft",
        ])
        .unwrap();
        assert!(cli.fail_soft);
        match cli.command {
            Command::SaveUser { login, fields } => {
                let user = build_user(login, fields);
                assert_eq!(user, User::new("alice").with_id("101").with_attribute("bio", "hi"));
            }
            _ => panic!("expected save-user"),
        }
    }

    #[tokio::test]
    async fn memory_backed_commands_round_trip() {
        let store: SharedStore = Arc::new(InMemoryStore::new());
        let records = RecordStore::new(store);

        let saved = run(
            &records,
            Command::SaveStream {
                stream_date: "2024-01-01".into(),
                fields: RecordFields {
                    id: None,
                    attributes: vec![("title".into(), json!("Launch"))],
                },
            },
        )
        .await
        .unwrap();
        assert_eq!(saved["streamDate"], json!("2024-01-01"));
        assert!(saved["_id"].is_string());

        let fetched = run(&records, Command::GetStream { stream_date: "2024-01-01".into() })
            .await
            .unwrap();
        assert_eq!(fetched, saved);

        let missing = run(&records, Command::GetUser { login: "nobody".into() }).await.unwrap();
        assert_eq!(missing, Value::Null);
    }
}
