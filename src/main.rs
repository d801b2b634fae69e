use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use logriver::backends::{AmqpTransport, ElasticClient, MemoryBroker, MemoryIndex};
use logriver::{parse_keyed, parse_message, BatchKind, Config, IndexClient, LogClient, SearchRequest, Transport};

#[derive(Parser)]
#[command(name = "logriver", about = "Ship log batches through a broker into a search index")]
struct Cli {
    /// TOML config file layered over the built-in defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level (overridden by RUST_LOG).
    #[arg(long, global = true)]
    debug: bool,

    /// Use the in-process broker and index instead of real services.
    #[arg(long, global = true)]
    memory: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the index, mapping, river and broker topology for a log.
    Provision { log: String },
    /// Send one message.
    Send {
        log: String,
        severity: String,
        message: String,
    },
    /// Collect several messages and flush them as one record.
    Batch {
        log: String,
        severity: String,
        /// Treat each entry as `key=value` and flush a mapping.
        #[arg(long)]
        keyed: bool,
        #[arg(required = true)]
        entries: Vec<String>,
    },
    /// Search a log's records.
    Search {
        log: String,
        #[arg(long)]
        severity: Option<String>,
        /// Inclusive lower timestamp bound (ISO-8601).
        #[arg(long)]
        from: Option<String>,
        /// Inclusive upper timestamp bound (ISO-8601).
        #[arg(long)]
        till: Option<String>,
        /// Sort field (default: the log's timestamp field).
        #[arg(long)]
        sort: Option<String>,
        #[arg(long, default_value_t = 0)]
        start: usize,
        #[arg(long, default_value_t = 20)]
        size: usize,
    },
}

impl Command {
    fn log(&self) -> &str {
        match self {
            Command::Provision { log }
            | Command::Send { log, .. }
            | Command::Batch { log, .. }
            | Command::Search { log, .. } => log,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("RUST_LOG").unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(if cli.debug { "debug" } else { "info" })
            }),
        )
        .init();

    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;

    let memory_index = cli.memory.then(MemoryIndex::new);
    let (transport, index): (Arc<dyn Transport>, Arc<dyn IndexClient>) = match &memory_index {
        Some(index) => (MemoryBroker::new(index.clone()), index.clone()),
        None => (
            Arc::new(
                AmqpTransport::connect(&config.broker)
                    .await
                    .context("connecting to broker")?,
            ),
            Arc::new(ElasticClient::new(&config.index).context("building index client")?),
        ),
    };

    let client = LogClient::connect(config, cli.command.log(), transport, index)
        .await
        .context("provisioning log stream")?;
    tracing::debug!(log = %client.log_name(), "client ready");

    match cli.command {
        Command::Provision { .. } => {}
        Command::Send { severity, message, .. } => {
            client.logger().log(&severity, parse_message(&message)).await?;
        }
        Command::Batch {
            severity,
            keyed,
            entries,
            ..
        } => {
            let kind = if keyed { BatchKind::Keyed } else { BatchKind::Sequence };
            let mut batch = client.batch(kind);
            for entry in &entries {
                if keyed {
                    let (key, value) = parse_keyed(entry)
                        .with_context(|| format!("expected key=value, got {entry:?}"))?;
                    batch.append_keyed(key, value)?;
                } else {
                    batch.append(parse_message(entry))?;
                }
            }
            batch.flush(&severity).await?;
        }
        Command::Search {
            severity,
            from,
            till,
            sort,
            start,
            size,
            ..
        } => {
            let mut request = SearchRequest::new().start(start).size(size);
            if let Some(sort) = sort {
                request = request.sort(sort);
            }
            if let Some(severity) = severity {
                request = request.severity(&severity);
            }
            if let Some(from) = from {
                request = request.timestamp_from(from);
            }
            if let Some(till) = till {
                request = request.timestamp_till(till);
            }
            let response = client.query().search(&request).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }

    if let Some(index) = memory_index {
        let cfg = client.config();
        for doc in index.documents(&cfg.index.index_name, client.log_name().as_str()) {
            println!("{}", serde_json::to_string(&doc.source)?);
        }
    }

    Ok(())
}
