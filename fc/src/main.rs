use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use serde_json::Value;
use tracing::info;

use filtercontext::cli::{Cli, Command, parse_assignment};
use filtercontext::{Config, FilterContext, FilterValue, FilterValueOptions, JsonFileStore, Persistence, ReloadData};

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::WARN };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (verbose: {})", verbose);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    if let Some(store) = cli.store {
        config.store_path = store;
    }
    info!(store = %config.store_path.display(), "fc starting");

    let store = Arc::new(JsonFileStore::new(&config.store_path));
    let prefix = config.context.persistence_prefix.clone();

    match cli.command {
        Command::List => {
            let entries = store.entries().await?;
            let mut shown = 0;
            for (key, value) in &entries {
                if let Some(filter_key) = key.strip_prefix(prefix.as_str()) {
                    println!("{} = {}", filter_key.cyan(), value);
                    shown += 1;
                }
            }
            if shown == 0 {
                println!("{}", "No persisted filters".dimmed());
            }
        }
        Command::Get { key } => {
            let persistence_key = config.context.persistence_key(&key);
            match store.get(&persistence_key).await? {
                Some(value) => println!("{}", value),
                None => {
                    eprintln!("{} No persisted value for '{}'", "✗".red(), key);
                    std::process::exit(1);
                }
            }
        }
        Command::Set { assignments } => {
            let mut updates = BTreeMap::new();
            for assignment in &assignments {
                let (key, value) = parse_assignment(assignment)?;
                updates.insert(key, value);
            }
            set_filters(&config, store, updates).await?;
        }
    }

    Ok(())
}

/// Apply updates through a filter context so they land as one batch
async fn set_filters(config: &Config, store: Arc<JsonFileStore>, updates: BTreeMap<String, Value>) -> Result<()> {
    let reloads = Arc::new(AtomicUsize::new(0));
    let counter = reloads.clone();
    let reload: Arc<dyn ReloadData> = Arc::new(move || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            info!("reload requested");
            eyre::Ok(())
        }
    });

    let context = FilterContext::new(config.context.clone(), store, reload);
    let mut values = Vec::with_capacity(updates.len());
    for (key, value) in updates {
        let filter = FilterValue::<Value>::attach(&context, FilterValueOptions::new(key.as_str()))?;
        values.push((filter, value));
    }

    context.initialise().await.context("Failed to initialise filters")?;

    let count = values.len();
    let pending = &values;
    context
        .batch_update_values(move || async move {
            for (filter, value) in pending {
                let value = if value.is_null() { None } else { Some(value.clone()) };
                filter.update(value).await?;
            }
            eyre::Ok(())
        })
        .await
        .context("Failed to apply filter batch")?;

    println!(
        "{} Set {} filter(s) in one batch ({} reload)",
        "✓".green(),
        count,
        reloads.load(Ordering::SeqCst)
    );
    Ok(())
}
