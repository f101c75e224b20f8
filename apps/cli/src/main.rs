use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use client_core::{AuthClient, ItemStore, LocalAuth, SupabaseClient, ViewController};
use shared::domain::ItemId;
use storage::Storage;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod render;

use commands::{parse_command, Command, HELP};
use config::{load_settings, prepare_database_url, Backend, Settings};
use render::render;

#[derive(Parser, Debug)]
#[command(name = "shoplist", about = "A shopping list for the terminal")]
struct Args {
    /// toml file to read instead of ./shoplist.toml
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, value_enum)]
    backend: Option<Backend>,
    #[arg(long)]
    database_url: Option<String>,
    #[arg(long)]
    supabase_url: Option<String>,
    /// Log debug output to stderr
    #[arg(long, short)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let mut settings = load_settings(args.config.as_deref())?;
    if let Some(backend) = args.backend {
        settings.backend = backend;
    }
    if let Some(database_url) = args.database_url {
        settings.database_url = database_url;
    }
    if let Some(supabase_url) = args.supabase_url {
        settings.supabase_url = Some(supabase_url);
    }

    let (auth, store) = connect(&settings).await?;
    let mut controller = ViewController::new(auth, store);
    controller.start().await;

    let result = run(&mut controller).await;
    controller.teardown();
    result
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn connect(settings: &Settings) -> Result<(Arc<dyn AuthClient>, Arc<dyn ItemStore>)> {
    info!(backend = %settings.backend, "connecting");
    match settings.backend {
        Backend::Local => {
            let database_url = prepare_database_url(&settings.database_url);
            let storage = Storage::new(&database_url).await.map_err(|error| {
                error!(%database_url, %error, "failed to open local database");
                error
            })?;
            storage.health_check().await?;
            info!(%database_url, "using local backend");
            let auth: Arc<dyn AuthClient> = Arc::new(LocalAuth::new(storage.clone()));
            let store: Arc<dyn ItemStore> = Arc::new(storage);
            Ok((auth, store))
        }
        Backend::Supabase => {
            let (url, anon_key) = settings.supabase_credentials()?;
            let client = SupabaseClient::new(url, anon_key)?;
            info!(%url, "using Supabase backend");
            let auth: Arc<dyn AuthClient> = client.clone();
            let store: Arc<dyn ItemStore> = client;
            Ok((auth, store))
        }
    }
}

async fn run(controller: &mut ViewController) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let view = controller.view();
        stdout.write_all(render(&view).as_bytes()).await?;
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read from stdin")? else {
                    break;
                };
                let rows: Vec<ItemId> = view.items.iter().map(|item| item.id).collect();
                match parse_command(&line, &rows) {
                    Ok(None) => {}
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(Command::Help)) => {
                        stdout.write_all(format!("{HELP}\n").as_bytes()).await?;
                    }
                    Ok(Some(Command::Intent(intent))) => controller.dispatch(intent).await,
                    Err(error) => {
                        stdout.write_all(format!("{error}\n").as_bytes()).await?;
                    }
                }
            }
            Some(change) = controller.next_session_change() => {
                controller.handle_session_change(change).await;
            }
        }
    }

    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}
