use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tokenkeeper::config::{self, StoreBackend};
use tokenkeeper::models::{format_timestamp, Validity};
use tokenkeeper::registry::TokenRegistry;
use tokenkeeper::{api, jobs, store, AppState};

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::load()?;

    let json_logs = cfg.log_json;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "tokenkeeper=debug,tower_http=debug".into()),
        ))
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(tracing_subscriber::fmt::layer))
        .init();

    let args = cli::Cli::parse();

    let result = match args.command {
        Some(cli::Commands::Serve { port }) => {
            let port = port.unwrap_or(cfg.port);
            run_server(cfg, port).await
        }
        Some(cli::Commands::Migrate) => run_migrations(&cfg).await,
        Some(cli::Commands::Token { command }) => {
            let store = store::open(&cfg).await?;
            let registry = TokenRegistry::from_config(store, &cfg);
            handle_token_command(command, &registry).await
        }
        None => {
            let port = cfg.port;
            run_server(cfg, port).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

async fn run_server(cfg: config::Config, port: u16) -> anyhow::Result<()> {
    tracing::info!("Opening token store...");
    let store = store::open(&cfg).await.context("failed to open token store")?;
    let registry = Arc::new(TokenRegistry::from_config(store, &cfg));

    if let Some(every) = cfg.report_interval {
        jobs::expiry_report::spawn(registry.clone(), every);
        tracing::info!(interval = ?every, "Background expiry report started");
    }

    let state = AppState::new(registry, cfg);
    let app = api::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Tokenkeeper listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

async fn run_migrations(cfg: &config::Config) -> anyhow::Result<()> {
    if cfg.store != StoreBackend::Postgres {
        anyhow::bail!("migrations only apply to TOKENKEEPER_STORE=postgres");
    }
    let db = store::postgres::PgStore::connect(cfg.require_database_url()?).await?;
    db.migrate().await?;
    println!("Migrations applied.");
    Ok(())
}

async fn handle_token_command(
    cmd: cli::TokenCommands,
    registry: &TokenRegistry,
) -> anyhow::Result<()> {
    match cmd {
        cli::TokenCommands::Register { token } => {
            let registration = registry.register(&token).await?;
            println!(
                "{}:\n  Token:  {}\n  Active: {}",
                registration.message(),
                token,
                registration.active
            );
        }
        cli::TokenCommands::Activate {
            token,
            months,
            permanent,
        } => {
            let activation = registry.activate(&token, months, permanent).await?;
            let expires = activation
                .expire_at
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "never".to_string());
            println!(
                "{}:\n  Token:   {}\n  Expires: {}",
                activation.message(),
                activation.token,
                expires
            );
        }
        cli::TokenCommands::Deactivate { token } => {
            registry.deactivate(&token).await?;
            println!("Token deactivated.");
        }
        cli::TokenCommands::Check { token } => {
            let validity = registry.check_validity(&token).await?;
            match &validity {
                Validity::Permanent => println!("valid (permanent)"),
                Validity::Valid { expire_at } => {
                    println!("valid until {}", format_timestamp(expire_at))
                }
                Validity::Expired { expire_at } => println!("invalid: expired ({})", expire_at),
                other => println!("invalid: {}", other.reason().unwrap_or("unknown")),
            }
        }
        cli::TokenCommands::List => {
            let tokens = registry.list_all().await?;
            if tokens.is_empty() {
                println!("No tokens found.");
            } else {
                println!("{:<40} {:<8} {:<26} CREATED", "TOKEN", "ACTIVE", "EXPIRES");
                for t in tokens {
                    let expires = t
                        .expire_at
                        .as_ref()
                        .map(ToString::to_string)
                        .unwrap_or_else(|| "-".to_string());
                    println!(
                        "{:<40} {:<8} {:<26} {}",
                        t.token,
                        t.active,
                        expires,
                        t.created_at.format("%Y-%m-%d")
                    );
                }
            }
        }
        cli::TokenCommands::Report => {
            let report = jobs::expiry_report::run_once(registry).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}
