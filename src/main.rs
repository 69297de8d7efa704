mod api;
mod bot;
mod config;
mod greeting;
mod initdata;
mod open;
mod page;
mod sdk;
mod server;
mod shutdown;
mod webapp;

use crate::bot::{Bot, HttpBotApi};
use crate::config::AppConfig;
use crate::greeting::GreetingRenderer;
use crate::open::HttpOpenTransport;
use crate::server::AppState;
use crate::webapp::InitDataProvider;
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "miniapp", version, about = "Telegram mini-app server and bot")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the mini app and run the bot (default).
    Serve,
    /// Render the greeting page for an initData string to stdout.
    Render {
        /// Raw initData, exactly as the host SDK exposes it.
        init_data: String,
        /// Shell page containing `#app`; the built-in shell is used otherwise.
        #[arg(long)]
        template: Option<PathBuf>,
        /// Backend receiving the open call.
        #[arg(long, default_value = "http://127.0.0.1:3000")]
        base_url: String,
        /// Wait for the open call and log its status.
        #[arg(long)]
        wait: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(AppConfig::from_env()?).await,
        Command::Render {
            init_data,
            template,
            base_url,
            wait,
        } => render(&init_data, template, &base_url, wait).await,
    }
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to listen on {}", config.bind_addr))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let _signals = shutdown::spawn_signal_listener(shutdown_tx.clone());

    let bot_task = match &config.bot_token {
        Some(token) => {
            let api = HttpBotApi::new(&config.telegram_api_url, token, config.bot_poll_timeout)?;
            let bot = Bot::new(Arc::new(api), config.miniapp_url.clone(), config.bot_poll_timeout);
            let rx = shutdown_rx.clone();
            Some(tokio::spawn(async move { bot.run(rx).await }))
        }
        None => {
            tracing::warn!("TG_BOT_TOKEN not set; bot disabled and /api/open will answer 503");
            None
        }
    };

    let result = server::run(listener, AppState::new(config), shutdown_rx).await;
    // The server may also stop on its own; make sure the bot follows.
    let _ = shutdown_tx.send(true);
    if let Some(task) = bot_task
        && let Err(err) = task.await
    {
        tracing::warn!(?err, "bot task ended abnormally");
    }
    tracing::info!("done");
    result
}

async fn render(
    init_data: &str,
    template: Option<PathBuf>,
    base_url: &str,
    wait: bool,
) -> anyhow::Result<()> {
    let shell = match template {
        Some(path) => tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading template {path:?}"))?,
        None => sdk::default_shell_html(),
    };
    let transport = HttpOpenTransport::new(base_url, Duration::from_secs(10))?;
    let renderer = GreetingRenderer::new(
        Arc::new(InitDataProvider::new(init_data)),
        Arc::new(transport),
    );
    let (html, open) = renderer.render_html(&shell)?;
    println!("{html}");

    // The runtime is torn down when this returns, so the call is always joined.
    match open.join().await {
        Ok(status) if wait => tracing::info!(%status, "open call answered"),
        Err(err) if wait => tracing::warn!(%err, "open call failed"),
        Ok(status) => tracing::debug!(%status, "open call answered"),
        Err(err) => tracing::debug!(%err, "open call failed"),
    }
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}
