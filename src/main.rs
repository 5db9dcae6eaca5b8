//! # News Intel
//!
//! A crawler that turns Google News topics into full-text articles. It walks
//! from the aggregator home page to a topic, scans its headline cards,
//! follows each obfuscated redirect to the publisher and extracts the article
//! text, falling back to a reader mirror when the publisher page is
//! paywalled or too thin.
//!
//! ## Usage
//!
//! ```sh
//! news_intel run --topic tecnologia -j ./json
//! news_intel --engine http dive https://news.google.com/stories/CAAq...
//! ```
//!
//! ## Architecture
//!
//! The `run` command follows a pipeline:
//! 1. **Discovery**: find the prioritized topics on the home page
//! 2. **Scanning**: load the topic page and collect headline cards
//! 3. **Resolution**: follow each redirect token, restarting the browser once
//!    per link when the aggregator stops redirecting
//! 4. **Extraction**: direct page first, reader mirror second
//! 5. **Output**: the run as JSON on stdout or in a dated file
//!
//! The `dive` command fetches every article of a story cluster concurrently.

use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod dom;
mod error;
mod models;
mod outputs;
mod pipeline;
mod recovery;
mod scrapers;
mod session;
mod text;
mod utils;

use cli::{Cli, Command, Engine};
use config::Settings;
use error::SessionError;
use models::{HeadlineCard, PipelineRun, TopicRef};
use outputs::json;
use pipeline::{CancelFlag, Progress, RunRequest};
use scrapers::deep_dive::deep_dive;
use scrapers::headlines::scan_headlines;
use scrapers::topics::discover_topics;
use session::chrome::{ChromeFetcher, ChromeLauncher};
use session::http::{HttpFetcher, HttpLauncher};
use session::{Launcher, SessionManager};
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("news_intel starting up");

    // Parse CLI
    let args = Cli::parse();
    debug!(?args.engine, ?args.config, "Parsed CLI arguments");

    let settings = match Settings::load(args.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %e, "Failed to load settings");
            return Err(e.into());
        }
    };

    if let Err(e) = execute(args.command, args.engine, &settings).await {
        error!(error = %e, "news_intel failed");
        return Err(e);
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(())
}

async fn execute(command: Command, engine: Engine, settings: &Settings) -> Result<(), Box<dyn Error>> {
    match command {
        Command::Topics => {
            let topics = match engine {
                Engine::Chrome => list_topics(ChromeLauncher::new(settings.clone()), settings).await?,
                Engine::Http => list_topics(HttpLauncher::new(settings)?, settings).await?,
            };
            println!("{}", serde_json::to_string_pretty(&topics)?);
        }
        Command::Headlines { url } => {
            let cards = match engine {
                Engine::Chrome => list_headlines(ChromeLauncher::new(settings.clone()), &url, settings).await?,
                Engine::Http => list_headlines(HttpLauncher::new(settings)?, &url, settings).await?,
            };
            println!("{}", serde_json::to_string_pretty(&cards)?);
        }
        Command::Run {
            url,
            topic,
            max_items,
            json_output_dir,
        } => {
            check_output_dir(json_output_dir.as_deref()).await?;
            let request = RunRequest {
                url,
                topic,
                max_items: max_items.unwrap_or(settings.default_max_items),
            };
            let cancel = cancel_on_ctrl_c();
            let mut progress = Progress::silent();
            let run = match engine {
                Engine::Chrome => {
                    pipeline::run(ChromeLauncher::new(settings.clone()), settings, &request, &mut progress, &cancel)
                        .await?
                }
                Engine::Http => {
                    pipeline::run(HttpLauncher::new(settings)?, settings, &request, &mut progress, &cancel).await?
                }
            };
            emit(&run, json_output_dir.as_deref()).await?;
        }
        Command::Dive {
            url,
            max_items,
            json_output_dir,
        } => {
            check_output_dir(json_output_dir.as_deref()).await?;
            let max_items = max_items.unwrap_or(settings.default_max_items);
            let run = match engine {
                Engine::Chrome => {
                    let fetcher = ChromeFetcher::launch(settings).await?;
                    let run = deep_dive(&fetcher, &url, max_items, settings).await;
                    fetcher.shutdown().await;
                    run
                }
                Engine::Http => deep_dive(&HttpFetcher::new(settings)?, &url, max_items, settings).await,
            };
            emit(&run, json_output_dir.as_deref()).await?;
        }
    }
    Ok(())
}

async fn list_topics<L: Launcher>(launcher: L, settings: &Settings) -> Result<Vec<TopicRef>, SessionError> {
    let mut manager = SessionManager::new(launcher);
    let topics = discover_topics(manager.acquire().await?, settings).await;
    manager.release().await;
    Ok(topics)
}

async fn list_headlines<L: Launcher>(
    launcher: L,
    url: &str,
    settings: &Settings,
) -> Result<Vec<HeadlineCard>, SessionError> {
    let mut manager = SessionManager::new(launcher);
    let cards = scan_headlines(manager.acquire().await?, url, settings).await;
    manager.release().await;
    Ok(cards)
}

/// Early check: fail before crawling if the output directory is unusable.
async fn check_output_dir(dir: Option<&str>) -> Result<(), Box<dyn Error>> {
    let Some(dir) = dir else {
        return Ok(());
    };
    if let Err(e) = ensure_writable_dir(dir).await {
        error!(
            path = %dir,
            error = %e,
            "JSON output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }
    Ok(())
}

fn cancel_on_ctrl_c() -> CancelFlag {
    let cancel = CancelFlag::new();
    let flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; stopping after the current item");
            flag.cancel();
        }
    });
    cancel
}

async fn emit(run: &PipelineRun, json_output_dir: Option<&str>) -> Result<(), Box<dyn Error>> {
    info!(
        status = %run.status(),
        attempted = run.attempted,
        dropped = run.dropped,
        cancelled = run.cancelled,
        "Run finished"
    );
    match json_output_dir {
        Some(dir) => {
            let path = json::write_run(run, dir).await?;
            info!(%path, "Run written");
        }
        None => println!("{}", json::run_to_json(run)?),
    }
    Ok(())
}
