/*
newsharvest - single-binary main.rs
Runs one bounded harvest from the command line, or starts the HTTP server.
*/

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use common::{Config, EngineKind};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use newsharvest::display;
use newsharvest::server::launch_rocket;
use newsharvest::{HarvestRequest, HarvestService, SearchTarget};

#[derive(Parser, Debug)]
#[command(name = "newsharvest", about = "Bounded news harvester: one-shot CLI runs or HTTP server")]
struct Args {
    /// Path to config.toml
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Override log level (info, debug, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Use the offline mock engine regardless of configuration
    #[arg(long, global = true)]
    mock: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Keep articles whose title or body contains any of the terms
    Body {
        /// Terms (comma separated or repeated); defaults to the configured preset
        #[arg(value_delimiter = ',')]
        terms: Vec<String>,
        /// Not supported for body search; reported and ignored
        #[arg(long, value_delimiter = ',')]
        exclude: Vec<String>,
        /// Collections or publishers to search (comma separated)
        #[arg(long, value_delimiter = ',')]
        sources: Vec<String>,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Keep articles whose URL is not excluded, or matches every include pattern
    Url {
        #[arg(long, value_delimiter = ',')]
        include: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        exclude: Vec<String>,
        /// Collections or publishers to search (comma separated)
        #[arg(long, value_delimiter = ',')]
        sources: Vec<String>,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Everything recent from one publisher
    Source {
        name: String,
        #[command(flatten)]
        run: RunArgs,
    },
    /// List known collections and publishers
    Sources,
    /// Start the HTTP server
    Serve,
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    #[arg(long)]
    max_articles: Option<usize>,
    #[arg(long)]
    days_back: Option<u32>,
    /// Wall-clock budget in seconds; partial results are returned when it runs out
    #[arg(long)]
    timeout: Option<u64>,
    /// Print the result as JSON
    #[arg(long)]
    json: bool,
    /// Omit article bodies from text output
    #[arg(long)]
    no_body: bool,
}

impl RunArgs {
    fn apply(&self, req: &mut HarvestRequest) {
        req.max_articles = self.max_articles;
        req.days_back = self.days_back;
        req.timeout_seconds = self.timeout;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI args
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    // Resolve config paths
    let default_path = PathBuf::from("config.default.toml");

    let override_path = if let Some(p) = args.config {
        if !p.exists() {
            error!(path = ?p, "specified config file not found");
            return Err(anyhow!("Config file not found: {}", p.display()));
        }
        Some(p)
    } else {
        let p = PathBuf::from("config.toml");
        if p.exists() { Some(p) } else { None }
    };

    // Load configuration with defaults
    let config = match Config::load_with_defaults(
        if default_path.exists() { Some(&default_path) } else { None },
        override_path.as_deref(),
    )
    .await
    {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(%e, "failed to load configuration");
            return Err(e);
        }
    };
    info!(default = ?default_path, override = ?override_path, "configuration loaded");

    let engine = if args.mock { Some(EngineKind::Mock) } else { None };
    let service = HarvestService::from_config(&config, engine);
    info!(engine = service.engine_kind(), "harvest service ready");

    let (req, run) = match args.command {
        Command::Sources => {
            print!("{}", display::render_sources(&service.registry().listing()));
            return Ok(());
        }
        Command::Serve => {
            info!("Launching Rocket HTTP server");
            return launch_rocket(Arc::new(config), Arc::new(service)).await;
        }
        Command::Body {
            terms,
            exclude,
            sources,
            run,
        } => {
            let mut req = HarvestRequest::new(SearchTarget::Body);
            req.include_terms = if terms.is_empty() { config.presets.body_terms.clone() } else { terms };
            req.exclude_terms = exclude;
            req.sources = sources;
            (req, run)
        }
        Command::Url {
            include,
            exclude,
            sources,
            run,
        } => {
            let mut req = HarvestRequest::new(SearchTarget::Url);
            req.include_terms = if include.is_empty() { config.presets.url_include.clone() } else { include };
            req.exclude_terms = if exclude.is_empty() { config.presets.url_exclude.clone() } else { exclude };
            req.sources = sources;
            (req, run)
        }
        Command::Source { name, run } => (HarvestRequest::single_source(name), run),
    };

    run_once(&service, req, &run).await
}

/// One foreground harvest. Ctrl-C cancels it and the partial result is printed.
async fn run_once(service: &HarvestService, mut req: HarvestRequest, run: &RunArgs) -> Result<()> {
    run.apply(&mut req);

    let max = req
        .max_articles
        .map(|m| format!("max articles set to {}", m))
        .unwrap_or_else(|| "no max article limit".to_string());
    info!(
        target_kind = ?req.target,
        days_back = req.days_back.unwrap_or(service.defaults().days_back),
        "starting harvest with {}",
        max
    );

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("ctrl-c received, stopping harvest");
                cancel.cancel();
            }
        })
    };

    let outcome = service.respond(req, cancel).await;
    ctrl_c.abort();

    match outcome {
        Ok(response) => {
            if run.json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                print!("{}", display::render_response(&response, !run.no_body));
            }
            Ok(())
        }
        Err(failure) => {
            if let Some(partial) = &failure.partial {
                if !partial.is_empty() {
                    warn!(articles = partial.len(), "printing articles collected before the failure");
                    for article in &partial.articles {
                        print!("{}", display::render_article(article, !run.no_body));
                    }
                }
            }
            error!(category = failure.error.category(), "harvest failed");
            Err(anyhow!(failure))
        }
    }
}
