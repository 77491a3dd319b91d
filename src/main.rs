mod config;
mod discovery;
mod error;
mod models;
mod pipeline;
mod scraper;
mod services;
mod utils;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::AppConfig;
use crate::discovery::terms::results_page_terms;
use crate::models::{DiscoveryRequest, DiscoveryResponse, DocumentType, FiscalPeriod, TickerRequest};
use crate::pipeline::Pipeline;
use crate::scraper::{ExtractMode, ExtractOptions};

#[derive(Parser)]
#[command(name = "ir-discovery", about = "Find earnings documents on investor relations sites", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Find documents for a ticker; prints {"documentResponses": [...]}
    Find {
        #[arg(short, long, required_unless_present = "request")]
        ticker: Option<String>,

        /// EarningsRelease, EarningsPresentation or EarningsWebcast (repeatable)
        #[arg(short = 'd', long = "type", value_delimiter = ',')]
        document_types: Vec<DocumentType>,

        /// Fiscal period such as 1Q2024 (repeatable)
        #[arg(short = 'p', long = "period", value_delimiter = ',')]
        fiscal_periods: Vec<FiscalPeriod>,

        /// JSON request file: {"ticker", "documentType": [...], "fiscalPeriod": [...]}
        #[arg(short, long, conflicts_with = "ticker")]
        request: Option<PathBuf>,
    },

    /// Resolve and print a ticker's investor relations site
    Resolve {
        #[arg(short, long)]
        ticker: String,
    },

    /// Print the quarterly results page found from an IR home page
    Locate {
        #[arg(short, long)]
        site: String,
    },

    /// Print the candidate links on a page
    Links {
        #[arg(short, long)]
        url: String,

        /// Relevance term (repeatable); defaults to the results-page vocabulary
        #[arg(long = "term", value_delimiter = ',')]
        terms: Vec<String>,

        /// Render in the browser and walk period selectors
        #[arg(long)]
        dynamic: bool,

        /// Present the desktop browser user agent
        #[arg(long)]
        user_agent: bool,
    },
}

fn read_request(path: &PathBuf) -> Result<TickerRequest> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    let req: DiscoveryRequest =
        serde_json::from_str(&raw).with_context(|| format!("Malformed request in {:?}", path))?;
    Ok(TickerRequest::try_from(req)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "ir_discovery=info,warn",
        1 => "ir_discovery=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false).with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let config = AppConfig::load()?;
    let pipeline = Pipeline::from_config(&config)?;

    match cli.command {
        Command::Find {
            ticker,
            document_types,
            fiscal_periods,
            request,
        } => {
            let request = match (request, ticker) {
                (Some(path), _) => read_request(&path)?,
                (None, Some(ticker)) => TickerRequest::new(&ticker, document_types, fiscal_periods)?,
                (None, None) => bail!("either --ticker or --request is required"),
            };

            let document_responses = pipeline.run(&request).await?;
            let response = DiscoveryResponse { document_responses };
            println!("{}", serde_json::to_string_pretty(&response)?);
        }

        Command::Resolve { ticker } => {
            let ticker = ticker.trim().to_uppercase();
            match pipeline.resolver().resolve(&ticker).await? {
                Some(site) => println!("{}", site),
                None => bail!("No investor relations site found for {}", ticker),
            }
        }

        Command::Locate { site } => {
            let _t = utils::Timer::start(format!("Locate {}", site));
            println!("{}", pipeline.locator().locate(&site).await?);
        }

        Command::Links {
            url,
            terms,
            dynamic,
            user_agent,
        } => {
            let terms = if terms.is_empty() {
                results_page_terms()
            } else {
                terms.iter().map(|t| t.to_lowercase()).collect()
            };
            let mode = if dynamic { ExtractMode::Rendered } else { ExtractMode::Static };
            let options = ExtractOptions {
                custom_user_agent: user_agent,
                ..ExtractOptions::fixed(mode)
            };

            let links = pipeline.extractor().extract_links(&url, &terms, options).await?;
            info!("{} links", links.len());
            println!("{}", serde_json::to_string_pretty(&links)?);
        }
    }

    Ok(())
}
