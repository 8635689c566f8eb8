use anyhow::{Context, Result};
use clap::Parser;
use cliclack::{input, spinner};
use console::style;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use tripcrew::settings::{SelectionMode, Settings};
use tripcrew::{PlanOptions, Planner};

mod render;
mod session_file;

use render::{print_markdown, print_message};
use session_file::persist_messages;

#[derive(Parser)]
#[command(author, version, about = "Plan a trip with a team of specialised agents", long_about = None)]
struct Cli {
    /// The trip request. Prompted for interactively when omitted.
    request: Option<String>,

    /// Configuration file (defaults to tripcrew.toml in the working directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print each turn as it happens instead of the full log at the end
    #[arg(short, long)]
    stream: bool,

    /// Save the transcript as JSON lines
    #[arg(long)]
    save: Option<PathBuf>,

    /// Override the round limit
    #[arg(long)]
    max_rounds: Option<usize>,

    /// Speaker selection: auto or rotation
    #[arg(long)]
    selection: Option<SelectionMode>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "tripcrew=debug" } else { "tripcrew=warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_request(cli: &Cli) -> Result<String> {
    if let Some(request) = &cli.request {
        return Ok(request.clone());
    }

    println!("Describe the trip you would like to plan. For example:");
    println!(
        "{}",
        style("- A 5-day trip to Kerala for 2 people in January, focusing on backwaters and tea gardens, mid-range budget.").dim()
    );
    let request: String = input("Your trip request:").placeholder("").interact()?;
    Ok(request)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut settings = Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(max_rounds) = cli.max_rounds {
        settings.conversation.max_rounds = max_rounds;
    }
    if let Some(selection) = cli.selection {
        settings.conversation.selection = selection;
    }

    let request = read_request(&cli)?;
    if request.trim().is_empty() {
        println!("No request entered. Exiting.");
        return Ok(());
    }

    let planner = Planner::from_settings(&settings)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    ctrlc::set_handler(move || on_interrupt.cancel())?;

    let mut options = PlanOptions {
        observer: None,
        cancel: Some(cancel),
    };
    let printer = if cli.stream {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        options.observer = Some(tx);
        Some(tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if let Err(e) = print_message(&message) {
                    tracing::warn!(error = %e, "failed to render message");
                }
            }
        }))
    } else {
        None
    };

    let spin = spinner();
    if printer.is_none() {
        spin.start("the agent team is planning your trip");
    }

    let report = planner.plan_with(&request, options).await;

    match printer {
        Some(printer) => printer.await?,
        None => spin.stop(format!("finished after {} rounds", report.rounds)),
    }

    if !cli.stream && !report.transcript_log.is_empty() {
        println!("\n{}", style("--- AGENT INTERACTION LOG ---").bold());
        println!("{}", report.transcript_log);
    }

    if let Some(path) = &cli.save {
        persist_messages(path, &report.transcript)?;
        println!("Transcript saved to {}", path.display());
    }

    println!("\n{}", style("--- FINAL ITINERARY ---").bold());
    if let Some(artifact) = &report.artifact {
        print_markdown(artifact)?;
    }

    match report.explanation() {
        None => Ok(()),
        Some(explanation) => {
            eprintln!(
                "{} {}",
                style(format!("[{}]", report.status)).yellow(),
                explanation
            );
            std::process::exit(1);
        }
    }
}
