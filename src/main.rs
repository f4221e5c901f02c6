use std::io::Write;

use anyhow::Result;
use clap::Parser;
use dotenvy::dotenv;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use webpilot::{Agent, Args, Brain, BrowserSession, Config, RunOutcome, SearchClient, SessionStore};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args = Args::parse();
    init_logging(&args.log_level);

    let config = Config::load(&args);

    let objective = match &args.objective {
        Some(objective) => objective.trim().to_string(),
        None => prompt_for_objective()?,
    };
    if objective.is_empty() {
        anyhow::bail!("no objective given");
    }

    let mut store = SessionStore::open(&config.profiles_dir, &config.user_id)?;
    if args.fresh {
        store.clear();
    }

    info!("launching browser");
    let headless = config.headless;
    let session = tokio::task::spawn_blocking(move || BrowserSession::launch(headless))
        .await
        .map_err(|e| anyhow::anyhow!("browser launch panicked: {e}"))??;

    let client = reqwest::Client::new();
    let brain = Brain::new(client.clone(), config.ollama_base_url, config.model);
    let search = SearchClient::new(
        client,
        config.search_base_url,
        config.google_api_key,
        config.google_cx,
    );

    let outcome = Agent::new(brain, search, &session, &mut store)
        .run(&objective)
        .await;

    match outcome {
        RunOutcome::Done { summary } => println!("Final Output: {summary}"),
        RunOutcome::NeedsHelp { reason } => {
            println!("The model needs assistance (status: {reason}).")
        }
        RunOutcome::InvalidStatus { raw } => {
            println!("The model returned an unrecognized status: {raw}")
        }
        RunOutcome::NoUsablePlan { phase } => {
            println!("No usable {phase} plan was produced; stopping.")
        }
        RunOutcome::Stagnant => println!("The plan stopped changing between rounds; stopping."),
    }

    Ok(())
}

fn prompt_for_objective() -> Result<String> {
    print!("Enter your objective: ");
    std::io::stdout().flush()?;
    let mut objective = String::new();
    std::io::stdin().read_line(&mut objective)?;
    Ok(objective.trim().to_string())
}

fn init_logging(default_level: &str) {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_level.to_string())),
        )
        .with(fmt::layer())
        .init();
}
