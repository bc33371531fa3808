//! Chronicle: play an AI-narrated adventure from the terminal.
//!
//! Reads player actions from stdin, one per line, and prints the narration.
//! Sessions and chapters are stored under `--data-dir`.
//!
//! ```bash
//! cargo run -p chronicle -- --thread my-run --name Tav --style bg3
//! ```

mod headless;

use chronicle_core::{
    CampaignCatalog, ChapterMemory, EngineConfig, FileChapterStore, FileSessionRepository,
    InMemoryVectorIndex, TurnEngine,
};
use llm::{Claude, ExaSearch, OpenAiEmbeddings};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Logs go to stderr so stdout stays a clean transcript.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    let claude = match Claude::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("Please set it in .env file or with: export ANTHROPIC_API_KEY=your_key_here");
            std::process::exit(1);
        }
    };

    let config = headless::parse_config_from_args(&args);
    let engine = build_engine(&config, claude).await?;
    headless::run_headless(engine, config).await?;
    Ok(())
}

async fn build_engine(
    config: &headless::HeadlessConfig,
    claude: Claude,
) -> Result<TurnEngine, Box<dyn std::error::Error>> {
    let sessions = FileSessionRepository::open(&config.data_dir).await?;
    let mut engine = TurnEngine::new(
        Arc::new(CampaignCatalog::builtin()),
        Arc::new(claude),
        Arc::new(sessions),
    )
    .with_chapters(Arc::new(FileChapterStore::new(&config.data_dir)))
    .with_config(
        EngineConfig::new()
            .with_default_campaign(config.campaign_id.clone())
            .with_default_player_name(config.player_name.clone())
            .with_web_search(config.web_search),
    );

    match OpenAiEmbeddings::from_env() {
        Ok(embeddings) => {
            let memory = ChapterMemory::new(Arc::new(embeddings), Arc::new(InMemoryVectorIndex::new()));
            engine = engine.with_memory(Arc::new(memory));
        }
        Err(e) => tracing::info!(reason = %e, "chapter memory disabled"),
    }

    if config.web_search {
        match ExaSearch::from_env() {
            Ok(exa) => engine = engine.with_canon(Arc::new(exa)),
            Err(e) => tracing::warn!(reason = %e, "web canon requested but unavailable"),
        }
    }

    Ok(engine)
}

fn print_help() {
    println!("chronicle - AI-narrated adventure, headless");
    println!();
    println!("USAGE:");
    println!("  chronicle [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("  --thread <id>      Conversation thread (default: {})", headless::DEFAULT_THREAD);
    println!("  --user <id>        User id (default: {})", headless::DEFAULT_USER);
    println!("  --campaign <id>    Campaign for a new session (default: baldurs-gate-3)");
    println!("  --name <name>      Player name for a new session (default: Traveler)");
    println!("  --style <style>    bg3 | grrm | grrm_politics | default");
    println!("  --data-dir <path>  Where sessions and chapters are stored (default: {})", headless::DEFAULT_DATA_DIR);
    println!("  --web-search       Add web canon references to prompts (needs EXA_API_KEY)");
    println!("  -h, --help         Show this help");
    println!();
    println!("ENVIRONMENT:");
    println!("  ANTHROPIC_API_KEY  Required");
    println!("  ANTHROPIC_MODEL    Narrator model override");
    println!("  OPENAI_API_KEY     Enables chapter memory");
    println!("  EXA_API_KEY        Enables --web-search");
    println!("  RUST_LOG           Log filter (default: info)");
}
