//! Line-oriented play loop.
//!
//! Anything typed is sent to the narrator as a player action. Lines starting
//! with `#` are commands. Output is tagged (`[NARRATOR]`, `[ERROR]`, ...) so
//! scripts and agents can follow along.

use chronicle_core::{
    Combat, FinalizeOutcome, NarrativeStyle, SaveChapterRequest, StatCheck, TurnEngine,
    TurnRequest, BALDURS_GATE_3,
};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

pub const DEFAULT_THREAD: &str = "local";
pub const DEFAULT_USER: &str = "player";
pub const DEFAULT_DATA_DIR: &str = ".chronicle";

/// Who is playing, where, and how the story is told.
#[derive(Debug, Clone)]
pub struct HeadlessConfig {
    pub thread_id: String,
    pub user_id: String,
    pub campaign_id: String,
    pub player_name: String,
    pub style: Option<NarrativeStyle>,
    pub data_dir: PathBuf,
    pub web_search: bool,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            thread_id: DEFAULT_THREAD.to_string(),
            user_id: DEFAULT_USER.to_string(),
            campaign_id: BALDURS_GATE_3.to_string(),
            player_name: "Traveler".to_string(),
            style: None,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            web_search: false,
        }
    }
}

impl HeadlessConfig {
    fn request(&self, input: &str) -> TurnRequest {
        let mut request = TurnRequest::new(&self.thread_id, &self.user_id, input)
            .with_campaign(&self.campaign_id)
            .with_player_name(&self.player_name)
            .with_web_search(self.web_search);
        if let Some(style) = self.style {
            request = request.with_style(style);
        }
        request
    }
}

/// Run the play loop until stdin closes or `#quit`.
pub async fn run_headless(engine: TurnEngine, config: HeadlessConfig) -> io::Result<()> {
    println!("=== Chronicle ===");
    println!("Thread: {} / User: {}", config.thread_id, config.user_id);
    match engine.session(&config.thread_id, &config.user_id).await {
        Ok(Some(session)) => println!(
            "Resuming {} at {} (turn {})",
            session.player_name, session.game_state.current_location, session.last_turn_number
        ),
        Ok(None) => println!(
            "New adventure: {} in {}",
            config.player_name, config.campaign_id
        ),
        Err(e) => println!("[ERROR] {e}"),
    }
    println!();
    print_help();
    println!();
    println!("Enter your actions (one per line):");
    println!();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                eprintln!("Error reading input: {e}");
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('#') {
            let (name, rest) = match command.split_once(char::is_whitespace) {
                Some((name, rest)) => (name, rest.trim()),
                None => (command, ""),
            };
            match name {
                "quit" | "exit" => {
                    println!("Goodbye!");
                    break;
                }
                "status" => print_status(&engine, &config).await,
                "chapter" => {
                    let mut request = SaveChapterRequest::new(&config.thread_id, &config.user_id);
                    if !rest.is_empty() {
                        request = request.with_transcript(rest);
                    }
                    match engine.save_chapter(request).await {
                        Ok(receipt) => {
                            println!("[CHAPTER] {} ({})", receipt.meta.title, receipt.meta.chapter_id);
                            println!("  {}", receipt.meta.summary);
                        }
                        Err(e) => println!("[ERROR] Save failed: {e}"),
                    }
                }
                "finalize" => {
                    if rest.is_empty() {
                        println!("[ERROR] Usage: #finalize <action>");
                    } else {
                        play(&engine, config.request(rest).with_finalize_chapter(true), &mut stdout).await;
                    }
                }
                "help" => {
                    println!("[HELP]");
                    print_help();
                    println!("  (anything else is sent as player action)");
                }
                _ => println!("[ERROR] Unknown command. Type #help for help."),
            }
            stdout.flush().ok();
            continue;
        }

        play(&engine, config.request(line), &mut stdout).await;
    }

    Ok(())
}

async fn play(engine: &TurnEngine, request: TurnRequest, stdout: &mut io::Stdout) {
    print!("[PROCESSING]");
    stdout.flush().ok();
    let result = engine.play_turn(request).await;
    print!("\r            \r");
    stdout.flush().ok();

    let response = match result {
        Ok(response) => response,
        Err(e) => {
            println!("[ERROR] {e}");
            return;
        }
    };

    println!("[NARRATOR] Turn {}", response.turn_number);
    for para in response.output.narration.split("\n\n") {
        println!("{para}");
    }
    println!();

    if let Some(check) = &response.output.stat_check {
        println!("[STAT CHECK] {}", describe_check(check));
    }
    if let Some(combat) = &response.output.combat {
        println!("[COMBAT] {}", describe_combat(combat));
    }
    if let Some(choices) = &response.output.choices {
        println!("[CHOICES]");
        for (i, choice) in choices.iter().enumerate() {
            println!("  {}. {choice}", i + 1);
        }
    }
    match &response.finalize {
        FinalizeOutcome::Skipped => {}
        FinalizeOutcome::Saved { chapter_id, title } => {
            println!("[CHAPTER] {title} ({chapter_id})")
        }
        FinalizeOutcome::Failed(reason) => println!("[ERROR] Chapter not saved: {reason}"),
    }
}

async fn print_status(engine: &TurnEngine, config: &HeadlessConfig) {
    let session = match engine.session(&config.thread_id, &config.user_id).await {
        Ok(Some(session)) => session,
        Ok(None) => {
            println!("[STATUS] No session yet. Type an action to begin.");
            return;
        }
        Err(e) => {
            println!("[ERROR] {e}");
            return;
        }
    };
    let state = &session.game_state;
    println!("[STATUS]");
    println!("  Player: {}", state.player_name);
    println!("  Campaign: {}", state.campaign_id);
    println!("  Location: {}", state.current_location);
    println!("  Turns: {}", session.last_turn_number);
    if !state.companions.is_empty() {
        let companions: Vec<&str> = state.companions.iter().map(String::as_str).collect();
        println!("  Companions: {}", companions.join(", "));
    }
    if !state.inventory.is_empty() {
        println!("  Inventory: {}", state.inventory.join(", "));
    }
    match engine.chapters(&config.thread_id).await {
        Ok(chapters) => println!("  Chapters: {}", chapters.len()),
        Err(e) => println!("  Chapters: unavailable ({e})"),
    }
}

fn print_help() {
    println!("Commands:");
    println!("  #quit              - Exit");
    println!("  #status            - Show the current session");
    println!("  #chapter [text]    - Save a chapter from recent turns (or from text)");
    println!("  #finalize <action> - Play a turn and save it as a chapter");
    println!("  #help              - Show this help");
}

fn describe_check(check: &StatCheck) -> String {
    format!(
        "{} (DC {}): rolled {}, {}",
        check.stat,
        check.difficulty,
        check.result,
        if check.success { "success" } else { "failure" }
    )
}

fn describe_combat(combat: &Combat) -> String {
    format!(
        "Enemies: {} | Your health: {}",
        combat.enemies.join(", "),
        combat.player_health
    )
}

/// Parse session configuration from command line arguments.
pub fn parse_config_from_args(args: &[String]) -> HeadlessConfig {
    let mut config = HeadlessConfig::default();

    let mut i = 0;
    while i < args.len() {
        let value = args.get(i + 1);
        match (args[i].as_str(), value) {
            ("--thread", Some(v)) => {
                config.thread_id = v.clone();
                i += 1;
            }
            ("--user", Some(v)) => {
                config.user_id = v.clone();
                i += 1;
            }
            ("--campaign", Some(v)) => {
                config.campaign_id = v.clone();
                i += 1;
            }
            ("--name", Some(v)) => {
                config.player_name = v.clone();
                i += 1;
            }
            ("--style", Some(v)) => {
                match v.parse::<NarrativeStyle>() {
                    Ok(style) => config.style = Some(style),
                    Err(e) => eprintln!("Warning: {e}, using the campaign default"),
                }
                i += 1;
            }
            ("--data-dir", Some(v)) => {
                config.data_dir = PathBuf::from(v);
                i += 1;
            }
            ("--web-search", _) => config.web_search = true,
            _ => {}
        }
        i += 1;
    }

    config
}
