//! Prompt assembly for narration and novelization.
//!
//! The text blocks live in `prompts/*.txt` next to this file and are compiled
//! in with `include_str!`.

use crate::campaign::Campaign;
use crate::model::ChatMessage;
use crate::state::GameState;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Locations and plot beats listed in the campaign context block.
const CONTEXT_SUBSET: usize = 8;

/// How many recent choices the user prompt repeats back.
const RECENT_CHOICES: usize = 3;

/// Narration style, selecting the ruleset prompt and mechanics reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrativeStyle {
    Bg3,
    Grrm,
    GrrmPolitics,
    Default,
}

impl NarrativeStyle {
    /// The explicit style if given, otherwise the campaign's natural one.
    pub fn resolve(explicit: Option<NarrativeStyle>, campaign: &Campaign) -> NarrativeStyle {
        explicit.unwrap_or(if campaign.id == crate::campaign::BALDURS_GATE_3 {
            NarrativeStyle::Bg3
        } else {
            NarrativeStyle::Default
        })
    }

    fn ruleset(self) -> &'static str {
        match self {
            NarrativeStyle::Bg3 => include_str!("dnd5e_system.txt"),
            NarrativeStyle::Grrm => include_str!("grrm_system.txt"),
            NarrativeStyle::GrrmPolitics => include_str!("grrm_politics_system.txt"),
            NarrativeStyle::Default => include_str!("ruleset_default.txt"),
        }
    }

    fn mechanics(self, campaign: &Campaign) -> Option<(&'static str, &'static str)> {
        match self {
            NarrativeStyle::Bg3 => Some((
                include_str!("dnd5e_combat.txt"),
                include_str!("dnd5e_stat_checks.txt"),
            )),
            NarrativeStyle::Grrm => Some((
                include_str!("grrm_combat.txt"),
                include_str!("grrm_stat_checks.txt"),
            )),
            NarrativeStyle::GrrmPolitics => Some((
                include_str!("grrm_combat.txt"),
                include_str!("grrm_politics_stat_checks.txt"),
            )),
            NarrativeStyle::Default if campaign.uses_ruleset("dnd-5e") => Some((
                include_str!("dnd5e_combat.txt"),
                include_str!("dnd5e_stat_checks.txt"),
            )),
            NarrativeStyle::Default => None,
        }
    }

    fn flavor(self, campaign: &Campaign) -> Option<String> {
        match self {
            NarrativeStyle::Bg3 => Some(format!(
                "You are narrating {}. Emphasize the dark, mature tone and the companions.",
                campaign.name
            )),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NarrativeStyle::Bg3 => "bg3",
            NarrativeStyle::Grrm => "grrm",
            NarrativeStyle::GrrmPolitics => "grrm_politics",
            NarrativeStyle::Default => "default",
        }
    }
}

impl fmt::Display for NarrativeStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NarrativeStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "bg3" => Ok(NarrativeStyle::Bg3),
            "grrm" => Ok(NarrativeStyle::Grrm),
            "grrm_politics" => Ok(NarrativeStyle::GrrmPolitics),
            "default" => Ok(NarrativeStyle::Default),
            other => Err(format!("unknown narrative style: {other}")),
        }
    }
}

/// Optional context gathered before the model call.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptNotes<'a> {
    pub memory: Option<&'a str>,
    pub canon: Option<&'a str>,
}

/// Build the narrator's system prompt.
pub fn system_prompt(
    campaign: &Campaign,
    state: &GameState,
    style: NarrativeStyle,
    notes: PromptNotes<'_>,
) -> String {
    let mut prompt = format!("You are the Game Master narrating {}.\n\n", campaign.name);

    prompt.push_str(style.ruleset());
    prompt.push('\n');
    prompt.push_str(include_str!("guardrails.txt"));

    if let Some(flavor) = style.flavor(campaign) {
        prompt.push('\n');
        prompt.push_str(&flavor);
        prompt.push('\n');
    }

    if let Some((combat, checks)) = style.mechanics(campaign) {
        prompt.push_str("\nMECHANICS REFERENCE:\n");
        prompt.push_str(combat);
        prompt.push('\n');
        prompt.push_str(checks);
    }

    prompt.push('\n');
    prompt.push_str(&campaign_context(campaign, state));

    if notes.memory.is_some() || notes.canon.is_some() {
        prompt.push_str("\nCONTEXT NOTES:\n");
        for note in [notes.memory, notes.canon].into_iter().flatten() {
            prompt.push_str(note);
            prompt.push_str("\n\n");
        }
    }

    prompt.push('\n');
    prompt.push_str(include_str!("rules.txt"));
    prompt.push('\n');
    prompt.push_str(include_str!("output_format.txt"));
    prompt.trim_end().to_string()
}

fn campaign_context(campaign: &Campaign, state: &GameState) -> String {
    let location = match campaign.location(&state.current_location) {
        Some(l) => format!("{} ({})", l.id, l.name),
        None => state.current_location.clone(),
    };

    let mut ctx = String::from("CAMPAIGN CONTEXT:\n");
    ctx.push_str(&format!("- Campaign: {}\n", campaign.name));
    ctx.push_str(&format!("- Description: {}\n", campaign.description));
    ctx.push_str(&format!("- Current Location: {location}\n"));
    ctx.push_str(&format!("- Player: {}\n", state.player_name));

    ctx.push_str("- Companions (available catalog):\n");
    for c in &campaign.companions {
        ctx.push_str(&format!("  {}: {}\n", c.name, c.description));
    }
    if !state.companions.is_empty() {
        let travelling: Vec<&str> = state.companions.iter().map(String::as_str).collect();
        ctx.push_str(&format!("- Travelling with: {}\n", travelling.join(", ")));
    }

    ctx.push_str("- Known Locations (subset):\n");
    for l in campaign.locations.iter().take(CONTEXT_SUBSET) {
        ctx.push_str(&format!("  {}: {}\n", l.name, l.description));
    }

    ctx.push_str("- Plot Outline (subset):\n");
    for p in campaign.plot.iter().take(CONTEXT_SUBSET) {
        ctx.push_str(&format!("  - {}: {}\n", p.title, p.description));
    }

    let stats = serde_json::to_string(&state.stats).unwrap_or_else(|_| "{}".to_string());
    ctx.push_str(&format!("- Player Stats: {stats}\n"));
    ctx
}

/// Build the user prompt carrying the player's action.
pub fn user_prompt(player_input: &str, state: &GameState) -> String {
    let inventory = if state.inventory.is_empty() {
        "Empty".to_string()
    } else {
        state.inventory.join(", ")
    };
    let choices = state.recent_choices(RECENT_CHOICES);
    let choices = if choices.is_empty() {
        "None".to_string()
    } else {
        choices.join(", ")
    };

    format!(
        "PLAYER INPUT: {player_input}\n\n\
         CURRENT GAME STATE:\n\
         - Location: {}\n\
         - Inventory: {inventory}\n\
         - Recent choices: {choices}\n\n\
         Respond as the Game Master, continuing the narrative based on the player's input.",
        state.current_location
    )
}

/// The full message list for a turn: system prompt, the last `window`
/// narrative entries as context, then the user prompt.
pub fn turn_messages(
    system: String,
    state: &GameState,
    window: usize,
    player_input: &str,
) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(system)];
    messages.extend(state.recent_narrative(window).map(ChatMessage::user));
    messages.push(ChatMessage::user(user_prompt(player_input, state)));
    messages
}

/// System prompt for the chapter novelizer.
pub fn novelize_system_prompt(viewpoint: &str) -> String {
    let mut prompt = String::from(include_str!("novelize.txt"));
    prompt.push_str("\nViewpoint character: ");
    prompt.push_str(viewpoint);
    prompt
}
