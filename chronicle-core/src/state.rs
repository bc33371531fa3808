//! Game state and per-turn output types.
//!
//! `GameState` is treated as a value: each turn produces a new state from the
//! previous one, and the narrative log only ever grows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// The six ability scores every new character starts with.
pub const ABILITY_NAMES: [&str; 6] = [
    "strength",
    "dexterity",
    "constitution",
    "intelligence",
    "wisdom",
    "charisma",
];

/// Kind of a narrative log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NarrativeKind {
    Narration,
    Choice,
    Combat,
    StatCheck,
}

/// One entry in the append-only story log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeEntry {
    pub timestamp: DateTime<Utc>,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: NarrativeKind,
}

impl NarrativeEntry {
    pub fn new(kind: NarrativeKind, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            content: content.into(),
            kind,
        }
    }
}

/// Everything the narrator knows about a player's adventure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub id: String,
    pub campaign_id: String,
    pub player_name: String,
    pub current_location: String,
    #[serde(default)]
    pub companions: BTreeSet<String>,
    #[serde(default)]
    pub inventory: Vec<String>,
    #[serde(default)]
    pub stats: BTreeMap<String, i32>,
    /// Player actions, most recent last.
    #[serde(default)]
    pub choices: Vec<String>,
    #[serde(default)]
    pub narrative: Vec<NarrativeEntry>,
}

impl GameState {
    /// Produce the state after a turn: the player's action and the narration
    /// are appended, in that order, with the same timestamp.
    pub fn with_turn(&self, player_input: &str, narration: &str, at: DateTime<Utc>) -> GameState {
        let mut next = self.clone();
        next.narrative.push(NarrativeEntry::new(
            NarrativeKind::Choice,
            format!("Player: {player_input}"),
            at,
        ));
        next.narrative
            .push(NarrativeEntry::new(NarrativeKind::Narration, narration, at));
        next.choices.push(player_input.to_string());
        next
    }

    /// Contents of the last `n` narrative entries, oldest first.
    pub fn recent_narrative(&self, n: usize) -> impl Iterator<Item = &str> {
        let skip = self.narrative.len().saturating_sub(n);
        self.narrative.iter().skip(skip).map(|e| e.content.as_str())
    }

    /// The last `n` recorded player choices, oldest first.
    pub fn recent_choices(&self, n: usize) -> &[String] {
        let start = self.choices.len().saturating_sub(n);
        &self.choices[start..]
    }

    pub fn stat(&self, name: &str) -> Option<i32> {
        self.stats.get(name).copied()
    }
}

/// Outcome of a resolved stat check. Only produced by the dice resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatCheck {
    pub stat: String,
    pub difficulty: i32,
    /// The d20 face, in `1..=20`.
    pub result: u8,
    pub success: bool,
}

impl StatCheck {
    pub fn from_roll(stat: impl Into<String>, difficulty: i32, result: u8) -> Self {
        Self {
            stat: stat.into(),
            difficulty,
            result,
            success: i32::from(result) >= difficulty,
        }
    }
}

/// Combat snapshot reported by the narrator. Opaque to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Combat {
    pub enemies: Vec<String>,
    pub player_health: f64,
    #[serde(default)]
    pub enemy_health: serde_json::Value,
}

/// What a turn produced for the player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnOutput {
    pub narration: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stat_check: Option<StatCheck>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub combat: Option<Combat>,
}
