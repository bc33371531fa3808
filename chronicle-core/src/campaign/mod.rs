//! Campaign catalog: static descriptions of the adventures players can start.
//!
//! A campaign is read-only configuration. The catalog hands out shared
//! references and builds the initial [`GameState`] for new sessions.

mod bg3;

use crate::state::{GameState, NarrativeEntry, NarrativeKind, ABILITY_NAMES};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;

pub use bg3::BALDURS_GATE_3;

/// Starting value for every ability score.
pub const DEFAULT_STAT: i32 = 10;

/// Errors from catalog lookups.
#[derive(Debug, Error)]
pub enum CampaignError {
    #[error("Unknown campaign: {0}")]
    NotFound(String),

    #[error("Campaign {0} has no locations")]
    NoLocations(String),

    #[error("Invalid campaign definition: {0}")]
    Invalid(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Companion {
    pub id: String,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub connections: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotPoint {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub requirements: Vec<String>,
}

/// A playable campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Ruleset tag, e.g. `dnd-5e`.
    #[serde(default)]
    pub ruleset: Option<String>,
    /// Markdown shown as the first narrative entry.
    pub intro: String,
    #[serde(default)]
    pub companions: Vec<Companion>,
    pub locations: Vec<Location>,
    #[serde(default)]
    pub plot: Vec<PlotPoint>,
    /// Prefix for web canon searches.
    #[serde(default)]
    pub canon_query_hint: Option<String>,
}

impl Campaign {
    /// Parse a campaign from its JSON definition.
    pub fn from_json(json: &str) -> Result<Self, CampaignError> {
        let campaign: Campaign = serde_json::from_str(json)?;
        if campaign.locations.is_empty() {
            return Err(CampaignError::NoLocations(campaign.id));
        }
        Ok(campaign)
    }

    /// The id new sessions start at.
    pub fn start_location(&self) -> &str {
        self.locations
            .first()
            .map(|l| l.id.as_str())
            .unwrap_or("start")
    }

    pub fn location(&self, id: &str) -> Option<&Location> {
        self.locations.iter().find(|l| l.id == id)
    }

    pub fn companion(&self, id: &str) -> Option<&Companion> {
        self.companions.iter().find(|c| c.id == id)
    }

    pub fn uses_ruleset(&self, ruleset: &str) -> bool {
        self.ruleset.as_deref() == Some(ruleset)
    }
}

/// Registry of campaigns by id.
#[derive(Debug, Clone, Default)]
pub struct CampaignCatalog {
    campaigns: HashMap<String, Arc<Campaign>>,
}

impl CampaignCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog holding the bundled campaigns.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        catalog.register(bg3::campaign());
        catalog
    }

    /// Add or replace a campaign.
    pub fn register(&mut self, campaign: Campaign) {
        self.campaigns
            .insert(campaign.id.clone(), Arc::new(campaign));
    }

    pub fn get_campaign(&self, campaign_id: &str) -> Result<Arc<Campaign>, CampaignError> {
        self.campaigns
            .get(campaign_id)
            .cloned()
            .ok_or_else(|| CampaignError::NotFound(campaign_id.to_string()))
    }

    pub fn contains(&self, campaign_id: &str) -> bool {
        self.campaigns.contains_key(campaign_id)
    }

    /// Campaign ids, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.campaigns.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Build the state a brand-new session starts from.
    pub fn create_initial_game_state(
        &self,
        campaign_id: &str,
        player_name: &str,
    ) -> Result<GameState, CampaignError> {
        self.create_initial_game_state_at(campaign_id, player_name, Utc::now())
    }

    pub fn create_initial_game_state_at(
        &self,
        campaign_id: &str,
        player_name: &str,
        at: DateTime<Utc>,
    ) -> Result<GameState, CampaignError> {
        let campaign = self.get_campaign(campaign_id)?;
        Ok(GameState {
            id: uuid::Uuid::new_v4().to_string(),
            campaign_id: campaign.id.clone(),
            player_name: player_name.to_string(),
            current_location: campaign.start_location().to_string(),
            companions: BTreeSet::new(),
            inventory: Vec::new(),
            stats: ABILITY_NAMES
                .iter()
                .map(|name| (name.to_string(), DEFAULT_STAT))
                .collect(),
            choices: Vec::new(),
            narrative: vec![NarrativeEntry::new(
                NarrativeKind::Narration,
                campaign.intro.clone(),
                at,
            )],
        })
    }
}
