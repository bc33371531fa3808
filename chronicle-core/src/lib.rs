//! Turn-resolution pipeline for an AI-narrated role-playing adventure.
//!
//! This crate provides:
//! - Seeded, replayable stat-check dice
//! - Extraction of structured turn data from model narration
//! - Session persistence with a per-session turn counter
//! - The turn engine tying those together
//! - Chapter novelization, archival and thread-scoped semantic memory
//!
//! # Quick Start
//!
//! ```ignore
//! use chronicle_core::{CampaignCatalog, InMemorySessionRepository, TurnEngine, TurnRequest};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let model = Arc::new(llm::Claude::from_env()?);
//!     let engine = TurnEngine::new(
//!         Arc::new(CampaignCatalog::builtin()),
//!         model,
//!         Arc::new(InMemorySessionRepository::new()),
//!     );
//!
//!     let response = engine
//!         .play_turn(TurnRequest::new("thread-1", "user-1", "I search the wreckage"))
//!         .await?;
//!     println!("{}", response.output.narration);
//!     Ok(())
//! }
//! ```

pub mod campaign;
pub mod canon;
pub mod chapters;
pub mod dice;
pub mod engine;
pub mod extract;
pub mod memory;
pub mod model;
pub mod novelize;
pub mod prompts;
pub mod providers;
pub mod session;
pub mod state;
pub mod store;
pub mod testing;
pub mod text;

// Primary public API
pub use campaign::{Campaign, CampaignCatalog, CampaignError, BALDURS_GATE_3};
pub use canon::{CanonSearch, CanonSnippet};
pub use chapters::{ArchivedChapter, ChapterError, ChapterMeta, ChapterStore, FileChapterStore, InMemoryChapterStore};
pub use dice::{roll_stat_check, DiceError, RollStrategy};
pub use engine::{
    ChapterReceipt, EngineConfig, FinalizeOutcome, SaveChapterRequest, TurnEngine, TurnError,
    TurnRequest, TurnResponse,
};
pub use extract::{extract, Extracted, StatCheckIntent};
pub use memory::{ChapterMemory, Embedder, InMemoryVectorIndex, MemoryError, VectorIndex};
pub use model::{ChatMessage, ModelError, ModelOptions, ModelReply, NarrativeModel};
pub use novelize::{ChapterDraft, Novelizer, NovelizerConfig};
pub use prompts::NarrativeStyle;
pub use session::{SessionHandle, SessionStore};
pub use state::{Combat, GameState, NarrativeEntry, NarrativeKind, StatCheck, TurnOutput};
pub use store::{
    FileSessionRepository, InMemorySessionRepository, SessionKey, SessionRecord,
    SessionRepository, StoreError, TurnRecord,
};
pub use testing::{ScriptedModel, TestHarness};
