//! Deterministic d20 resolution for stat checks.
//!
//! A roll is a pure function of the session's `rng_seed`, the turn number being
//! played, the stat and the difficulty. Replaying a turn reproduces the same
//! roll, and no client-supplied value can influence it.
//!
//! The hashing scheme is versioned. Sessions record the version they were
//! created with so that a future change of algorithm never rewrites history.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Version stamped on every new session.
pub const CURRENT_RNG_VERSION: u32 = 1;

/// Errors from dice resolution.
#[derive(Debug, Error)]
pub enum DiceError {
    #[error("Unknown RNG version {0}")]
    UnknownVersion(u32),
}

/// One component of a roll's seed tuple.
///
/// Serialized to compact JSON (`[12345,1,"stat","Perception",12]`), which is
/// the string that gets hashed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SeedComponent {
    Int(i64),
    Text(String),
}

impl From<i64> for SeedComponent {
    fn from(v: i64) -> Self {
        SeedComponent::Int(v)
    }
}

impl From<&str> for SeedComponent {
    fn from(v: &str) -> Self {
        SeedComponent::Text(v.to_string())
    }
}

/// Seed tuple for a stat check on `turn_number`.
pub fn stat_check_seed(
    rng_seed: u32,
    turn_number: u64,
    stat: &str,
    difficulty: i32,
) -> Vec<SeedComponent> {
    vec![
        SeedComponent::Int(i64::from(rng_seed)),
        SeedComponent::Int(turn_number as i64),
        SeedComponent::from("stat"),
        SeedComponent::from(stat),
        SeedComponent::Int(i64::from(difficulty)),
    ]
}

/// A seeded d20 algorithm.
pub trait RollStrategy: Send + Sync {
    /// The version number sessions are stamped with.
    fn version(&self) -> u32;

    /// Roll a d20 in `1..=20` from the given seed tuple.
    fn roll_d20(&self, components: &[SeedComponent]) -> u8;
}

/// Version 1: xmur3 string hash over the UTF-16 code units of the compact JSON
/// encoding, feeding one draw of mulberry32.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mulberry32V1;

impl RollStrategy for Mulberry32V1 {
    fn version(&self) -> u32 {
        1
    }

    fn roll_d20(&self, components: &[SeedComponent]) -> u8 {
        // Serializing a Vec of ints and strings cannot fail.
        let key = serde_json::to_string(components).unwrap_or_default();
        let seed = xmur3(&key);
        let draw = mulberry32(seed);
        (draw * 20.0).floor() as u8 + 1
    }
}

/// Look up the strategy for a session's RNG version.
pub fn strategy_for(version: u32) -> Result<&'static dyn RollStrategy, DiceError> {
    static V1: Mulberry32V1 = Mulberry32V1;
    match version {
        1 => Ok(&V1),
        other => Err(DiceError::UnknownVersion(other)),
    }
}

/// Roll the d20 for a stat check using the current algorithm.
pub fn roll_stat_check(rng_seed: u32, turn_number: u64, stat: &str, difficulty: i32) -> u8 {
    Mulberry32V1.roll_d20(&stat_check_seed(rng_seed, turn_number, stat, difficulty))
}

fn xmur3(input: &str) -> u32 {
    let units: Vec<u16> = input.encode_utf16().collect();
    let mut h: u32 = 1_779_033_703 ^ units.len() as u32;
    for unit in units {
        h = (h ^ u32::from(unit)).wrapping_mul(3_432_918_353);
        h = h.rotate_left(13);
    }
    h = (h ^ (h >> 16)).wrapping_mul(2_246_822_507);
    h = (h ^ (h >> 13)).wrapping_mul(3_266_489_909);
    h ^ (h >> 16)
}

fn mulberry32(seed: u32) -> f64 {
    let a = seed.wrapping_add(0x6d2b_79f5);
    let mut t = (a ^ (a >> 15)).wrapping_mul(a | 1);
    t ^= t.wrapping_add((t ^ (t >> 7)).wrapping_mul(t | 61));
    f64::from(t ^ (t >> 14)) / 4_294_967_296.0
}
