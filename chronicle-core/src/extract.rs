//! Pull machine-readable turn data out of model narration.
//!
//! The narrator is asked to end every reply with an
//! `<engine-struct>{...}</engine-struct>` trailer. When the trailer is present
//! and parses, it is authoritative. When it is missing or malformed, a few
//! legacy inline patterns are tried instead. Extraction never fails: the worst
//! case is narration with no structured payload.
//!
//! Anything the model says about a roll's `result` or `success` is discarded
//! here. Only the stat name and difficulty survive as an intent; the dice
//! resolver decides the outcome.

use crate::state::Combat;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Most choices offered to the player in one turn.
pub const MAX_CHOICES: usize = 4;

/// Difficulty classes are clamped into this range.
pub const MIN_DIFFICULTY: i32 = 1;
pub const MAX_DIFFICULTY: i32 = 30;

static STRUCT_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<engine-struct>(.*?)</engine-struct>").expect("valid regex"));

static LIST_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*(?:\d+\.|\*|-)[ \t]*(.+?)[ \t]*$").expect("valid regex"));

static STAT_PHRASE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Make an? (\w+) check \(DC (\d+)\)").expect("valid regex"));

static STAT_PHRASE_SENTENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[ \t]*Make an? \w+ check \(DC \d+\)\.?").expect("valid regex"));

static DICE_MARKERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\[(?:roll|check):?\s*\d+\]|\(d\d+\s*=\s*\d+\)").expect("valid regex")
});

static TRAILING_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+\n").expect("valid regex"));
static BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("valid regex"));
static INLINE_GAPS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]{2,}").expect("valid regex"));

/// A stat check the narrator asked for. Not yet rolled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatCheckIntent {
    pub stat: String,
    pub difficulty: i32,
}

/// Where the structured fields came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractSource {
    Trailer,
    Heuristic,
}

/// Result of extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    /// Narration with the trailer and mechanical phrasing removed.
    pub narration: String,
    pub choices: Option<Vec<String>>,
    pub stat_check: Option<StatCheckIntent>,
    pub combat: Option<Combat>,
    pub source: ExtractSource,
}

/// Normalize model text: LF line endings, no trailing whitespace on lines,
/// at most one blank line in a row, trimmed.
pub fn normalize(text: &str) -> String {
    let text = text.replace("\r\n", "\n");
    let text = TRAILING_SPACE.replace_all(&text, "\n");
    let text = BLANK_RUNS.replace_all(&text, "\n\n");
    text.trim().to_string()
}

/// Extract choices, stat-check intent and combat from a model reply.
pub fn extract(raw: &str) -> Extracted {
    let text = normalize(raw);

    let trailer = STRUCT_BLOCK
        .captures(&text)
        .and_then(|c| c.get(1))
        .and_then(|m| serde_json::from_str::<Value>(m.as_str().trim()).ok())
        .filter(Value::is_object);

    let without_trailer = STRUCT_BLOCK.replace_all(&text, "");

    let (choices, stat_check, combat, source) = match trailer {
        Some(json) => (
            parse_choices(&json),
            parse_stat_check(&json),
            parse_combat(&json),
            ExtractSource::Trailer,
        ),
        None => (
            heuristic_choices(&without_trailer),
            heuristic_stat_check(&without_trailer),
            heuristic_combat(&without_trailer),
            ExtractSource::Heuristic,
        ),
    };

    // Heuristic choices are listed separately; keep them out of the prose.
    let mut narration = clean_narration(&without_trailer);
    if source == ExtractSource::Heuristic && choices.is_some() {
        let prose = clean_narration(&LIST_ITEM.replace_all(&without_trailer, ""));
        if !prose.is_empty() {
            narration = prose;
        }
    }

    Extracted {
        narration,
        choices,
        stat_check,
        combat,
        source,
    }
}

/// Remove stat-check phrases and dice markers from prose shown to the player.
pub fn clean_narration(text: &str) -> String {
    let text = STAT_PHRASE_SENTENCE.replace_all(text, "");
    let text = DICE_MARKERS.replace_all(&text, "");
    let text = INLINE_GAPS.replace_all(&text, " ");
    normalize(&text)
}

fn value_to_label(v: &Value) -> String {
    match v {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

fn parse_choices(json: &Value) -> Option<Vec<String>> {
    let items = json.get("choices")?.as_array()?;
    let choices: Vec<String> = items
        .iter()
        .map(value_to_label)
        .filter(|c| !c.is_empty())
        .take(MAX_CHOICES)
        .collect();
    (!choices.is_empty()).then_some(choices)
}

fn parse_stat_check(json: &Value) -> Option<StatCheckIntent> {
    let sc = json.get("statCheck")?.as_object()?;
    let stat = sc.get("stat")?.as_str()?.trim();
    if stat.is_empty() {
        return None;
    }
    let difficulty = match sc.get("difficulty")? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !difficulty.is_finite() {
        return None;
    }
    Some(StatCheckIntent {
        stat: stat.to_string(),
        difficulty: clamp_difficulty(difficulty.trunc() as i64),
    })
}

fn parse_combat(json: &Value) -> Option<Combat> {
    let cb = json.get("combat")?.as_object()?;
    let enemies = cb
        .get("enemies")
        .and_then(Value::as_array)
        .map(|a| a.iter().map(value_to_label).collect())
        .unwrap_or_default();
    let player_health = match cb.get("playerHealth") {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    };
    let enemy_health = cb
        .get("enemyHealth")
        .cloned()
        .filter(|v| !v.is_null())
        .unwrap_or_else(|| Value::Object(Default::default()));
    Some(Combat {
        enemies,
        player_health,
        enemy_health,
    })
}

fn heuristic_choices(text: &str) -> Option<Vec<String>> {
    let choices: Vec<String> = LIST_ITEM
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|c| !c.is_empty())
        .take(MAX_CHOICES)
        .collect();
    (!choices.is_empty()).then_some(choices)
}

fn heuristic_stat_check(text: &str) -> Option<StatCheckIntent> {
    let caps = STAT_PHRASE.captures(text)?;
    let stat = caps.get(1)?.as_str().to_string();
    let difficulty = caps.get(2)?.as_str().parse::<i64>().ok()?;
    Some(StatCheckIntent {
        stat,
        difficulty: clamp_difficulty(difficulty),
    })
}

fn heuristic_combat(text: &str) -> Option<Combat> {
    let lower = text.to_lowercase();
    if !(lower.contains("combat") || lower.contains("battle")) {
        return None;
    }
    Some(Combat {
        enemies: vec!["Unknown enemy".to_string()],
        player_health: 100.0,
        enemy_health: serde_json::json!({ "Unknown enemy": 50 }),
    })
}

fn clamp_difficulty(dc: i64) -> i32 {
    dc.clamp(i64::from(MIN_DIFFICULTY), i64::from(MAX_DIFFICULTY)) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        let raw = "Line one.  \r\nLine two.\n\n\n\nLine three.\t\n  ";
        assert_eq!(normalize(raw), "Line one.\nLine two.\n\nLine three.");
    }

    #[test]
    fn test_trailer_is_parsed_and_stripped() {
        let reply = "The druids argue in the grove.\n\n<engine-struct>{\"choices\":[\"Help the druids\",\"Join the goblins\"],\"statCheck\":{\"stat\":\"Perception\",\"difficulty\":12}}</engine-struct>";
        let out = extract(reply);

        assert_eq!(out.source, ExtractSource::Trailer);
        assert_eq!(
            out.choices,
            Some(vec!["Help the druids".to_string(), "Join the goblins".to_string()])
        );
        assert_eq!(
            out.stat_check,
            Some(StatCheckIntent {
                stat: "Perception".to_string(),
                difficulty: 12
            })
        );
        assert!(out.combat.is_none());
        assert_eq!(out.narration, "The druids argue in the grove.");
        assert!(!out.narration.contains("engine-struct"));
    }

    #[test]
    fn test_trailer_tag_is_case_insensitive_and_multiline() {
        let reply = "Rain.\n<ENGINE-STRUCT>\n{\n  \"choices\": [\"Wait\"]\n}\n</Engine-Struct>";
        let out = extract(reply);
        assert_eq!(out.choices, Some(vec!["Wait".to_string()]));
        assert_eq!(out.narration, "Rain.");
    }

    #[test]
    fn test_choices_capped_and_stringified() {
        let reply = r#"Go.<engine-struct>{"choices":["a","b",3,"d","e","f"]}</engine-struct>"#;
        let out = extract(reply);
        assert_eq!(
            out.choices,
            Some(vec!["a".into(), "b".into(), "3".into(), "d".into()])
        );
    }

    #[test]
    fn test_model_result_and_success_are_dropped() {
        let reply = r#"You strain.<engine-struct>{"statCheck":{"stat":"X","difficulty":10,"result":20,"success":true}}</engine-struct>"#;
        let intent = extract(reply).stat_check.unwrap();
        assert_eq!(intent.stat, "X");
        assert_eq!(intent.difficulty, 10);
    }

    #[test]
    fn test_stat_check_difficulty_coercion() {
        let reply = r#"x<engine-struct>{"statCheck":{"stat":"Wisdom","difficulty":"14"}}</engine-struct>"#;
        assert_eq!(extract(reply).stat_check.unwrap().difficulty, 14);

        let reply = r#"x<engine-struct>{"statCheck":{"stat":"Wisdom","difficulty":"hard"}}</engine-struct>"#;
        assert!(extract(reply).stat_check.is_none());

        let reply = r#"x<engine-struct>{"statCheck":{"stat":"Wisdom"}}</engine-struct>"#;
        assert!(extract(reply).stat_check.is_none());

        let reply = r#"x<engine-struct>{"statCheck":{"stat":"Wisdom","difficulty":99}}</engine-struct>"#;
        assert_eq!(extract(reply).stat_check.unwrap().difficulty, MAX_DIFFICULTY);
    }

    #[test]
    fn test_combat_from_trailer() {
        let reply = r#"Steel rings.<engine-struct>{"combat":{"enemies":["Goblin","Imp"],"playerHealth":"42","enemyHealth":{"Goblin":7}}}</engine-struct>"#;
        let combat = extract(reply).combat.unwrap();
        assert_eq!(combat.enemies, vec!["Goblin", "Imp"]);
        assert_eq!(combat.player_health, 42.0);
        assert_eq!(combat.enemy_health["Goblin"], 7);
    }

    #[test]
    fn test_valid_trailer_suppresses_heuristics() {
        let reply = "The battle is over.\n1. Rest\n<engine-struct>{}</engine-struct>";
        let out = extract(reply);
        assert_eq!(out.source, ExtractSource::Trailer);
        assert!(out.choices.is_none());
        assert!(out.combat.is_none());
    }

    #[test]
    fn test_malformed_trailer_falls_back_to_heuristics() {
        let reply = "A goblin bars the way. Make a Strength check (DC 15).\n1. Shove it\n2. Talk\n<engine-struct>{choices: nope</engine-struct>";
        let out = extract(reply);

        assert_eq!(out.source, ExtractSource::Heuristic);
        assert_eq!(
            out.stat_check,
            Some(StatCheckIntent {
                stat: "Strength".into(),
                difficulty: 15
            })
        );
        assert_eq!(out.choices, Some(vec!["Shove it".into(), "Talk".into()]));
        assert!(!out.narration.contains("engine-struct"));
        assert!(!out.narration.contains("DC 15"));
        assert_eq!(out.narration, "A goblin bars the way.");
    }

    #[test]
    fn test_heuristic_choices_removed_from_narration() {
        let out = extract("Drums echo in the dark.\n\n1. Fight\n2. Flee\n\nThe fire gutters.");
        assert_eq!(out.choices, Some(vec!["Fight".into(), "Flee".into()]));
        assert_eq!(out.narration, "Drums echo in the dark.\n\nThe fire gutters.");

        // A reply that is only a list keeps it as narration too.
        let out = extract("- Fight\n- Flee");
        assert_eq!(out.choices, Some(vec!["Fight".into(), "Flee".into()]));
        assert_eq!(out.narration, "- Fight\n- Flee");
    }

    #[test]
    fn test_heuristic_combat_keyword() {
        let out = extract("Battle erupts on the deck!");
        let combat = out.combat.unwrap();
        assert_eq!(combat.enemies, vec!["Unknown enemy"]);
        assert_eq!(combat.player_health, 100.0);

        assert!(extract("A quiet evening.").combat.is_none());
    }

    #[test]
    fn test_plain_narration_has_no_payload() {
        let out = extract("You walk along the shore.");
        assert!(out.choices.is_none());
        assert!(out.stat_check.is_none());
        assert!(out.combat.is_none());
        assert_eq!(out.narration, "You walk along the shore.");
    }

    #[test]
    fn test_dice_markers_removed_from_narration() {
        let out = extract("You swing [Roll: 17] and connect (d20 = 17) cleanly.");
        assert_eq!(out.narration, "You swing and connect cleanly.");
    }
}
