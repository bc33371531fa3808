//! Baldur's Gate 3.

use super::{Campaign, Companion, Location, PlotPoint};

pub const BALDURS_GATE_3: &str = "baldurs-gate-3";

fn companion(id: &str, name: &str, description: &str) -> Companion {
    Companion {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
    }
}

fn location(id: &str, name: &str, description: &str, connections: &[&str]) -> Location {
    Location {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        connections: connections.iter().map(|c| c.to_string()).collect(),
    }
}

fn plot(id: &str, title: &str, description: &str, requirements: &[&str]) -> PlotPoint {
    PlotPoint {
        id: id.to_string(),
        title: title.to_string(),
        description: description.to_string(),
        requirements: requirements.iter().map(|r| r.to_string()).collect(),
    }
}

pub(super) fn campaign() -> Campaign {
    Campaign {
        id: BALDURS_GATE_3.to_string(),
        name: "Baldur's Gate 3".to_string(),
        description: "A dark, mature D&D 5e campaign in the Forgotten Realms. An Elder Brain \
            scheme called the Absolute has seeded a Mind Flayer tadpole behind your eyes. Seek a \
            cure across three acts: the Grove and Goblin crisis, the Shadow-Cursed Lands and \
            Ketheric Thorm, and finally Gortash and Orin in Baldur's Gate, where three \
            Netherstones and the Crown of Karsus decide the Elder Brain's fate."
            .to_string(),
        ruleset: Some("dnd-5e".to_string()),
        intro: include_str!("bg3_intro.md").to_string(),
        companions: vec![
            companion(
                "shadowheart",
                "Shadowheart",
                "Half-elf cleric of Shar, guarded about her past and her mission; a capable healer.",
            ),
            companion(
                "astarion",
                "Astarion",
                "High elf vampire spawn with a sharp tongue, two centuries enslaved to Cazador and hungry for freedom.",
            ),
            companion(
                "laezel",
                "Lae'zel",
                "Githyanki warrior bound by a strict martial code, desperate to return to her people.",
            ),
            companion(
                "gale",
                "Gale",
                "Renowned human wizard carrying a Netherese orb in his chest that could consume him.",
            ),
            companion(
                "wyll",
                "Wyll",
                "The Blade of Frontiers, a warlock whose infernal pact funds his heroism.",
            ),
            companion(
                "karlach",
                "Karlach",
                "Tiefling barbarian escaped from Avernus, her infernal engine heart burning ever hotter.",
            ),
        ],
        locations: vec![
            location(
                "nautiloid",
                "Nautiloid Ship",
                "A Mind Flayer vessel tearing through the Astral Plane under githyanki assault, crashing.",
                &["crash-site"],
            ),
            location(
                "crash-site",
                "Crash Site",
                "Smoking wreckage of the nautiloid on the Sword Coast; survivors and salvage among the debris.",
                &["nautiloid", "grove"],
            ),
            location(
                "grove",
                "Emerald Grove",
                "A druid enclave sheltering tiefling refugees, threatened by goblin raiders and its own rituals.",
                &["crash-site", "goblin-camp"],
            ),
            location(
                "goblin-camp",
                "Goblin Camp",
                "A desecrated temple overrun by goblins and worshippers of the Absolute.",
                &["grove", "underdark"],
            ),
            location(
                "underdark",
                "Underdark",
                "Bioluminescent caverns beneath the surface, home to myconids, duergar and worse.",
                &["goblin-camp", "moonrise-towers"],
            ),
            location(
                "moonrise-towers",
                "Moonrise Towers",
                "Ketheric Thorm's fortress in the Shadow-Cursed Lands, the cult's seat of power.",
                &["underdark", "baldurs-gate"],
            ),
            location(
                "baldurs-gate",
                "Baldur's Gate",
                "The great port city, ruled in the shadows by Gortash's Steel Watch; the final stage.",
                &["moonrise-towers"],
            ),
        ],
        plot: vec![
            plot(
                "escape-nautiloid",
                "Escape the Nautiloid",
                "Survive the crash of the Mind Flayer ship.",
                &[],
            ),
            plot(
                "find-companions",
                "Find Companions",
                "Find the other infected survivors and decide whom to trust.",
                &["escape-nautiloid"],
            ),
            plot(
                "investigate-tadpole",
                "Investigate the Tadpole",
                "Learn why the tadpole has not transformed you and who might remove it.",
                &["find-companions"],
            ),
            plot(
                "confront-absolute",
                "Confront the Absolute",
                "Face the cult of the Absolute and the Chosen who lead it.",
                &["investigate-tadpole"],
            ),
            plot(
                "final-choice",
                "The Final Choice",
                "Decide the fate of the Elder Brain, your companions and the city.",
                &["confront-absolute"],
            ),
        ],
        canon_query_hint: Some("Baldur's Gate 3 timeline and quest order".to_string()),
    }
}
