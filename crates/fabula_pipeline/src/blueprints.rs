//! Fixed narrative blueprints per story category.
//!
//! Blueprints are static data. Variety comes from the seeded variant
//! planner, never from editing these templates.

use fabula_core::{
    ArtifactUsage, Blueprint, BlueprintScene, Mood, SlotKey, StoryCategory,
};

/// One reusable beat in a category's arc.
struct Beat {
    title: &'static str,
    setting: &'static str,
    goal: &'static str,
    conflict: &'static str,
    outcome: &'static str,
}

/// Middle-of-story beats per category, cycled when the chapter count exceeds
/// the table length.
fn middle_beats(category: StoryCategory) -> &'static [Beat] {
    match category {
        StoryCategory::Adventure => &[
            Beat {
                title: "Der steile Pfad",
                setting: "a winding mountain path",
                goal: "follow the map to the hidden pass",
                conflict: "the path splits and the map is smudged",
                outcome: "a clue reveals the right way",
            },
            Beat {
                title: "Die Hängebrücke",
                setting: "a rope bridge over a rushing river",
                goal: "cross to the far side before dusk",
                conflict: "a plank is missing and courage wavers",
                outcome: "teamwork carries everyone across",
            },
            Beat {
                title: "Das verborgene Lager",
                setting: "a sheltered clearing at night",
                goal: "rest and plan the final stretch",
                conflict: "strange sounds circle the camp",
                outcome: "the sounds turn out to be a friend",
            },
        ],
        StoryCategory::Fairytale => &[
            Beat {
                title: "Der sprechende Brunnen",
                setting: "an old castle courtyard",
                goal: "ask the well about the spell",
                conflict: "the well only answers riddles",
                outcome: "a riddle solved earns a hint",
            },
            Beat {
                title: "Der Rosengarten",
                setting: "an enchanted rose garden",
                goal: "find the silver key among the roses",
                conflict: "the roses rearrange themselves",
                outcome: "kindness makes the garden hold still",
            },
        ],
        StoryCategory::Mystery => &[
            Beat {
                title: "Die erste Spur",
                setting: "a rainy village square",
                goal: "follow the muddy footprints",
                conflict: "the prints vanish at the fountain",
                outcome: "a dropped button points onward",
            },
            Beat {
                title: "Das Notizbuch",
                setting: "a dusty attic",
                goal: "decode the notebook's shorthand",
                conflict: "pages are missing",
                outcome: "the margin doodles complete the picture",
            },
        ],
        StoryCategory::Friendship => &[
            Beat {
                title: "Das Missverständnis",
                setting: "the school courtyard",
                goal: "patch things up after a quarrel",
                conflict: "pride keeps everyone quiet",
                outcome: "a small gesture breaks the silence",
            },
            Beat {
                title: "Das gemeinsame Projekt",
                setting: "a cluttered workshop",
                goal: "build something only both can finish",
                conflict: "the plans don't match",
                outcome: "combining both plans works better",
            },
        ],
        StoryCategory::Space => &[
            Beat {
                title: "Der Asteroidengürtel",
                setting: "a field of slow-tumbling asteroids",
                goal: "thread the ship through the field",
                conflict: "the autopilot refuses the route",
                outcome: "steady hands find a gap",
            },
            Beat {
                title: "Die stille Station",
                setting: "an abandoned orbital station",
                goal: "restore power to the beacon",
                conflict: "the corridors all look alike",
                outcome: "humming vents lead to the reactor",
            },
        ],
    }
}

fn opening_beat(category: StoryCategory) -> Beat {
    match category {
        StoryCategory::Adventure => Beat {
            title: "Der Aufbruch",
            setting: "a sunlit meadow at the forest edge",
            goal: "set out on the journey",
            conflict: "something important is almost forgotten",
            outcome: "the journey begins with everything packed",
        },
        StoryCategory::Fairytale => Beat {
            title: "Die Einladung",
            setting: "a small cottage near the castle",
            goal: "answer the mysterious invitation",
            conflict: "the invitation is written backwards",
            outcome: "a mirror reveals the message",
        },
        StoryCategory::Mystery => Beat {
            title: "Das Verschwinden",
            setting: "a cozy kitchen in the morning",
            goal: "figure out what went missing overnight",
            conflict: "everyone remembers it differently",
            outcome: "the first clue turns up under the table",
        },
        StoryCategory::Friendship => Beat {
            title: "Der neue Nachbar",
            setting: "a quiet street on moving day",
            goal: "say hello to the newcomer",
            conflict: "shyness on both sides",
            outcome: "a shared smile starts it all",
        },
        StoryCategory::Space => Beat {
            title: "Der Countdown",
            setting: "a launch pad at dawn",
            goal: "lift off toward the signal",
            conflict: "a warning light blinks at the last second",
            outcome: "a loose cable is fixed just in time",
        },
    }
}

fn climax_beat(category: StoryCategory) -> Beat {
    match category {
        StoryCategory::Adventure => Beat {
            title: "Die Höhle",
            setting: "a glittering cave behind the waterfall",
            goal: "reach the heart of the cave",
            conflict: "the way back seals shut",
            outcome: "the artifact lights a new way out",
        },
        StoryCategory::Fairytale => Beat {
            title: "Der Turm",
            setting: "the highest tower at midnight",
            goal: "break the spell before the last bell",
            conflict: "the stairs twist into knots",
            outcome: "the true name undoes the spell",
        },
        StoryCategory::Mystery => Beat {
            title: "Die Auflösung naht",
            setting: "the old mill at dusk",
            goal: "catch the mystery in the act",
            conflict: "the lanterns blow out",
            outcome: "the truth steps into the moonlight",
        },
        StoryCategory::Friendship => Beat {
            title: "Die Probe",
            setting: "the stage before the show",
            goal: "pull off the performance together",
            conflict: "stage fright strikes",
            outcome: "a friend's hand steadies everything",
        },
        StoryCategory::Space => Beat {
            title: "Das Signal",
            setting: "the source of the mysterious signal",
            goal: "answer the signal before the window closes",
            conflict: "the transmitter is nearly out of power",
            outcome: "the artifact hums with exactly enough energy",
        },
    }
}

fn finale_beat(category: StoryCategory) -> Beat {
    match category {
        StoryCategory::Adventure => Beat {
            title: "Die Heimkehr",
            setting: "the sunlit meadow, now at evening",
            goal: "bring the treasure home",
            conflict: "saying goodbye to the road",
            outcome: "home feels bigger than before",
        },
        StoryCategory::Fairytale => Beat {
            title: "Das Fest",
            setting: "the castle great hall",
            goal: "celebrate the broken spell",
            conflict: "one chair stays empty",
            outcome: "the missing guest arrives last and happiest",
        },
        StoryCategory::Mystery => Beat {
            title: "Alles erklärt",
            setting: "the kitchen, warm again",
            goal: "lay out how every clue fit",
            conflict: "one detail still puzzles everyone",
            outcome: "the smallest listener solves it",
        },
        StoryCategory::Friendship => Beat {
            title: "Beste Freunde",
            setting: "the rooftop at sunset",
            goal: "promise the next adventure",
            conflict: "none worth mentioning",
            outcome: "a promise sealed with laughter",
        },
        StoryCategory::Space => Beat {
            title: "Die Rückkehr",
            setting: "the home planet growing in the window",
            goal: "land with the new friend aboard",
            conflict: "the landing gear sticks, briefly",
            outcome: "touchdown, and stories for years",
        },
    }
}

fn scene_from_beat(
    beat: &Beat,
    index: u32,
    mood: Mood,
    artifact_usage: ArtifactUsage,
    with_pool: bool,
) -> BlueprintScene {
    let mut mandatory_slots = vec![SlotKey::avatar(1)];
    if with_pool {
        mandatory_slots.push(SlotKey::pool(1));
    }
    BlueprintScene {
        index,
        title: beat.title.to_string(),
        setting: beat.setting.to_string(),
        mood,
        goal: beat.goal.to_string(),
        conflict: beat.conflict.to_string(),
        outcome: beat.outcome.to_string(),
        mandatory_slots,
        artifact_usage,
        avoid: vec!["darkness without light source".to_string()],
        canon_anchor: None,
    }
}

/// Build the fixed blueprint for a category at a given chapter count.
///
/// The arc is always: opening (Calm), middle beats cycled (Mysterious/Funny
/// alternating), climax (Tense) as second-to-last, finale (Triumph). The
/// artifact enters in chapter 2 and is central at the climax and finale.
/// Single-chapter stories collapse to the finale beat alone.
pub fn blueprint_for(category: StoryCategory, chapter_count: u32) -> Blueprint {
    let n = chapter_count.max(1);
    let mut scenes = Vec::with_capacity(n as usize);

    for index in 1..=n {
        let scene = if index == n {
            scene_from_beat(
                &finale_beat(category),
                index,
                Mood::Triumph,
                ArtifactUsage::Central,
                n > 1,
            )
        } else if index == n - 1 && n >= 3 {
            scene_from_beat(
                &climax_beat(category),
                index,
                Mood::Tense,
                ArtifactUsage::Central,
                true,
            )
        } else if index == 1 {
            scene_from_beat(
                &opening_beat(category),
                index,
                Mood::Calm,
                ArtifactUsage::Absent,
                false,
            )
        } else {
            let beats = middle_beats(category);
            let beat = &beats[((index - 2) as usize) % beats.len()];
            let mood = if index % 2 == 0 {
                Mood::Mysterious
            } else {
                Mood::Funny
            };
            let usage = if index == 2 {
                ArtifactUsage::Central
            } else {
                ArtifactUsage::Present
            };
            scene_from_beat(beat, index, mood, usage, true)
        };
        scenes.push(scene);
    }

    Blueprint { category, scenes }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blueprint_has_requested_chapter_count() {
        for n in [1, 3, 5, 8] {
            let bp = blueprint_for(StoryCategory::Adventure, n);
            assert_eq!(bp.scenes.len(), n as usize);
            assert_eq!(bp.scenes.last().unwrap().mood, Mood::Triumph);
        }
    }

    #[test]
    fn test_climax_is_tense_second_to_last() {
        let bp = blueprint_for(StoryCategory::Space, 5);
        assert_eq!(bp.scene(4).unwrap().mood, Mood::Tense);
        assert_eq!(bp.scene(4).unwrap().artifact_usage, ArtifactUsage::Central);
    }

    #[test]
    fn test_every_scene_mandates_the_avatar() {
        let bp = blueprint_for(StoryCategory::Mystery, 6);
        for scene in &bp.scenes {
            assert!(scene.mandatory_slots.contains(&SlotKey::avatar(1)));
        }
    }
}
