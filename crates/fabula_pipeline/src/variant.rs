//! Seeded variant planner: deterministic narrative variety over a fixed
//! blueprint.
//!
//! The plan is a pure function of `(seed, category)`: identical inputs yield
//! identical variant choices, different seeds statistically diverge.

use fabula_core::{Blueprint, ChapterOverride, StoryCategory, VariantAxis, VariantPlan};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use strum::IntoEnumIterator;
use tracing::debug;

/// Maximum chapters that receive textual overrides.
const MAX_OVERRIDDEN_CHAPTERS: usize = 3;

/// Option table: one value list per variant axis.
struct AxisTable {
    setting: &'static [&'static str],
    encounter: &'static [&'static str],
    artifact_function: &'static [&'static str],
    rescue: &'static [&'static str],
    twist: &'static [&'static str],
}

impl AxisTable {
    fn options(&self, axis: VariantAxis) -> &'static [&'static str] {
        match axis {
            VariantAxis::Setting => self.setting,
            VariantAxis::Encounter => self.encounter,
            VariantAxis::ArtifactFunction => self.artifact_function,
            VariantAxis::Rescue => self.rescue,
            VariantAxis::Twist => self.twist,
        }
    }
}

/// Fallback table for categories without a dedicated one.
const DEFAULT_TABLE: AxisTable = AxisTable {
    setting: &[
        "a mossy forest",
        "a windswept coast",
        "a flowering valley",
        "an old harbor town",
    ],
    encounter: &[
        "a lost baby animal",
        "a traveling tinker",
        "a riddle-loving bird",
        "a shy giant",
    ],
    artifact_function: &[
        "glows near hidden paths",
        "warms when danger is close",
        "hums old melodies as hints",
        "shows fleeting pictures of what was",
    ],
    rescue: &[
        "a rope thrown at the last moment",
        "an unexpected friend returning",
        "a clever distraction",
        "a door nobody had noticed",
    ],
    twist: &[
        "the helper needed help all along",
        "the map was drawn by the artifact",
        "the rival wanted the same thing",
        "home was the destination from the start",
    ],
};

const ADVENTURE_TABLE: AxisTable = AxisTable {
    setting: &[
        "a canyon of singing stones",
        "a cloud forest above the falls",
        "a glacier with blue tunnels",
        "a sea of tall grass",
    ],
    encounter: &[
        "a mountain goat who knows shortcuts",
        "a mapmaker who lost her maps",
        "two squabbling marmots",
        "an eagle with a message",
    ],
    artifact_function: &[
        "points toward the next waypoint",
        "lightens heavy packs at dusk",
        "makes bridges feel steady",
        "remembers every path once walked",
    ],
    rescue: &[
        "a rockslide held back just long enough",
        "a whistled signal echoing back",
        "the rope bridge holding one more time",
        "a hidden ledge under the fog",
    ],
    twist: &[
        "the treasure is the view from the top",
        "the guide was testing their kindness",
        "the storm was protecting the valley",
        "the shortcut was the long way",
    ],
};

const SPACE_TABLE: AxisTable = AxisTable {
    setting: &[
        "a ring of glittering ice moons",
        "a nebula like spilled paint",
        "a comet's glowing tail",
        "a garden dome on a quiet asteroid",
    ],
    encounter: &[
        "a robot that collects lullabies",
        "a pilot racing a delivery",
        "a creature made of stardust",
        "a station cat with a plan",
    ],
    artifact_function: &[
        "translates the signal's song",
        "keeps the cabin warm through shadow",
        "charts gravity like a melody",
        "stores one sunbeam for emergencies",
    ],
    rescue: &[
        "a tether catching at the last second",
        "thrusters firing on borrowed power",
        "the station door opening from inside",
        "a slingshot around the little moon",
    ],
    twist: &[
        "the signal was an invitation home",
        "the robot wrote the lullaby itself",
        "the comet circles back every year",
        "the stardust creature was homesick too",
    ],
};

/// Dedicated tables, keyed by category. Missing categories use
/// [`DEFAULT_TABLE`].
fn table_for(category: StoryCategory) -> Option<&'static AxisTable> {
    match category {
        StoryCategory::Adventure => Some(&ADVENTURE_TABLE),
        StoryCategory::Space => Some(&SPACE_TABLE),
        StoryCategory::Fairytale
        | StoryCategory::Mystery
        | StoryCategory::Friendship => None,
    }
}

/// Stable per-category salt folded into the seed so the same seed across
/// categories still draws distinct choices.
fn category_salt(category: StoryCategory) -> u64 {
    match category {
        StoryCategory::Adventure => 0x9e37_79b9_7f4a_7c15,
        StoryCategory::Fairytale => 0xbf58_476d_1ce4_e5b9,
        StoryCategory::Mystery => 0x94d0_49bb_1331_11eb,
        StoryCategory::Friendship => 0xd6e8_feb8_6659_fd93,
        StoryCategory::Space => 0xa076_1d64_78bd_642f,
    }
}

/// Plan variant choices and up to 3 chapter overrides for one run.
///
/// Pure and deterministic: the same `(seed, category)` always yields the
/// same `variant_choices`. A category without a dedicated axis table falls
/// back to the default table; this is not an error.
pub fn plan_variants(seed: u64, category: StoryCategory, blueprint: &Blueprint) -> VariantPlan {
    let table = match table_for(category) {
        Some(table) => table,
        None => {
            debug!(%category, "No dedicated variant table, using default");
            &DEFAULT_TABLE
        }
    };

    let mut rng = StdRng::seed_from_u64(seed ^ category_salt(category));

    // Each axis is sampled independently in a fixed order.
    let mut variant_choices = BTreeMap::new();
    for axis in VariantAxis::iter() {
        let options = table.options(axis);
        let pick = options[rng.gen_range(0..options.len())];
        variant_choices.insert(axis, pick.to_string());
    }

    let scene_overrides = sample_overrides(&mut rng, blueprint, &variant_choices);

    VariantPlan {
        seed,
        variant_choices,
        scene_overrides,
    }
}

/// Secondary sampling: pick chapters to receive textual deltas derived from
/// the chosen axes. Variety without altering the blueprint structure.
fn sample_overrides(
    rng: &mut StdRng,
    blueprint: &Blueprint,
    choices: &BTreeMap<VariantAxis, String>,
) -> Vec<ChapterOverride> {
    let chapter_count = blueprint.scenes.len();
    if chapter_count == 0 {
        return Vec::new();
    }

    let how_many = rng.gen_range(1..=MAX_OVERRIDDEN_CHAPTERS.min(chapter_count));
    let mut chapters: Vec<u32> = blueprint.scenes.iter().map(|s| s.index).collect();
    chapters.shuffle(rng);
    chapters.truncate(how_many);
    chapters.sort_unstable();

    chapters
        .into_iter()
        .map(|chapter| {
            // Each override carries one or two deltas, never a full rewrite.
            let setting = rng
                .gen_bool(0.5)
                .then(|| choices.get(&VariantAxis::Setting).cloned())
                .flatten();
            let conflict = rng
                .gen_bool(0.5)
                .then(|| {
                    choices
                        .get(&VariantAxis::Encounter)
                        .map(|e| format!("the encounter with {e} complicates the plan"))
                })
                .flatten();
            let goal = rng
                .gen_bool(0.3)
                .then(|| {
                    choices
                        .get(&VariantAxis::Rescue)
                        .map(|r| format!("hold on until {r}"))
                })
                .flatten();
            let outcome = rng
                .gen_bool(0.3)
                .then(|| {
                    choices
                        .get(&VariantAxis::Twist)
                        .map(|t| format!("it turns out {t}"))
                })
                .flatten();
            ChapterOverride {
                chapter,
                setting,
                goal,
                conflict,
                outcome,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprints::blueprint_for;

    #[test]
    fn test_same_seed_same_choices() {
        let bp = blueprint_for(StoryCategory::Adventure, 5);
        let a = plan_variants(42, StoryCategory::Adventure, &bp);
        let b = plan_variants(42, StoryCategory::Adventure, &bp);
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_seeds_diverge() {
        let bp = blueprint_for(StoryCategory::Adventure, 5);
        let mut collisions = 0;
        for seed in 0..100u64 {
            let a = plan_variants(seed, StoryCategory::Adventure, &bp);
            let b = plan_variants(seed + 1000, StoryCategory::Adventure, &bp);
            if a.variant_choices == b.variant_choices {
                collisions += 1;
            }
        }
        assert!(collisions < 5, "too many collisions: {collisions}");
    }

    #[test]
    fn test_fallback_table_is_not_an_error() {
        let bp = blueprint_for(StoryCategory::Mystery, 4);
        let plan = plan_variants(7, StoryCategory::Mystery, &bp);
        assert_eq!(plan.variant_choices.len(), 5);
    }

    #[test]
    fn test_override_count_bounded() {
        let bp = blueprint_for(StoryCategory::Space, 8);
        for seed in 0..50 {
            let plan = plan_variants(seed, StoryCategory::Space, &bp);
            assert!(!plan.scene_overrides.is_empty());
            assert!(plan.scene_overrides.len() <= 3);
            for o in &plan.scene_overrides {
                assert!(o.chapter >= 1 && o.chapter <= 8);
            }
        }
    }
}
