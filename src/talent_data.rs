// Bundled Burning Crusade Shaman talent trees and build presets.
// Talents are listed in display order per tier; `col` pins a column and `req`
// names a prerequisite in the same tree.

use crate::talent::{PrerequisiteRule, TalentData, TalentDef, TreeDef};

/// (name, tier, max rank, column override, prerequisite)
type Row = (&'static str, u8, u8, Option<u8>, Option<&'static str>);

const ELEMENTAL: &[Row] = &[
    ("Convection", 1, 5, None, None),
    ("Concussion", 1, 5, None, None),
    ("Earth's Grasp", 2, 2, None, None),
    ("Elemental Warding", 2, 3, None, None),
    ("Call of Flame", 2, 3, None, None),
    ("Elemental Focus", 3, 1, None, None),
    ("Reverberation", 3, 5, None, None),
    ("Call of Thunder", 3, 5, None, None),
    ("Improved Fire Totems", 4, 2, None, None),
    ("Eye of the Storm", 4, 3, None, None),
    ("Elemental Devastation", 4, 3, Some(4), None),
    ("Storm Reach", 5, 2, None, None),
    ("Elemental Fury", 5, 1, None, None),
    ("Unrelenting Storm", 5, 5, Some(4), None),
    ("Elemental Precision", 6, 3, Some(1), None),
    ("Lightning Mastery", 6, 5, Some(3), Some("Call of Thunder")),
    ("Elemental Mastery", 7, 1, None, Some("Elemental Fury")),
    ("Elemental Shields", 7, 3, None, None),
    ("Lightning Overload", 8, 5, None, None),
    ("Totem of Wrath", 9, 1, None, Some("Lightning Overload")),
];

const ENHANCEMENT: &[Row] = &[
    ("Ancestral Knowledge", 1, 5, None, None),
    ("Shield Specialization", 1, 5, None, None),
    ("Guardian Totems", 2, 2, None, None),
    ("Thundering Strikes", 2, 5, None, None),
    ("Improved Ghost Wolf", 2, 2, None, None),
    ("Improved Lightning Shield", 2, 3, None, None),
    ("Enhancing Totems", 3, 2, None, None),
    ("Shamanistic Focus", 3, 1, Some(3), None),
    ("Anticipation", 3, 5, Some(4), None),
    ("Flurry", 4, 5, None, Some("Thundering Strikes")),
    ("Toughness", 4, 5, None, None),
    ("Improved Weapon Totems", 5, 2, None, None),
    ("Spirit Weapons", 5, 1, None, None),
    ("Elemental Weapons", 5, 3, None, None),
    ("Mental Quickness", 6, 3, Some(1), None),
    ("Weapon Mastery", 6, 5, Some(4), None),
    ("Dual Wield Specialization", 7, 3, None, Some("Dual Wield")),
    ("Dual Wield", 7, 1, None, Some("Spirit Weapons")),
    ("Stormstrike", 7, 1, None, Some("Elemental Weapons")),
    ("Unleashed Rage", 8, 5, None, None),
    ("Shamanistic Rage", 9, 1, None, None),
];

const RESTORATION: &[Row] = &[
    ("Improved Healing Wave", 1, 5, None, None),
    ("Tidal Focus", 1, 5, None, None),
    ("Improved Reincarnation", 2, 2, None, None),
    ("Ancestral Healing", 2, 3, None, None),
    ("Totemic Focus", 2, 5, None, None),
    ("Nature's Guidance", 3, 3, None, None),
    ("Healing Focus", 3, 5, None, None),
    ("Totemic Mastery", 3, 1, None, None),
    ("Healing Grace", 3, 3, None, None),
    ("Restorative Totems", 4, 5, None, None),
    ("Tidal Mastery", 4, 5, None, None),
    ("Healing Way", 5, 3, None, None),
    ("Nature's Swiftness", 5, 1, Some(3), None),
    ("Focused Mind", 5, 3, Some(4), None),
    ("Purification", 6, 5, Some(3), None),
    ("Mana Tide Totem", 7, 1, None, Some("Restorative Totems")),
    ("Nature's Guardian", 7, 5, None, None),
    ("Nature's Blessing", 8, 3, None, None),
    ("Improved Chain Heal", 8, 2, None, None),
    ("Earth Shield", 9, 1, None, Some("Nature's Blessing")),
];

fn tree(key: &str, label: &str, icon_dir: &str, rows: &[Row]) -> TreeDef {
    TreeDef {
        key: key.to_string(),
        label: label.to_string(),
        icon_dir: Some(icon_dir.to_string()),
        talents: rows
            .iter()
            .map(|&(name, tier, max, col, req)| TalentDef {
                name: name.to_string(),
                tier,
                max,
                col,
                req: req.map(str::to_string),
            })
            .collect(),
    }
}

/// Shaman trees: 61 points over 9 tiers of 4 columns, prerequisites at max rank.
pub fn shaman_talent_data() -> TalentData {
    TalentData {
        total_points: 61,
        tiers: 9,
        cols: 4,
        prerequisite_rule: PrerequisiteRule::MaxRank,
        trees: vec![
            tree("elemental", "Elemental", "spec1", ELEMENTAL),
            tree("enhancement", "Enhancement", "spec2", ENHANCEMENT),
            tree("restoration", "Restoration", "spec3", RESTORATION),
        ],
    }
}

/// A named build. Ranks are keyed by talent id.
#[derive(Debug, Clone, Copy)]
pub struct Preset {
    pub key: &'static str,
    pub label: &'static str,
    pub ranks: &'static [(&'static str, u8)],
}

const SUB_ELEMENTAL: &[(&str, u8)] = &[
    ("elemental_convection", 2),
    ("elemental_concussion", 5),
    ("elemental_call_of_flame", 3),
    ("elemental_reverberation", 5),
    ("elemental_elemental_focus", 1),
    ("elemental_improved_fire_totems", 1),
    ("enhancement_ancestral_knowledge", 5),
    ("enhancement_thundering_strikes", 5),
    ("enhancement_improved_ghost_wolf", 2),
    ("enhancement_enhancing_totems", 2),
    ("enhancement_shamanistic_focus", 1),
    ("enhancement_flurry", 5),
    ("enhancement_toughness", 1),
    ("enhancement_elemental_weapons", 3),
    ("enhancement_spirit_weapons", 1),
    ("enhancement_mental_quickness", 3),
    ("enhancement_weapon_mastery", 5),
    ("enhancement_unleashed_rage", 5),
    ("enhancement_dual_wield", 1),
    ("enhancement_dual_wield_specialization", 3),
    ("enhancement_stormstrike", 1),
    ("enhancement_shamanistic_rage", 1),
];

const SUB_RESTORATION: &[(&str, u8)] = &[
    ("elemental_concussion", 3),
    ("enhancement_ancestral_knowledge", 5),
    ("enhancement_thundering_strikes", 5),
    ("enhancement_improved_ghost_wolf", 2),
    ("enhancement_enhancing_totems", 2),
    ("enhancement_shamanistic_focus", 1),
    ("enhancement_flurry", 5),
    ("enhancement_toughness", 1),
    ("enhancement_elemental_weapons", 3),
    ("enhancement_spirit_weapons", 1),
    ("enhancement_mental_quickness", 3),
    ("enhancement_weapon_mastery", 5),
    ("enhancement_unleashed_rage", 5),
    ("enhancement_dual_wield", 1),
    ("enhancement_dual_wield_specialization", 3),
    ("enhancement_stormstrike", 1),
    ("enhancement_shamanistic_rage", 1),
    ("restoration_improved_healing_wave", 5),
    ("restoration_totemic_focus", 5),
    ("restoration_natures_guidance", 3),
    ("restoration_totemic_mastery", 1),
];

pub const PRESETS: &[Preset] = &[
    Preset {
        key: "example",
        label: "Empty",
        ranks: &[],
    },
    Preset {
        key: "enh_17_44_00",
        label: "17/44/00 Sub Elemental",
        ranks: SUB_ELEMENTAL,
    },
    Preset {
        key: "ele_03_44_14",
        label: "03/44/14 Sub Restoration",
        ranks: SUB_RESTORATION,
    },
];

pub fn preset(key: &str) -> Option<&'static Preset> {
    PRESETS.iter().find(|preset| preset.key == key)
}
