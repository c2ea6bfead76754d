// Display registries consumed by the labs: spell names/icons and talent tooltips.
// Lookups never fail; a missing key degrades to a placeholder.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::EngineError;

const ICON_BASE: &str = "https://wow.zamimg.com/images/wow/icons";
const UNKNOWN_ICON: &str = "inv_misc_questionmark";

/// Icon URL for an icon file name.
pub fn icon_url(icon: &str) -> String {
    format!("{ICON_BASE}/large/{icon}.jpg")
}

/// Name and icon for a spell key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpellRef {
    pub name: String,
    pub icon: String,
}

impl SpellRef {
    fn new(name: &str, icon: &str) -> Self {
        SpellRef {
            name: name.to_string(),
            icon: icon_url(icon),
        }
    }

    pub fn unknown() -> Self {
        SpellRef::new("Unknown", UNKNOWN_ICON)
    }
}

const SHAMAN_SPELLS: &[(&str, &str, &str)] = &[
    ("stormstrike", "Stormstrike", "ability_shaman_stormstrike"),
    ("shamanistic_rage", "Shamanistic Rage", "spell_nature_shamanrage"),
    ("dual_wield", "Dual Wield", "ability_dualwield"),
    ("flurry", "Flurry", "ability_ghoulfrenzy"),
    ("unleashed_rage", "Unleashed Rage", "spell_nature_unleashedrage"),
    ("windfury_weapon", "Windfury Weapon", "spell_nature_cyclone"),
    ("flametongue_weapon", "Flametongue Weapon", "spell_fire_flametounge"),
    ("improved_fire_totems", "Improved Fire Totems", "spell_fire_sealoffire"),
    ("windfury_totem", "Windfury Totem", "spell_nature_windfury"),
    ("grace_of_air_totem", "Grace of Air Totem", "spell_nature_invisibilitytotem"),
    ("searing_totem", "Searing Totem", "spell_fire_searingtotem"),
    ("fire_nova_totem", "Fire Nova Totem", "spell_fire_sealoffire"),
    ("magma_totem", "Magma Totem", "spell_fire_selfdestruct"),
    ("air_totem", "Air Totem", "spell_totem_wardofdraining"),
    ("fire_totem", "Fire Totem", "spell_totem_wardofdraining"),
];

/// Spell key to display name and icon.
#[derive(Debug, Clone, Default)]
pub struct SpellRegistry {
    spells: HashMap<String, SpellRef>,
}

impl SpellRegistry {
    pub fn new() -> Self {
        SpellRegistry::default()
    }

    /// Spells the trainer pages reference.
    pub fn shaman() -> Self {
        let spells = SHAMAN_SPELLS
            .iter()
            .map(|(key, name, icon)| (key.to_string(), SpellRef::new(name, icon)))
            .collect();
        SpellRegistry { spells }
    }

    /// Merge host-supplied entries (`{"key": {"name": .., "icon": ..}}`) over the current set.
    pub fn extend_from_json(&mut self, json: &str) -> Result<usize, EngineError> {
        let extra: HashMap<String, SpellRef> = serde_json::from_str(json)?;
        let count = extra.len();
        self.spells.extend(extra);
        Ok(count)
    }

    pub fn insert(&mut self, key: impl Into<String>, spell: SpellRef) {
        self.spells.insert(key.into(), spell);
    }

    pub fn get(&self, key: &str) -> Option<&SpellRef> {
        self.spells.get(key)
    }

    /// Entry for `key`, or the "Unknown" placeholder.
    pub fn lookup(&self, key: &str) -> SpellRef {
        match self.spells.get(key) {
            Some(spell) => spell.clone(),
            None => {
                warn!(key, "unknown spell key");
                SpellRef::unknown()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.spells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spells.is_empty()
    }
}

#[derive(Debug, Clone, Deserialize)]
struct TooltipEntry {
    name: String,
    #[serde(default, alias = "toolTip")]
    tooltip: Vec<String>,
}

/// Talent name (case-insensitive) to per-rank tooltip text.
#[derive(Debug, Clone, Default)]
pub struct TooltipRegistry {
    by_name: HashMap<String, Vec<String>>,
}

impl TooltipRegistry {
    pub fn new() -> Self {
        TooltipRegistry::default()
    }

    /// Load `[{"name": .., "toolTip": [..]}, ..]`. Entries without a name are skipped.
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let entries: Vec<TooltipEntry> = serde_json::from_str(json)?;
        let mut registry = TooltipRegistry::new();
        for entry in entries {
            registry.insert(&entry.name, entry.tooltip);
        }
        Ok(registry)
    }

    pub fn insert(&mut self, name: &str, ranks: Vec<String>) {
        let key = name.trim().to_lowercase();
        if key.is_empty() {
            return;
        }
        self.by_name.insert(key, ranks);
    }

    /// Tooltip for a talent at its current rank. Ranks past the list use the last entry.
    pub fn text(&self, name: &str, rank: u8) -> Option<&str> {
        let list = self.by_name.get(&name.trim().to_lowercase())?;
        let last = list.len().checked_sub(1)?;
        let text = list[usize::from(rank).min(last)].as_str();
        (!text.is_empty()).then_some(text)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_spell_degrades_to_unknown() {
        let registry = SpellRegistry::shaman();
        let known = registry.lookup("windfury_totem");
        assert_eq!(known.name, "Windfury Totem");
        assert!(known.icon.ends_with("/spell_nature_windfury.jpg"));

        let unknown = registry.lookup("totem_of_nothing");
        assert_eq!(unknown.name, "Unknown");
        assert!(unknown.icon.contains("inv_misc_questionmark"));
    }

    #[test]
    fn host_entries_override_bundled_ones() {
        let mut registry = SpellRegistry::shaman();
        let added = registry
            .extend_from_json(r#"{"windfury_totem":{"name":"WF","icon":"x.png"},"heroism":{"name":"Heroism","icon":"h.png"}}"#)
            .unwrap();
        assert_eq!(added, 2);
        assert_eq!(registry.lookup("windfury_totem").name, "WF");
        assert_eq!(registry.lookup("heroism").icon, "h.png");
        assert!(registry.extend_from_json("[1,2]").is_err());
    }

    #[test]
    fn tooltip_rank_index_is_clamped() {
        let registry = TooltipRegistry::from_json(
            r#"[{"name":"Flurry","toolTip":["r0","r1","r5"]},{"name":"","toolTip":["x"]},{"name":"Empty"}]"#,
        )
        .unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.text("flurry", 0), Some("r0"));
        assert_eq!(registry.text("FLURRY", 1), Some("r1"));
        assert_eq!(registry.text(" Flurry ", 9), Some("r5"));
        assert_eq!(registry.text("Empty", 0), None);
        assert_eq!(registry.text("Toughness", 0), None);
    }
}
