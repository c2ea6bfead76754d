// Talent build validation and the shareable build string.
// Tree data is resolved once into an index of nodes; a build is a rank vector
// addressed by `NodeIndex` in that index. Every add/remove re-validates the
// whole build before it is committed, so a build is never partially invalid.
//
// Build string: one digit per node, trees joined by '.', nodes ordered by
// (tier, column, name) within each tree.

use std::collections::HashMap;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use wasm_bindgen::prelude::*;

use crate::registry::TooltipRegistry;
use crate::talent_data::{self, Preset, PRESETS};
use crate::EngineError;

/// Points per tier needed to unlock the next one.
pub const POINTS_PER_TIER: u32 = 5;
pub const SHARE_PARAM: &str = "talents";
const MAX_DIGIT_RANK: u8 = 9;
const CLICK_TO_LEARN_ROW: &str = "<tr><td class='tooltip-green'>Click to learn</td></tr>";
const CANNOT_LEARN: &str = "Cannot learn this talent yet";
const ICON_ROOT: &str = "/assets/talents/Progression";

// =============================================================================
// Tree data
// =============================================================================

/// How far a prerequisite talent must be trained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PrerequisiteRule {
    /// The prerequisite must be at its max rank.
    #[default]
    MaxRank,
    /// Any point in the prerequisite is enough.
    AnyRank,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TalentDef {
    pub name: String,
    pub tier: u8,
    #[serde(alias = "max_rank")]
    pub max: u8,
    /// Pinned column. Conflicting pins fall back to a free column.
    #[serde(default)]
    pub col: Option<u8>,
    /// Prerequisite talent name in the same tree.
    #[serde(default)]
    pub req: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeDef {
    pub key: String,
    pub label: String,
    #[serde(default)]
    pub icon_dir: Option<String>,
    pub talents: Vec<TalentDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TalentData {
    #[serde(default = "default_total_points")]
    pub total_points: u32,
    #[serde(default = "default_tiers")]
    pub tiers: u8,
    #[serde(default = "default_cols")]
    pub cols: u8,
    #[serde(default)]
    pub prerequisite_rule: PrerequisiteRule,
    pub trees: Vec<TreeDef>,
}

fn default_total_points() -> u32 {
    61
}
fn default_tiers() -> u8 {
    9
}
fn default_cols() -> u8 {
    4
}

/// Id slug: lowercase, quotes dropped, other runs of non-alphanumerics become `_`.
pub fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut gap = false;
    for ch in name.chars().flat_map(char::to_lowercase) {
        if ch == '\'' || ch == '"' {
            continue;
        }
        if ch.is_ascii_alphanumeric() {
            if gap && !out.is_empty() {
                out.push('_');
            }
            out.push(ch);
            gap = false;
        } else {
            gap = true;
        }
    }
    out
}

/// Icon file stem: each alphanumeric word capitalized, then joined.
fn icon_stem(name: &str) -> String {
    name.replace('\'', "")
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => {
                    first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase()
                }
                None => String::new(),
            }
        })
        .collect()
}

/// Columns for one tier's talents, in definition order.
///
/// Talents are centered with a template by count ({2}, {2,3}, {1,2,3},
/// {1,2,3,4}). Pins are placed first; unpinned talents and losing pins take
/// the remaining template slots in order.
pub fn assign_columns(pins: &[Option<u8>], cols: u8) -> Vec<u8> {
    let template: &[u8] = match pins.len() {
        1 => &[2],
        2 => &[2, 3],
        3 => &[1, 2, 3],
        _ => &[1, 2, 3, 4],
    };

    let mut assigned = vec![0u8; pins.len()];
    let mut taken: Vec<u8> = Vec::new();
    let mut floaters = Vec::new();
    for (i, pin) in pins.iter().enumerate() {
        match pin.map(|col| col.clamp(1, cols.max(1))) {
            Some(col) if !taken.contains(&col) => {
                assigned[i] = col;
                taken.push(col);
            }
            _ => floaters.push(i),
        }
    }

    let mut free = template.iter().copied().filter(|col| !taken.contains(col));
    for (n, i) in floaters.into_iter().enumerate() {
        assigned[i] = free
            .next()
            .unwrap_or_else(|| u8::try_from(n + 1).unwrap_or(u8::MAX));
    }
    assigned
}

// =============================================================================
// Index
// =============================================================================

/// Position of a talent in its `TalentIndex`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeIndex(pub usize);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TalentNode {
    pub id: String,
    pub name: String,
    pub tree: usize,
    pub tier: u8,
    pub column: u8,
    pub max_rank: u8,
    pub prerequisite: Option<NodeIndex>,
    pub icon: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TreeInfo {
    pub key: String,
    pub label: String,
    nodes: Range<usize>,
}

impl TreeInfo {
    pub fn nodes(&self) -> impl Iterator<Item = NodeIndex> {
        self.nodes.clone().map(NodeIndex)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Resolved talent trees. Nodes of a tree are contiguous and already in
/// build-string order.
#[derive(Debug, Clone)]
pub struct TalentIndex {
    nodes: Vec<TalentNode>,
    trees: Vec<TreeInfo>,
    by_id: HashMap<String, NodeIndex>,
    total_points: u32,
    rule: PrerequisiteRule,
}

impl TalentIndex {
    pub fn new(data: &TalentData) -> Result<Self, EngineError> {
        let invalid = |msg: String| -> Result<Self, EngineError> {
            Err(EngineError::InvalidTalentData(msg))
        };
        if data.trees.is_empty() {
            return invalid("no talent trees".to_string());
        }
        if data.tiers == 0 || data.cols == 0 {
            return invalid(format!("grid must be non-empty, got {}x{}", data.tiers, data.cols));
        }

        let mut nodes: Vec<TalentNode> = Vec::new();
        let mut trees = Vec::with_capacity(data.trees.len());
        let mut by_id = HashMap::new();
        let mut pending_reqs: Vec<(usize, String)> = Vec::new();

        for (tree_idx, tree) in data.trees.iter().enumerate() {
            if tree.key.is_empty() {
                return invalid(format!("tree {} has no key", tree_idx + 1));
            }
            if trees.iter().any(|t: &TreeInfo| t.key == tree.key) {
                return invalid(format!("duplicate tree '{}'", tree.key));
            }
            for talent in &tree.talents {
                if talent.tier == 0 || talent.tier > data.tiers {
                    return invalid(format!(
                        "{}: tier {} outside 1..={}",
                        talent.name, talent.tier, data.tiers
                    ));
                }
                if talent.max == 0 || talent.max > MAX_DIGIT_RANK {
                    return invalid(format!(
                        "{}: max rank {} outside 1..={}",
                        talent.name, talent.max, MAX_DIGIT_RANK
                    ));
                }
            }

            let mut columns = vec![0u8; tree.talents.len()];
            for tier in 1..=data.tiers {
                let members: Vec<usize> = (0..tree.talents.len())
                    .filter(|&i| tree.talents[i].tier == tier)
                    .collect();
                let pins: Vec<Option<u8>> = members.iter().map(|&i| tree.talents[i].col).collect();
                for (&i, col) in members.iter().zip(assign_columns(&pins, data.cols)) {
                    columns[i] = col;
                }
            }

            let mut order: Vec<usize> = (0..tree.talents.len()).collect();
            order.sort_by(|&a, &b| {
                let (ta, tb) = (&tree.talents[a], &tree.talents[b]);
                (ta.tier, columns[a], &ta.name).cmp(&(tb.tier, columns[b], &tb.name))
            });

            let start = nodes.len();
            for i in order {
                let talent = &tree.talents[i];
                let id = format!("{}_{}", tree.key, slug(&talent.name));
                if by_id.insert(id.clone(), NodeIndex(nodes.len())).is_some() {
                    return invalid(format!("duplicate talent id '{id}'"));
                }
                if let Some(req) = &talent.req {
                    pending_reqs.push((nodes.len(), req.clone()));
                }
                nodes.push(TalentNode {
                    id,
                    name: talent.name.clone(),
                    tree: tree_idx,
                    tier: talent.tier,
                    column: columns[i],
                    max_rank: talent.max,
                    prerequisite: None,
                    icon: tree.icon_dir.as_ref().and_then(|dir| {
                        let stem = icon_stem(&talent.name);
                        (!stem.is_empty()).then(|| format!("{ICON_ROOT}/{dir}/{stem}.jpg"))
                    }),
                });
            }
            trees.push(TreeInfo {
                key: tree.key.clone(),
                label: tree.label.clone(),
                nodes: start..nodes.len(),
            });
        }

        for (at, req) in pending_reqs {
            let found = trees[nodes[at].tree]
                .nodes
                .clone()
                .find(|&i| nodes[i].name == req);
            match found {
                Some(i) if i == at => {
                    return invalid(format!("{} requires itself", nodes[at].name));
                }
                Some(i) => nodes[at].prerequisite = Some(NodeIndex(i)),
                None => {
                    return invalid(format!(
                        "{}: unknown prerequisite '{}'",
                        nodes[at].name, req
                    ));
                }
            }
        }

        debug!(
            trees = trees.len(),
            nodes = nodes.len(),
            "talent index built"
        );
        Ok(TalentIndex {
            nodes,
            trees,
            by_id,
            total_points: data.total_points,
            rule: data.prerequisite_rule,
        })
    }

    /// Bundled Shaman trees.
    pub fn shaman() -> Result<Self, EngineError> {
        TalentIndex::new(&talent_data::shaman_talent_data())
    }

    pub fn nodes(&self) -> &[TalentNode] {
        &self.nodes
    }

    pub fn node(&self, node: NodeIndex) -> Option<&TalentNode> {
        self.nodes.get(node.0)
    }

    pub fn trees(&self) -> &[TreeInfo] {
        &self.trees
    }

    pub fn find(&self, id: &str) -> Option<NodeIndex> {
        self.by_id.get(id).copied()
    }

    /// Like `find`, but unknown ids are an error.
    pub fn resolve(&self, id: &str) -> Result<NodeIndex, EngineError> {
        self.find(id)
            .ok_or_else(|| EngineError::UnknownTalent(id.to_string()))
    }

    pub fn point_cap(&self) -> u32 {
        self.total_points
    }

    pub fn prerequisite_rule(&self) -> PrerequisiteRule {
        self.rule
    }

    pub fn empty_build(&self) -> TalentBuild {
        TalentBuild {
            ranks: vec![0; self.nodes.len()],
        }
    }

    /// Build from `(id, rank)` pairs. Not validated.
    pub fn build_from_ranks(&self, ranks: &[(&str, u8)]) -> Result<TalentBuild, EngineError> {
        let mut build = self.empty_build();
        for &(id, rank) in ranks {
            let node = self.resolve(id)?;
            build.ranks[node.0] = rank;
        }
        Ok(build)
    }

    // -------------------------------------------------------------------------
    // Point sums
    // -------------------------------------------------------------------------

    pub fn total_points(&self, build: &TalentBuild) -> u32 {
        build.points()
    }

    pub fn tree_points(&self, build: &TalentBuild, tree: usize) -> u32 {
        self.trees.get(tree).map_or(0, |info| {
            info.nodes().map(|node| u32::from(build.rank(node))).sum()
        })
    }

    fn points_before_tier(&self, build: &TalentBuild, tree: usize, tier: u8) -> u32 {
        self.trees.get(tree).map_or(0, |info| {
            info.nodes()
                .filter(|node| self.nodes[node.0].tier < tier)
                .map(|node| u32::from(build.rank(node)))
                .sum()
        })
    }

    fn tier_threshold(tier: u8) -> u32 {
        u32::from(tier.saturating_sub(1)) * POINTS_PER_TIER
    }

    fn tier_unlocked(&self, build: &TalentBuild, node: &TalentNode) -> bool {
        self.points_before_tier(build, node.tree, node.tier) >= Self::tier_threshold(node.tier)
    }

    fn required_prerequisite_rank(&self, prerequisite: &TalentNode) -> u8 {
        match self.rule {
            PrerequisiteRule::MaxRank => prerequisite.max_rank,
            PrerequisiteRule::AnyRank => 1,
        }
    }

    fn prerequisite_met(&self, build: &TalentBuild, node: &TalentNode) -> bool {
        match node.prerequisite {
            Some(req) => build.rank(req) >= self.required_prerequisite_rank(&self.nodes[req.0]),
            None => true,
        }
    }

    // -------------------------------------------------------------------------
    // Validation
    // -------------------------------------------------------------------------

    fn fits(&self, build: &TalentBuild) -> bool {
        build.ranks.len() == self.nodes.len()
    }

    /// Why one trained node is invalid in `build`, if it is.
    pub(crate) fn node_violation(&self, build: &TalentBuild, at: NodeIndex) -> Option<String> {
        let node = self.node(at)?;
        let rank = build.rank(at);
        if rank == 0 {
            return None;
        }
        if rank > node.max_rank {
            return Some(format!(
                "{}: rank {} exceeds max {}",
                node.name, rank, node.max_rank
            ));
        }
        if !self.tier_unlocked(build, node) {
            return Some(format!(
                "{}: requires {} points in previous tiers of {} Talents",
                node.name,
                Self::tier_threshold(node.tier),
                self.trees[node.tree].label
            ));
        }
        if !self.prerequisite_met(build, node) {
            let req = node.prerequisite.map(|req| &self.nodes[req.0])?;
            return Some(format!(
                "{}: requires {} in {}",
                node.name,
                points_label(self.required_prerequisite_rank(req)),
                req.name
            ));
        }
        None
    }

    /// First rule `build` breaks, or `None` if it is valid.
    pub fn first_violation(&self, build: &TalentBuild) -> Option<String> {
        if !self.fits(build) {
            return Some(format!(
                "build has {} ranks, expected {}",
                build.ranks.len(),
                self.nodes.len()
            ));
        }
        let total = build.points();
        if total > self.total_points {
            return Some(format!(
                "{total} points spent, cap is {}",
                self.total_points
            ));
        }
        (0..self.nodes.len()).find_map(|i| self.node_violation(build, NodeIndex(i)))
    }

    pub fn validate(&self, build: &TalentBuild) -> bool {
        self.first_violation(build).is_none()
    }

    pub fn can_add_point(&self, build: &TalentBuild, at: NodeIndex) -> bool {
        let Some(node) = self.node(at) else {
            return false;
        };
        self.fits(build)
            && build.rank(at) < node.max_rank
            && build.points() < self.total_points
            && self.tier_unlocked(build, node)
            && self.prerequisite_met(build, node)
    }

    pub fn can_remove_point(&self, build: &TalentBuild, at: NodeIndex) -> bool {
        self.remove_point(build, at).is_some()
    }

    /// `build` with one more point in `at`, if that is allowed and the whole
    /// result stays valid.
    pub fn add_point(&self, build: &TalentBuild, at: NodeIndex) -> Option<TalentBuild> {
        if !self.can_add_point(build, at) {
            return None;
        }
        let next = build.with_rank(at, build.rank(at) + 1);
        self.validate(&next).then_some(next)
    }

    /// `build` with one point less in `at`, if the result stays valid.
    pub fn remove_point(&self, build: &TalentBuild, at: NodeIndex) -> Option<TalentBuild> {
        let rank = build.rank(at);
        if rank == 0 || !self.fits(build) || self.node(at).is_none() {
            return None;
        }
        let next = build.with_rank(at, rank - 1);
        self.validate(&next).then_some(next)
    }

    /// Reasons a point cannot be added, worded for the tooltip.
    pub fn cannot_add_reasons(&self, build: &TalentBuild, at: NodeIndex) -> Vec<String> {
        let Some(node) = self.node(at) else {
            return Vec::new();
        };
        if build.rank(at) >= node.max_rank {
            return vec!["Already at max rank".to_string()];
        }

        let mut reasons = Vec::new();
        if build.points() >= self.total_points {
            reasons.push("No talent points remaining".to_string());
        }
        let needed = Self::tier_threshold(node.tier);
        if self.points_before_tier(build, node.tree, node.tier) < needed {
            reasons.push(format!(
                "Requires {needed} points in previous tiers of {} Talents",
                self.trees[node.tree].label
            ));
        }
        if let Some(req) = node.prerequisite {
            let req_node = &self.nodes[req.0];
            let needed = self.required_prerequisite_rank(req_node);
            if build.rank(req) < needed {
                reasons.push(format!(
                    "Requires {} in {}",
                    points_label(needed),
                    req_node.name
                ));
            }
        }
        reasons
    }

    // -------------------------------------------------------------------------
    // Build string
    // -------------------------------------------------------------------------

    pub fn serialize(&self, build: &TalentBuild) -> String {
        self.trees
            .iter()
            .map(|tree| {
                tree.nodes()
                    .map(|node| char::from(b'0' + build.rank(node).min(MAX_DIGIT_RANK)))
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Decode a build string. `None` on any malformed or invalid input.
    pub fn deserialize(&self, encoded: &str) -> Option<TalentBuild> {
        self.try_deserialize(encoded).ok()
    }

    /// Decode a build string, reporting why it was rejected.
    pub fn try_deserialize(&self, encoded: &str) -> Result<TalentBuild, EngineError> {
        let reject = |msg: String| -> Result<TalentBuild, EngineError> {
            Err(EngineError::InvalidBuild(msg))
        };
        let segments: Vec<&str> = encoded.split('.').collect();
        if segments.len() != self.trees.len() {
            return reject(format!(
                "expected {} segments, found {}",
                self.trees.len(),
                segments.len()
            ));
        }

        let mut build = self.empty_build();
        for (tree, segment) in self.trees.iter().zip(segments) {
            let digits = segment.chars().count();
            if digits != tree.len() {
                return reject(format!(
                    "{}: expected {} digits, found {}",
                    tree.label,
                    tree.len(),
                    digits
                ));
            }
            for (node, ch) in tree.nodes().zip(segment.chars()) {
                let Some(rank) = ch.to_digit(10).and_then(|d| u8::try_from(d).ok()) else {
                    return reject(format!("{}: '{}' is not a digit", tree.label, ch));
                };
                let talent = &self.nodes[node.0];
                if rank > talent.max_rank {
                    return reject(format!(
                        "{}: rank {} exceeds max {}",
                        talent.name, rank, talent.max_rank
                    ));
                }
                build.ranks[node.0] = rank;
            }
        }

        match self.first_violation(&build) {
            Some(violation) => reject(violation),
            None => Ok(build),
        }
    }

    /// Preset build, or `current` when the preset does not validate.
    pub fn apply_preset(&self, preset: &Preset, current: &TalentBuild) -> TalentBuild {
        let candidate = match self.build_from_ranks(preset.ranks) {
            Ok(build) => build,
            Err(err) => {
                warn!(preset = preset.key, %err, "preset ignored");
                return current.clone();
            }
        };
        match self.first_violation(&candidate) {
            None => candidate,
            Some(violation) => {
                warn!(preset = preset.key, %violation, "preset ignored");
                current.clone()
            }
        }
    }
}

fn points_label(points: u8) -> String {
    if points == 1 {
        "1 point".to_string()
    } else {
        format!("{points} points")
    }
}

// =============================================================================
// Build
// =============================================================================

/// Ranks per node, addressed by `NodeIndex`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TalentBuild {
    ranks: Vec<u8>,
}

impl TalentBuild {
    pub fn rank(&self, node: NodeIndex) -> u8 {
        self.ranks.get(node.0).copied().unwrap_or(0)
    }

    pub fn ranks(&self) -> &[u8] {
        &self.ranks
    }

    pub fn points(&self) -> u32 {
        self.ranks.iter().map(|&rank| u32::from(rank)).sum()
    }

    fn with_rank(&self, node: NodeIndex, rank: u8) -> TalentBuild {
        let mut next = self.clone();
        if let Some(slot) = next.ranks.get_mut(node.0) {
            *slot = rank;
        }
        next
    }
}

// =============================================================================
// Planner
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct TalentNodeView {
    pub id: String,
    pub name: String,
    pub tier: u8,
    pub column: u8,
    pub rank: u8,
    pub max_rank: u8,
    pub icon: Option<String>,
    pub prerequisite: Option<String>,
    /// Prerequisite trained far enough and tier unlocked.
    pub prerequisite_ready: bool,
    pub locked: bool,
    pub spent: bool,
    pub full: bool,
    pub capped: bool,
    pub can_add: bool,
    pub can_remove: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TalentTreeView {
    pub key: String,
    pub label: String,
    pub points: u32,
    pub nodes: Vec<TalentNodeView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SelectedTalent {
    pub id: String,
    pub name: String,
    pub meta: String,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PresetView {
    pub key: &'static str,
    pub label: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct TalentPlannerState {
    pub build: String,
    pub share_param: String,
    pub total_points: u32,
    pub point_cap: u32,
    pub totals_label: String,
    pub trees: Vec<TalentTreeView>,
    pub selected: Option<SelectedTalent>,
    pub presets: Vec<PresetView>,
}

/// An index plus the build being edited.
#[derive(Debug, Clone)]
pub struct TalentPlanner {
    index: TalentIndex,
    build: TalentBuild,
    selected: Option<NodeIndex>,
}

impl TalentPlanner {
    pub fn new(index: TalentIndex) -> Self {
        let build = index.empty_build();
        TalentPlanner {
            index,
            build,
            selected: None,
        }
    }

    /// Start from a shared build string (`talents` value, with or without
    /// the `talents=` prefix). Anything that fails to decode starts empty.
    pub fn from_share_param(index: TalentIndex, raw: Option<&str>) -> Self {
        let mut planner = TalentPlanner::new(index);
        let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
            return planner;
        };
        let value = raw
            .strip_prefix(SHARE_PARAM)
            .and_then(|rest| rest.strip_prefix('='))
            .unwrap_or(raw);
        match planner.index.try_deserialize(value) {
            Ok(build) => planner.build = build,
            Err(err) => warn!(%err, "shared build ignored"),
        }
        planner
    }

    pub fn index(&self) -> &TalentIndex {
        &self.index
    }

    pub fn build(&self) -> &TalentBuild {
        &self.build
    }

    pub fn total_points(&self) -> u32 {
        self.build.points()
    }

    pub fn serialize(&self) -> String {
        self.index.serialize(&self.build)
    }

    /// `talents=<build>` for the page URL.
    pub fn share_param(&self) -> String {
        format!("{SHARE_PARAM}={}", self.serialize())
    }

    pub fn rank(&self, id: &str) -> Result<u8, EngineError> {
        Ok(self.build.rank(self.index.resolve(id)?))
    }

    pub fn add_point(&mut self, id: &str) -> Result<bool, EngineError> {
        let node = self.index.resolve(id)?;
        match self.index.add_point(&self.build, node) {
            Some(next) => {
                self.build = next;
                debug!(id, rank = self.build.rank(node), "talent point added");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn remove_point(&mut self, id: &str) -> Result<bool, EngineError> {
        let node = self.index.resolve(id)?;
        match self.index.remove_point(&self.build, node) {
            Some(next) => {
                self.build = next;
                debug!(id, rank = self.build.rank(node), "talent point removed");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn can_add_point(&self, id: &str) -> Result<bool, EngineError> {
        let node = self.index.resolve(id)?;
        Ok(self.index.can_add_point(&self.build, node))
    }

    pub fn can_remove_point(&self, id: &str) -> Result<bool, EngineError> {
        let node = self.index.resolve(id)?;
        Ok(self.index.can_remove_point(&self.build, node))
    }

    pub fn cannot_add_reasons(&self, id: &str) -> Result<Vec<String>, EngineError> {
        let node = self.index.resolve(id)?;
        Ok(self.index.cannot_add_reasons(&self.build, node))
    }

    /// Apply a bundled preset by key. Returns whether the key exists; an
    /// invalid preset leaves the build as it was.
    pub fn apply_preset(&mut self, key: &str) -> bool {
        match talent_data::preset(key) {
            Some(preset) => {
                self.build = self.index.apply_preset(preset, &self.build);
                true
            }
            None => {
                warn!(key, "unknown preset");
                false
            }
        }
    }

    pub fn select(&mut self, id: Option<&str>) -> Result<(), EngineError> {
        self.selected = id.map(|id| self.index.resolve(id)).transpose()?;
        Ok(())
    }

    pub fn reset(&mut self) {
        self.build = self.index.empty_build();
        self.selected = None;
    }

    /// Tooltip for the talent at its current rank. When no point can be
    /// added, the "Click to learn" row is replaced by the reasons why.
    pub fn tooltip(
        &self,
        id: &str,
        tooltips: &TooltipRegistry,
    ) -> Result<Option<String>, EngineError> {
        let at = self.index.resolve(id)?;
        let node = &self.index.nodes[at.0];
        let Some(text) = tooltips.text(&node.name, self.build.rank(at)) else {
            return Ok(None);
        };
        if !text.contains("Click to learn") || self.index.can_add_point(&self.build, at) {
            return Ok(Some(text.to_string()));
        }

        let mut reasons = self.index.cannot_add_reasons(&self.build, at);
        if reasons.is_empty() {
            reasons.push(CANNOT_LEARN.to_string());
        }
        let rows: String = reasons
            .iter()
            .map(|reason| format!("<tr><td class='tooltip-red'>{reason}</td></tr>"))
            .collect();
        Ok(Some(text.replace(CLICK_TO_LEARN_ROW, &rows)))
    }

    pub fn state(&self) -> TalentPlannerState {
        let index = &self.index;
        let build = &self.build;
        let total = build.points();
        let at_cap = total >= index.total_points;

        let trees = index
            .trees
            .iter()
            .enumerate()
            .map(|(tree_idx, tree)| TalentTreeView {
                key: tree.key.clone(),
                label: tree.label.clone(),
                points: index.tree_points(build, tree_idx),
                nodes: tree
                    .nodes()
                    .map(|at| {
                        let node = &index.nodes[at.0];
                        let rank = build.rank(at);
                        let unlocked = index.tier_unlocked(build, node);
                        let prereq_met = index.prerequisite_met(build, node);
                        let can_add = index.can_add_point(build, at);
                        TalentNodeView {
                            id: node.id.clone(),
                            name: node.name.clone(),
                            tier: node.tier,
                            column: node.column,
                            rank,
                            max_rank: node.max_rank,
                            icon: node.icon.clone(),
                            prerequisite: node.prerequisite.map(|req| index.nodes[req.0].id.clone()),
                            prerequisite_ready: node.prerequisite.is_some() && prereq_met && unlocked,
                            locked: rank == 0 && !(unlocked && prereq_met),
                            spent: rank > 0,
                            full: rank >= node.max_rank,
                            capped: at_cap && rank == 0,
                            can_add,
                            can_remove: index.can_remove_point(build, at),
                        }
                    })
                    .collect(),
            })
            .collect();

        let selected = self.selected.and_then(|at| {
            let node = index.node(at)?;
            Some(SelectedTalent {
                id: node.id.clone(),
                name: node.name.clone(),
                meta: format!(
                    "{} tier {}  Rank {} of {}",
                    index.trees[node.tree].label,
                    node.tier,
                    build.rank(at),
                    node.max_rank
                ),
                reasons: index.cannot_add_reasons(build, at),
            })
        });

        TalentPlannerState {
            build: self.serialize(),
            share_param: self.share_param(),
            total_points: total,
            point_cap: index.total_points,
            totals_label: format!("{total} of {}", index.total_points),
            trees,
            selected,
            presets: PRESETS
                .iter()
                .map(|preset| PresetView {
                    key: preset.key,
                    label: preset.label,
                })
                .collect(),
        }
    }
}

// =============================================================================
// WASM Bindings
// =============================================================================

/// Talent planner handle for JavaScript.
#[wasm_bindgen]
pub struct TalentLab {
    planner: Option<TalentPlanner>,
    tooltips: TooltipRegistry,
}

impl TalentLab {
    fn planner(&self) -> Result<&TalentPlanner, EngineError> {
        self.planner
            .as_ref()
            .ok_or_else(|| EngineError::InvalidConfig("talent lab is unmounted".to_string()))
    }

    fn planner_mut(&mut self) -> Result<&mut TalentPlanner, EngineError> {
        self.planner
            .as_mut()
            .ok_or_else(|| EngineError::InvalidConfig("talent lab is unmounted".to_string()))
    }
}

#[wasm_bindgen]
impl TalentLab {
    /// Mount with the bundled Shaman trees and the page's `talents` value.
    #[wasm_bindgen(constructor)]
    pub fn new(share_param: Option<String>) -> Result<TalentLab, JsValue> {
        let index = TalentIndex::shaman()?;
        Ok(TalentLab {
            planner: Some(TalentPlanner::from_share_param(index, share_param.as_deref())),
            tooltips: TooltipRegistry::new(),
        })
    }

    /// Mount with host-supplied tree data (JSON `TalentData`).
    pub fn with_data(data_json: &str, share_param: Option<String>) -> Result<TalentLab, JsValue> {
        let data: TalentData = serde_json::from_str(data_json)
            .map_err(|e| EngineError::InvalidTalentData(e.to_string()))?;
        let index = TalentIndex::new(&data)?;
        Ok(TalentLab {
            planner: Some(TalentPlanner::from_share_param(index, share_param.as_deref())),
            tooltips: TooltipRegistry::new(),
        })
    }

    /// Load tooltip text (`[{"name": .., "toolTip": [..]}]`).
    pub fn load_tooltips(&mut self, json: &str) -> Result<usize, JsValue> {
        self.tooltips = TooltipRegistry::from_json(json)?;
        Ok(self.tooltips.len())
    }

    pub fn add_point(&mut self, id: &str) -> Result<bool, JsValue> {
        Ok(self.planner_mut()?.add_point(id)?)
    }

    pub fn remove_point(&mut self, id: &str) -> Result<bool, JsValue> {
        Ok(self.planner_mut()?.remove_point(id)?)
    }

    pub fn apply_preset(&mut self, key: &str) -> bool {
        self.planner
            .as_mut()
            .map_or(false, |planner| planner.apply_preset(key))
    }

    pub fn select(&mut self, id: Option<String>) -> Result<(), JsValue> {
        Ok(self.planner_mut()?.select(id.as_deref())?)
    }

    pub fn reset(&mut self) {
        if let Some(planner) = self.planner.as_mut() {
            planner.reset();
        }
    }

    /// Current build string. Write it back to the URL after each change.
    pub fn build_string(&self) -> Result<String, JsValue> {
        Ok(self.planner()?.serialize())
    }

    pub fn share_param(&self) -> Result<String, JsValue> {
        Ok(self.planner()?.share_param())
    }

    pub fn tooltip(&self, id: &str) -> Result<Option<String>, JsValue> {
        Ok(self.planner()?.tooltip(id, &self.tooltips)?)
    }

    pub fn state_json(&self) -> Result<String, JsValue> {
        let state = self.planner()?.state();
        serde_json::to_string(&state).map_err(|e| EngineError::from(e).into())
    }

    pub fn unmount(&mut self) {
        if self.planner.take().is_some() {
            debug!("talent lab unmounted");
        }
    }
}
