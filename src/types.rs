use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

use crate::bracket::BracketFormat;

// ── Constants ──────────────────────────────────────────────────────────

pub const TEAMS_PER_ALLIANCE: usize = 3;
pub const DEFAULT_MATCH_SPACING_SEC: u64 = 600;
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:17880";

// ── Identifiers ────────────────────────────────────────────────────────

/// Alliance ids are 1-based; 0 is the "not yet known" sentinel.
pub type AllianceId = u32;
pub type TeamId = u32;
pub type MatchId = u64;

// ── Alliances ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alliance {
    pub id: AllianceId,
    /// The three teams that take the field, in station order.
    pub lineup: [TeamId; TEAMS_PER_ALLIANCE],
}

// ── Match records ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchType {
    Practice,
    Qualification,
    Elimination,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchOutcome {
    #[default]
    NotPlayed,
    RedWon,
    BlueWon,
    Tie,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRecord {
    pub id: MatchId,
    pub match_type: MatchType,
    pub display_name: String,
    pub elim_round: u32,
    pub elim_group: u32,
    pub elim_instance: u32,
    pub elim_red_alliance: AllianceId,
    pub elim_blue_alliance: AllianceId,
    pub red: [TeamId; TEAMS_PER_ALLIANCE],
    pub blue: [TeamId; TEAMS_PER_ALLIANCE],
    pub scheduled_at_ms: u64,
    #[serde(default)]
    pub outcome: MatchOutcome,
}

impl MatchRecord {
    pub fn is_complete(&self) -> bool {
        self.outcome != MatchOutcome::NotPlayed
    }

    /// Game N of every series in a round is played before game N+1 of any of them.
    pub fn play_order_key(&self) -> (Reverse<u32>, u32, u32, MatchId) {
        (
            Reverse(self.elim_round),
            self.elim_instance,
            self.elim_group,
            self.id,
        )
    }
}

/// A match record that has not been assigned an id by the store yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMatchRecord {
    pub match_type: MatchType,
    pub display_name: String,
    pub elim_round: u32,
    pub elim_group: u32,
    pub elim_instance: u32,
    pub elim_red_alliance: AllianceId,
    pub elim_blue_alliance: AllianceId,
    pub red: [TeamId; TEAMS_PER_ALLIANCE],
    pub blue: [TeamId; TEAMS_PER_ALLIANCE],
    pub scheduled_at_ms: u64,
}

impl NewMatchRecord {
    pub fn into_record(self, id: MatchId) -> MatchRecord {
        MatchRecord {
            id,
            match_type: self.match_type,
            display_name: self.display_name,
            elim_round: self.elim_round,
            elim_group: self.elim_group,
            elim_instance: self.elim_instance,
            elim_red_alliance: self.elim_red_alliance,
            elim_blue_alliance: self.elim_blue_alliance,
            red: self.red,
            blue: self.blue,
            scheduled_at_ms: self.scheduled_at_ms,
            outcome: MatchOutcome::NotPlayed,
        }
    }
}

// ── App config ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub format: BracketFormat,
    pub alliance_count: u32,
    pub alliances: Vec<Alliance>,
    pub store_path: String,
    pub listen_addr: String,
    pub topology_path: String,
    pub static_dir: String,
    pub match_spacing_sec: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            format: BracketFormat::DoubleElimination,
            alliance_count: 8,
            alliances: Vec::new(),
            store_path: String::new(),
            listen_addr: String::new(),
            topology_path: String::new(),
            static_dir: String::new(),
            match_spacing_sec: DEFAULT_MATCH_SPACING_SEC,
        }
    }
}
