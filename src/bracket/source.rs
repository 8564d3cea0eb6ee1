use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

use super::matchup::Matchup;
use crate::types::AllianceId;

/// Stable address of a bracket position. Round numbers descend towards the
/// finals, which is always round 1. Groups are 1-indexed in order of play.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchupKey {
  pub round: u32,
  pub group: u32,
}

impl MatchupKey {
  pub const fn new(round: u32, group: u32) -> Self {
    MatchupKey { round, group }
  }

  pub const fn terminal() -> Self {
    MatchupKey::new(1, 1)
  }
}

impl fmt::Display for MatchupKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "R{}G{}", self.round, self.group)
  }
}

/// Where one side of a matchup gets its alliance from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AllianceSource {
  Seed {
    #[serde(rename = "allianceId")]
    alliance_id: AllianceId,
  },
  Derived {
    matchup: MatchupKey,
    #[serde(rename = "useWinner")]
    use_winner: bool,
  },
}

impl AllianceSource {
  pub const fn seed(alliance_id: AllianceId) -> Self {
    AllianceSource::Seed { alliance_id }
  }

  pub const fn winner_of(round: u32, group: u32) -> Self {
    AllianceSource::Derived { matchup: MatchupKey::new(round, group), use_winner: true }
  }

  pub const fn loser_of(round: u32, group: u32) -> Self {
    AllianceSource::Derived { matchup: MatchupKey::new(round, group), use_winner: false }
  }

  /// Resolves to the seeded id, or to the winner/loser of the referenced
  /// matchup. Yields 0 while that matchup is undecided.
  pub fn resolve(&self, matchups: &BTreeMap<MatchupKey, Matchup>) -> AllianceId {
    match *self {
      AllianceSource::Seed { alliance_id } => alliance_id,
      AllianceSource::Derived { matchup, use_winner } => match matchups.get(&matchup) {
        Some(source) if use_winner => source.winner(),
        Some(source) => source.loser(),
        None => 0,
      },
    }
  }
}

/// Non-owning link from a matchup to the matchup that feeds one of its sides.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceLink {
  pub display_name: String,
  pub use_winner: bool,
}

impl SourceLink {
  pub fn display_name(&self) -> String {
    let prefix = if self.use_winner { "W" } else { "L" };
    format!("{prefix} {}", self.display_name)
  }
}
