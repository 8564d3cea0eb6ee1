//! Static matchup tables per (format, alliance count).

use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use super::matchup::MatchupTemplate;
use super::source::{AllianceSource, MatchupKey};
use crate::error::{BracketError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BracketFormat {
  SingleElimination,
  DoubleElimination,
}

/// A complete bracket layout. Built-in tables cover the common sizes; other
/// layouts can be supplied as JSON.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopologyTable {
  pub format: BracketFormat,
  pub alliance_count: u32,
  pub matchups: Vec<MatchupTemplate>,
}

impl TopologyTable {
  pub fn builtin(format: BracketFormat, alliance_count: u32) -> Result<Self> {
    let matchups = match format {
      BracketFormat::DoubleElimination => double_elimination_templates(alliance_count)?,
      BracketFormat::SingleElimination => single_elimination_templates(alliance_count)?,
    };
    Ok(TopologyTable { format, alliance_count, matchups })
  }

  pub fn load_from(path: &Path) -> Result<Self> {
    let data = fs::read_to_string(path)
      .map_err(|e| BracketError::Configuration(format!("read topology {}: {e}", path.display())))?;
    serde_json::from_str::<TopologyTable>(&data)
      .map_err(|e| BracketError::Configuration(format!("parse topology {}: {e}", path.display())))
  }
}

fn key(round: u32, group: u32) -> MatchupKey {
  MatchupKey::new(round, group)
}

fn seed(alliance_id: u32) -> AllianceSource {
  AllianceSource::seed(alliance_id)
}

fn winner(round: u32, group: u32) -> AllianceSource {
  AllianceSource::winner_of(round, group)
}

fn loser(round: u32, group: u32) -> AllianceSource {
  AllianceSource::loser_of(round, group)
}

/// Eight-alliance double elimination. Rounds 6 and 5 feed the upper bracket
/// (round 5 groups 3-4) and the lower bracket (round 5 groups 1-2).
fn double_elimination_templates(alliance_count: u32) -> Result<Vec<MatchupTemplate>> {
  if alliance_count != 8 {
    return Err(BracketError::Configuration("Must have exactly 8 alliances".to_string()));
  }
  Ok(vec![
    MatchupTemplate::new(key(6, 1), "1", 1, seed(1), seed(8)),
    MatchupTemplate::new(key(6, 2), "2", 1, seed(4), seed(5)),
    MatchupTemplate::new(key(6, 3), "3", 1, seed(2), seed(7)),
    MatchupTemplate::new(key(6, 4), "4", 1, seed(3), seed(6)),
    MatchupTemplate::new(key(5, 1), "5", 1, loser(6, 1), loser(6, 2)),
    MatchupTemplate::new(key(5, 2), "6", 1, loser(6, 3), loser(6, 4)),
    MatchupTemplate::new(key(5, 3), "7", 1, winner(6, 1), winner(6, 2)),
    MatchupTemplate::new(key(5, 4), "8", 1, winner(6, 3), winner(6, 4)),
    MatchupTemplate::new(key(4, 1), "9", 1, loser(5, 3), winner(5, 2)),
    MatchupTemplate::new(key(4, 2), "10", 1, loser(5, 4), winner(5, 1)),
    MatchupTemplate::new(key(4, 3), "11", 1, winner(5, 3), winner(5, 4)),
    MatchupTemplate::new(key(3, 1), "12", 1, winner(4, 2), winner(4, 1)),
    MatchupTemplate::new(key(2, 1), "13", 1, loser(4, 3), winner(3, 1)),
    MatchupTemplate::new(key(1, 1), "F", 2, winner(4, 3), winner(2, 1)),
  ])
}

const MIN_SINGLE_ELIMINATION_ALLIANCES: u32 = 2;
const MAX_SINGLE_ELIMINATION_ALLIANCES: u32 = 16;

/// Best-of-three single elimination with standard cross-bracket seeding. When
/// the field is not a power of two, the top seeds get byes into the next round.
fn single_elimination_templates(alliance_count: u32) -> Result<Vec<MatchupTemplate>> {
  if !(MIN_SINGLE_ELIMINATION_ALLIANCES..=MAX_SINGLE_ELIMINATION_ALLIANCES).contains(&alliance_count) {
    return Err(BracketError::Configuration(format!(
      "Must have between {MIN_SINGLE_ELIMINATION_ALLIANCES} and {MAX_SINGLE_ELIMINATION_ALLIANCES} alliances"
    )));
  }
  let size = alliance_count.next_power_of_two();
  let mut lines: Vec<AllianceSource> = seed_positions(size).into_iter().map(seed).collect();
  let mut templates = Vec::new();
  for round in (1..=size.trailing_zeros()).rev() {
    let mut next = Vec::with_capacity(lines.len() / 2);
    for (idx, pair) in lines.chunks(2).enumerate() {
      let (red, blue) = (pair[0], pair[1]);
      if matches!(blue, AllianceSource::Seed { alliance_id } if alliance_id > alliance_count) {
        next.push(red);
        continue;
      }
      let group = idx as u32 + 1;
      templates.push(MatchupTemplate::new(key(round, group), &round_label(round, group), 2, red, blue));
      next.push(winner(round, group));
    }
    lines = next;
  }
  Ok(templates)
}

fn round_label(round: u32, group: u32) -> String {
  match round {
    1 => "F".to_string(),
    2 => format!("SF{group}"),
    3 => format!("QF{group}"),
    _ => format!("EF{group}"),
  }
}

/// Seeds in bracket-line order, e.g. 1, 8, 4, 5, 2, 7, 3, 6 for eight.
fn seed_positions(size: u32) -> Vec<u32> {
  let mut seeds = vec![1u32];
  while seeds.len() < size as usize {
    let n = seeds.len() as u32;
    let mut next = Vec::with_capacity(seeds.len() * 2);
    for seed in seeds.iter().copied() {
      next.push(seed);
      next.push((n * 2 + 1).saturating_sub(seed));
    }
    seeds = next;
  }
  seeds
}
