//! Playoff bracket: a graph of matchups linked by winner/loser references,
//! recomputed top-down from the finals after every recorded result.

mod matchup;
mod source;
mod topology;

pub use matchup::{Matchup, MatchupTemplate, Side};
pub use source::{AllianceSource, MatchupKey, SourceLink};
pub use topology::{BracketFormat, TopologyTable};

use serde::Serialize;
use std::{
  cmp::Reverse,
  collections::{BTreeMap, HashMap, HashSet},
};
use tracing::{debug, info};

use crate::error::{BracketError, Result};
use crate::store::MatchStore;
use crate::types::{AllianceId, DEFAULT_MATCH_SPACING_SEC};
use matchup::Schedule;

#[derive(Debug)]
pub struct Bracket {
  format: BracketFormat,
  matchups: BTreeMap<MatchupKey, Matchup>,
  terminal: MatchupKey,
  finalist_side: Option<Side>,
  match_spacing_ms: u64,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchupView {
  pub round: u32,
  pub group: u32,
  pub display_name: String,
  pub long_display_name: String,
  pub terminal: bool,
  pub red_source_display_name: String,
  pub blue_source_display_name: String,
  pub red_alliance_id: AllianceId,
  pub blue_alliance_id: AllianceId,
  pub red_wins: u32,
  pub blue_wins: u32,
  pub wins_required: u32,
  pub leader: Option<Side>,
  pub status: String,
  pub winner: AllianceId,
  pub loser: AllianceId,
  pub complete: bool,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BracketSnapshot {
  pub format: BracketFormat,
  pub matchups: Vec<MatchupView>,
  pub complete: bool,
  pub winner: AllianceId,
  pub finalist: AllianceId,
}

impl Bracket {
  pub fn new(format: BracketFormat, alliance_count: u32) -> Result<Self> {
    Bracket::from_table(TopologyTable::builtin(format, alliance_count)?)
  }

  pub fn new_double_elimination(alliance_count: u32) -> Result<Self> {
    Bracket::new(BracketFormat::DoubleElimination, alliance_count)
  }

  pub fn new_single_elimination(alliance_count: u32) -> Result<Self> {
    Bracket::new(BracketFormat::SingleElimination, alliance_count)
  }

  /// Links a table into a matchup graph and checks that a single top-down
  /// pass along winner links can refresh every matchup.
  pub fn from_table(table: TopologyTable) -> Result<Self> {
    let TopologyTable { format, alliance_count, matchups: templates } = table;
    if templates.is_empty() {
      return Err(config_error("Topology has no matchups".to_string()));
    }

    let mut by_key: HashMap<MatchupKey, &MatchupTemplate> = HashMap::new();
    for template in &templates {
      if template.wins_required == 0 {
        return Err(config_error(format!("Matchup {} must require at least one win", template.key)));
      }
      if by_key.insert(template.key, template).is_some() {
        return Err(config_error(format!("Duplicate matchup {}", template.key)));
      }
      for source in [template.red_source, template.blue_source] {
        match source {
          AllianceSource::Seed { alliance_id } => {
            if alliance_id == 0 || alliance_id > alliance_count {
              return Err(config_error(format!(
                "Matchup {} seeds alliance {alliance_id} outside 1..={alliance_count}",
                template.key
              )));
            }
          }
          AllianceSource::Derived { matchup, .. } if matchup == template.key => {
            return Err(config_error(format!("Matchup {} references itself", template.key)));
          }
          AllianceSource::Derived { .. } => {}
        }
      }
    }

    let terminal = MatchupKey::terminal();
    if !by_key.contains_key(&terminal) {
      return Err(config_error("Topology has no finals matchup at round 1 group 1".to_string()));
    }

    let mut matchups = BTreeMap::new();
    for template in &templates {
      let red_link = link_for(template.red_source, &by_key)?;
      let blue_link = link_for(template.blue_source, &by_key)?;
      let matchup = Matchup::new(template.clone(), red_link, blue_link, template.key == terminal);
      matchups.insert(template.key, matchup);
    }

    let order = traversal_order(&by_key, terminal)?;
    let finalist_side = match format {
      BracketFormat::DoubleElimination => Some(upper_bracket_side(&by_key, terminal)?),
      BracketFormat::SingleElimination => None,
    };

    debug!("linked {format:?} bracket with {} matchups, update order {order:?}", matchups.len());
    Ok(Bracket {
      format,
      matchups,
      terminal,
      finalist_side,
      match_spacing_ms: DEFAULT_MATCH_SPACING_SEC * 1000,
    })
  }

  pub fn with_match_spacing_ms(mut self, match_spacing_ms: u64) -> Self {
    self.match_spacing_ms = match_spacing_ms;
    self
  }

  pub fn format(&self) -> BracketFormat {
    self.format
  }

  /// Recomputes every matchup from the stored results, creating or deleting
  /// unplayed matches as needed. Safe to re-run after any failure.
  pub fn update<S: MatchStore + ?Sized>(&mut self, store: &mut S, start_time_ms: u64) -> Result<()> {
    let schedule = Schedule { start_time_ms, match_spacing_ms: self.match_spacing_ms };
    let was_complete = self.is_complete();
    matchup::update(&mut self.matchups, self.terminal, store, schedule)?;
    if self.is_complete() && !was_complete {
      info!("bracket complete: alliance {} wins, finalist {}", self.winner(), self.finalist());
    }
    Ok(())
  }

  pub fn is_complete(&self) -> bool {
    self.terminal_matchup().is_complete()
  }

  pub fn winner(&self) -> AllianceId {
    self.terminal_matchup().winner()
  }

  /// The alliance that reached the finals through the upper bracket (or, in
  /// single elimination, the losing finalist). 0 until the finals are decided.
  pub fn finalist(&self) -> AllianceId {
    let finals = self.terminal_matchup();
    if !finals.is_complete() {
      return 0;
    }
    match self.finalist_side {
      Some(Side::Red) => finals.red_alliance_id,
      Some(Side::Blue) => finals.blue_alliance_id,
      None => finals.loser(),
    }
  }

  pub fn matchup(&self, round: u32, group: u32) -> Result<&Matchup> {
    let key = MatchupKey::new(round, group);
    self.matchups.get(&key).ok_or(BracketError::NotFound(key))
  }

  pub fn terminal_matchup(&self) -> &Matchup {
    &self.matchups[&self.terminal]
  }

  /// Matchups in display order: earliest round first, then by group.
  pub fn matchups(&self) -> Vec<&Matchup> {
    let mut out: Vec<&Matchup> = self.matchups.values().collect();
    out.sort_by_key(|matchup| (Reverse(matchup.key().round), matchup.key().group));
    out
  }

  pub fn snapshot(&self) -> BracketSnapshot {
    let matchups = self.matchups().into_iter().map(matchup_view).collect();
    BracketSnapshot {
      format: self.format,
      matchups,
      complete: self.is_complete(),
      winner: self.winner(),
      finalist: self.finalist(),
    }
  }
}

fn config_error(message: String) -> BracketError {
  BracketError::Configuration(message)
}

fn matchup_view(matchup: &Matchup) -> MatchupView {
  let key = matchup.key();
  let (leader, status) = matchup.status_text();
  MatchupView {
    round: key.round,
    group: key.group,
    display_name: matchup.display_name().to_string(),
    long_display_name: matchup.long_display_name(),
    terminal: matchup.is_terminal(),
    red_source_display_name: matchup.red_source_display_name(),
    blue_source_display_name: matchup.blue_source_display_name(),
    red_alliance_id: matchup.red_alliance_id,
    blue_alliance_id: matchup.blue_alliance_id,
    red_wins: matchup.red_wins,
    blue_wins: matchup.blue_wins,
    wins_required: matchup.wins_required(),
    leader,
    status,
    winner: matchup.winner(),
    loser: matchup.loser(),
    complete: matchup.is_complete(),
  }
}

fn link_for(
  source: AllianceSource,
  by_key: &HashMap<MatchupKey, &MatchupTemplate>,
) -> Result<Option<SourceLink>> {
  let AllianceSource::Derived { matchup, use_winner } = source else {
    return Ok(None);
  };
  let target = by_key
    .get(&matchup)
    .ok_or_else(|| config_error(format!("Reference to missing matchup {matchup}")))?;
  Ok(Some(SourceLink {
    display_name: target.display_name.clone(),
    use_winner,
  }))
}

/// Order in which the recursive update finishes each matchup. Fails unless
/// winner links form a tree rooted at the finals covering every matchup, and
/// every loser link points at a matchup finished earlier.
fn traversal_order(
  by_key: &HashMap<MatchupKey, &MatchupTemplate>,
  terminal: MatchupKey,
) -> Result<Vec<MatchupKey>> {
  fn visit(
    key: MatchupKey,
    by_key: &HashMap<MatchupKey, &MatchupTemplate>,
    visited: &mut HashSet<MatchupKey>,
    order: &mut Vec<MatchupKey>,
  ) -> Result<()> {
    if !visited.insert(key) {
      return Err(config_error(format!("Matchup {key} is fed by more than one winner link")));
    }
    let template = by_key[&key];
    for source in [template.red_source, template.blue_source] {
      if let AllianceSource::Derived { matchup, use_winner: true } = source {
        visit(matchup, by_key, visited, order)?;
      }
    }
    order.push(key);
    Ok(())
  }

  let mut visited = HashSet::new();
  let mut order = Vec::with_capacity(by_key.len());
  visit(terminal, by_key, &mut visited, &mut order)?;

  if let Some(orphan) = by_key.keys().filter(|key| !visited.contains(key)).min() {
    return Err(config_error(format!("Matchup {orphan} is not reachable from the finals via winner links")));
  }

  let position: HashMap<MatchupKey, usize> = order.iter().enumerate().map(|(idx, key)| (*key, idx)).collect();
  for (idx, key) in order.iter().enumerate() {
    let template = by_key[key];
    for source in [template.red_source, template.blue_source] {
      if let AllianceSource::Derived { matchup, use_winner: false } = source {
        if position[&matchup] >= idx {
          return Err(config_error(format!(
            "Matchup {key} takes the loser of {matchup} before it has been decided"
          )));
        }
      }
    }
  }
  Ok(order)
}

/// The finals side whose lineage never passes through a loser link.
fn upper_bracket_side(by_key: &HashMap<MatchupKey, &MatchupTemplate>, terminal: MatchupKey) -> Result<Side> {
  fn undefeated(source: AllianceSource, by_key: &HashMap<MatchupKey, &MatchupTemplate>) -> bool {
    match source {
      AllianceSource::Seed { .. } => true,
      AllianceSource::Derived { use_winner: false, .. } => false,
      AllianceSource::Derived { matchup, use_winner: true } => {
        let template = by_key[&matchup];
        undefeated(template.red_source, by_key) && undefeated(template.blue_source, by_key)
      }
    }
  }

  let finals = by_key[&terminal];
  match (undefeated(finals.red_source, by_key), undefeated(finals.blue_source, by_key)) {
    (true, false) => Ok(Side::Red),
    (false, true) => Ok(Side::Blue),
    _ => Err(config_error(
      "Double-elimination finals need exactly one side fed by the upper bracket".to_string(),
    )),
  }
}
