//! A series of one or more matches between the same two alliances at one
//! position of a playoff bracket, and the recomputation pass that keeps its
//! persisted matches in line with upstream results.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::source::{AllianceSource, MatchupKey, SourceLink};
use crate::error::{BracketError, Result};
use crate::store::MatchStore;
use crate::types::{Alliance, AllianceId, MatchOutcome, MatchRecord, MatchType, NewMatchRecord};

/// Static definition of one bracket position.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchupTemplate {
  #[serde(flatten)]
  pub key: MatchupKey,
  pub display_name: String,
  pub wins_required: u32,
  pub red_source: AllianceSource,
  pub blue_source: AllianceSource,
}

impl MatchupTemplate {
  pub fn new(
    key: MatchupKey,
    display_name: &str,
    wins_required: u32,
    red_source: AllianceSource,
    blue_source: AllianceSource,
  ) -> Self {
    MatchupTemplate {
      key,
      display_name: display_name.to_string(),
      wins_required,
      red_source,
      blue_source,
    }
  }

  /// Label for one game of the series. Multi-game series are always
  /// suffixed; single-game series only once a replay is needed.
  pub fn match_display_name(&self, instance: u32) -> String {
    if self.wins_required > 1 || instance > 1 {
      format!("{}-{}", self.display_name, instance)
    } else {
      self.display_name.clone()
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
  Red,
  Blue,
}

/// Timing applied to matches created during one recomputation pass.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Schedule {
  pub start_time_ms: u64,
  pub match_spacing_ms: u64,
}

impl Schedule {
  fn time_for_instance(&self, instance: u32) -> u64 {
    let offset = u64::from(instance.saturating_sub(1)).saturating_mul(self.match_spacing_ms);
    self.start_time_ms.saturating_add(offset)
  }
}

#[derive(Clone, Debug)]
pub struct Matchup {
  template: MatchupTemplate,
  red_link: Option<SourceLink>,
  blue_link: Option<SourceLink>,
  is_terminal: bool,
  pub red_alliance_id: AllianceId,
  pub blue_alliance_id: AllianceId,
  pub red_wins: u32,
  pub blue_wins: u32,
}

impl Matchup {
  pub(crate) fn new(
    template: MatchupTemplate,
    red_link: Option<SourceLink>,
    blue_link: Option<SourceLink>,
    is_terminal: bool,
  ) -> Self {
    let red_alliance_id = match template.red_source {
      AllianceSource::Seed { alliance_id } => alliance_id,
      AllianceSource::Derived { .. } => 0,
    };
    let blue_alliance_id = match template.blue_source {
      AllianceSource::Seed { alliance_id } => alliance_id,
      AllianceSource::Derived { .. } => 0,
    };
    Matchup {
      template,
      red_link,
      blue_link,
      is_terminal,
      red_alliance_id,
      blue_alliance_id,
      red_wins: 0,
      blue_wins: 0,
    }
  }

  pub fn key(&self) -> MatchupKey {
    self.template.key
  }

  pub fn display_name(&self) -> &str {
    &self.template.display_name
  }

  pub fn wins_required(&self) -> u32 {
    self.template.wins_required
  }

  pub fn is_terminal(&self) -> bool {
    self.is_terminal
  }

  pub fn long_display_name(&self) -> String {
    if self.is_terminal {
      return "Finals".to_string();
    }
    if self.template.display_name.parse::<u32>().is_ok() {
      return format!("Match {}", self.template.display_name);
    }
    self.template.display_name.clone()
  }

  pub fn red_source_display_name(&self) -> String {
    self.red_link.as_ref().map(SourceLink::display_name).unwrap_or_default()
  }

  pub fn blue_source_display_name(&self) -> String {
    self.blue_link.as_ref().map(SourceLink::display_name).unwrap_or_default()
  }

  /// Leading side (if any) and a readable summary of the series.
  pub fn status_text(&self) -> (Option<Side>, String) {
    let win_text = if self.is_terminal { "Wins" } else { "Advances" };
    let required = self.template.wins_required;
    let (red, blue) = (self.red_wins, self.blue_wins);
    if red >= required {
      (Some(Side::Red), format!("Red {win_text} {red}-{blue}"))
    } else if blue >= required {
      (Some(Side::Blue), format!("Blue {win_text} {blue}-{red}"))
    } else if red > blue {
      (Some(Side::Red), format!("Red Leads {red}-{blue}"))
    } else if blue > red {
      (Some(Side::Blue), format!("Blue Leads {blue}-{red}"))
    } else if red > 0 {
      (None, format!("Series Tied {red}-{blue}"))
    } else {
      (None, String::new())
    }
  }

  pub fn winner(&self) -> AllianceId {
    if self.red_wins >= self.template.wins_required {
      return self.red_alliance_id;
    }
    if self.blue_wins >= self.template.wins_required {
      return self.blue_alliance_id;
    }
    0
  }

  pub fn loser(&self) -> AllianceId {
    if self.red_wins >= self.template.wins_required {
      return self.blue_alliance_id;
    }
    if self.blue_wins >= self.template.wins_required {
      return self.red_alliance_id;
    }
    0
  }

  pub fn is_complete(&self) -> bool {
    self.winner() != 0
  }

  /// Recounts the series from the stored matches and creates, rewrites or
  /// deletes unplayed matches so exactly the outstanding games exist.
  fn sync_matches<S: MatchStore + ?Sized>(&mut self, store: &mut S, schedule: Schedule) -> Result<()> {
    let key = self.template.key;
    let matches = store.matches_by_elim_round_group(key.round, key.group)?;

    if self.red_alliance_id == 0 || self.blue_alliance_id == 0 {
      // May have been populated before an upstream result was edited.
      self.red_wins = 0;
      self.blue_wins = 0;
      for record in &matches {
        store.delete_match(record.id)?;
        info!("deleted match {} ({}) from undetermined matchup {key}", record.display_name, record.id);
      }
      return Ok(());
    }

    let red_alliance = store
      .alliance_by_id(self.red_alliance_id)?
      .ok_or(BracketError::ReferenceIntegrity(self.red_alliance_id))?;
    let blue_alliance = store
      .alliance_by_id(self.blue_alliance_id)?
      .ok_or(BracketError::ReferenceIntegrity(self.blue_alliance_id))?;

    self.red_wins = 0;
    self.blue_wins = 0;
    let mut unplayed: Vec<MatchRecord> = Vec::new();
    for record in &matches {
      if !record.is_complete() {
        let mut record = record.clone();
        let mut changed = false;
        if record.red != red_alliance.lineup || record.elim_red_alliance != red_alliance.id {
          position_red_teams(&mut record, &red_alliance);
          changed = true;
        }
        if record.blue != blue_alliance.lineup || record.elim_blue_alliance != blue_alliance.id {
          position_blue_teams(&mut record, &blue_alliance);
          changed = true;
        }
        if changed {
          store.update_match(&record)?;
          debug!("reassigned alliances on match {}", record.display_name);
        }
        unplayed.push(record);
        continue;
      }

      match record.outcome {
        MatchOutcome::RedWon => self.red_wins += 1,
        MatchOutcome::BlueWon => self.blue_wins += 1,
        MatchOutcome::Tie | MatchOutcome::NotPlayed => {}
      }
    }

    let max_wins = self.red_wins.max(self.blue_wins);
    let needed = self.template.wins_required.saturating_sub(max_wins) as usize;
    debug!(
      "matchup {key}: {} vs {} at {}-{}, {} unplayed, {needed} needed",
      self.red_alliance_id,
      self.blue_alliance_id,
      self.red_wins,
      self.blue_wins,
      unplayed.len()
    );

    if unplayed.len() > needed {
      for record in unplayed[needed..].iter().rev() {
        store.delete_match(record.id)?;
        info!("deleted superfluous match {} ({})", record.display_name, record.id);
      }
    } else if unplayed.len() < needed {
      let last_instance = matches.iter().map(|record| record.elim_instance).max().unwrap_or(0);
      for offset in 1..=(needed - unplayed.len()) as u32 {
        let instance = last_instance + offset;
        let record = NewMatchRecord {
          match_type: MatchType::Elimination,
          display_name: self.template.match_display_name(instance),
          elim_round: key.round,
          elim_group: key.group,
          elim_instance: instance,
          elim_red_alliance: red_alliance.id,
          elim_blue_alliance: blue_alliance.id,
          red: red_alliance.lineup,
          blue: blue_alliance.lineup,
          scheduled_at_ms: schedule.time_for_instance(instance),
        };
        let label = record.display_name.clone();
        let id = store.create_match(record)?;
        info!("created match {label} ({id}): alliance {} vs {}", red_alliance.id, blue_alliance.id);
      }
    }

    Ok(())
  }
}

/// Refreshes the matchup at `key` and, first, every matchup feeding it a
/// winner. Loser links are not followed: the bracket guarantees their source
/// has already been refreshed earlier in the same pass.
pub(crate) fn update<S: MatchStore + ?Sized>(
  matchups: &mut BTreeMap<MatchupKey, Matchup>,
  key: MatchupKey,
  store: &mut S,
  schedule: Schedule,
) -> Result<()> {
  let (red_source, blue_source) = {
    let matchup = matchups.get(&key).ok_or(BracketError::NotFound(key))?;
    (matchup.template.red_source, matchup.template.blue_source)
  };

  for source in [red_source, blue_source] {
    if let AllianceSource::Derived { matchup, use_winner: true } = source {
      update(matchups, matchup, store, schedule)?;
    }
  }

  let red_alliance_id = red_source.resolve(matchups);
  let blue_alliance_id = blue_source.resolve(matchups);
  let matchup = matchups.get_mut(&key).ok_or(BracketError::NotFound(key))?;
  matchup.red_alliance_id = red_alliance_id;
  matchup.blue_alliance_id = blue_alliance_id;
  matchup.sync_matches(store, schedule)
}

fn position_red_teams(record: &mut MatchRecord, alliance: &Alliance) {
  record.red = alliance.lineup;
  record.elim_red_alliance = alliance.id;
}

fn position_blue_teams(record: &mut MatchRecord, alliance: &Alliance) {
  record.blue = alliance.lineup;
  record.elim_blue_alliance = alliance.id;
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::test_helpers::{create_test_alliances, elimination_matches, score_match};
  use crate::store::MemoryStore;

  const SCHEDULE: Schedule = Schedule { start_time_ms: 1_000, match_spacing_ms: 100 };

  fn single_matchup(wins_required: u32, red: AllianceId, blue: AllianceId) -> BTreeMap<MatchupKey, Matchup> {
    let template = MatchupTemplate::new(
      MatchupKey::terminal(),
      "F",
      wins_required,
      AllianceSource::seed(red),
      AllianceSource::seed(blue),
    );
    let mut matchups = BTreeMap::new();
    matchups.insert(MatchupKey::terminal(), Matchup::new(template, None, None, true));
    matchups
  }

  fn template_only(display_name: &str, wins_required: u32) -> MatchupTemplate {
    MatchupTemplate::new(
      MatchupKey::new(2, 1),
      display_name,
      wins_required,
      AllianceSource::seed(1),
      AllianceSource::seed(2),
    )
  }

  #[test]
  fn test_schedule_saturates_instead_of_overflowing() {
    let schedule = Schedule { start_time_ms: 1_000, match_spacing_ms: u64::MAX / 2 };
    assert_eq!(schedule.time_for_instance(1), 1_000);
    assert_eq!(schedule.time_for_instance(4), u64::MAX);
    let late_start = Schedule { start_time_ms: u64::MAX - 5, match_spacing_ms: 10 };
    assert_eq!(late_start.time_for_instance(2), u64::MAX);
  }

  #[test]
  fn test_match_display_name() {
    let best_of_one = template_only("3", 1);
    assert_eq!(best_of_one.match_display_name(1), "3");
    assert_eq!(best_of_one.match_display_name(2), "3-2");
    let best_of_three = template_only("F", 2);
    assert_eq!(best_of_three.match_display_name(1), "F-1");
    assert_eq!(best_of_three.match_display_name(4), "F-4");
  }

  #[test]
  fn test_long_display_name() {
    let numeric = Matchup::new(template_only("7", 1), None, None, false);
    assert_eq!(numeric.long_display_name(), "Match 7");
    let named = Matchup::new(template_only("SF2", 2), None, None, false);
    assert_eq!(named.long_display_name(), "SF2");
    let finals = Matchup::new(template_only("F", 2), None, None, true);
    assert_eq!(finals.long_display_name(), "Finals");
  }

  #[test]
  fn test_status_text() {
    let mut matchup = Matchup::new(template_only("SF1", 2), None, None, false);
    assert_eq!(matchup.status_text(), (None, String::new()));
    matchup.red_wins = 1;
    assert_eq!(matchup.status_text(), (Some(Side::Red), "Red Leads 1-0".to_string()));
    matchup.blue_wins = 1;
    assert_eq!(matchup.status_text(), (None, "Series Tied 1-1".to_string()));
    matchup.blue_wins = 2;
    assert_eq!(matchup.status_text(), (Some(Side::Blue), "Blue Advances 2-1".to_string()));

    let mut finals = Matchup::new(template_only("F", 2), None, None, true);
    finals.red_wins = 2;
    assert_eq!(finals.status_text(), (Some(Side::Red), "Red Wins 2-0".to_string()));
  }

  #[test]
  fn test_winner_and_loser_are_complements() {
    let mut matchup = Matchup::new(template_only("1", 1), None, None, false);
    assert_eq!((matchup.winner(), matchup.loser()), (0, 0));
    assert!(!matchup.is_complete());
    matchup.blue_wins = 1;
    assert_eq!((matchup.winner(), matchup.loser()), (2, 1));
    assert!(matchup.is_complete());
  }

  #[test]
  fn test_update_creates_outstanding_games() {
    let mut store = MemoryStore::default();
    create_test_alliances(&mut store, 2);
    let mut matchups = single_matchup(2, 1, 2);
    update(&mut matchups, MatchupKey::terminal(), &mut store, SCHEDULE).unwrap();

    let matches = elimination_matches(&store);
    assert_eq!(matches.len(), 2);
    assert_eq!(matches[0].display_name, "F-1");
    assert_eq!(matches[0].red, [101, 102, 103]);
    assert_eq!(matches[0].blue, [201, 202, 203]);
    assert_eq!(matches[0].scheduled_at_ms, 1_000);
    assert_eq!(matches[1].display_name, "F-2");
    assert_eq!(matches[1].scheduled_at_ms, 1_100);
  }

  #[test]
  fn test_update_removes_games_once_decided() {
    let mut store = MemoryStore::default();
    create_test_alliances(&mut store, 2);
    let mut matchups = single_matchup(3, 1, 2);
    update(&mut matchups, MatchupKey::terminal(), &mut store, SCHEDULE).unwrap();
    assert_eq!(elimination_matches(&store).len(), 3);

    score_match(&mut store, "F-1", MatchOutcome::RedWon);
    score_match(&mut store, "F-2", MatchOutcome::RedWon);
    update(&mut matchups, MatchupKey::terminal(), &mut store, SCHEDULE).unwrap();
    let matchup = &matchups[&MatchupKey::terminal()];
    assert_eq!((matchup.red_wins, matchup.blue_wins), (2, 0));
    assert_eq!(elimination_matches(&store).len(), 3);

    score_match(&mut store, "F-3", MatchOutcome::RedWon);
    update(&mut matchups, MatchupKey::terminal(), &mut store, SCHEDULE).unwrap();
    let matchup = &matchups[&MatchupKey::terminal()];
    assert!(matchup.is_complete());
    assert_eq!(matchup.winner(), 1);
    assert_eq!(elimination_matches(&store).len(), 3);
  }

  #[test]
  fn test_update_trims_excess_from_highest_instance() {
    let mut store = MemoryStore::default();
    create_test_alliances(&mut store, 2);
    let mut matchups = single_matchup(3, 1, 2);
    update(&mut matchups, MatchupKey::terminal(), &mut store, SCHEDULE).unwrap();
    score_match(&mut store, "F-1", MatchOutcome::BlueWon);
    score_match(&mut store, "F-2", MatchOutcome::BlueWon);
    score_match(&mut store, "F-3", MatchOutcome::BlueWon);

    // Editing the third result to a tie forces a fourth game.
    score_match(&mut store, "F-3", MatchOutcome::Tie);
    update(&mut matchups, MatchupKey::terminal(), &mut store, SCHEDULE).unwrap();
    let labels: Vec<String> = elimination_matches(&store).into_iter().map(|r| r.display_name).collect();
    assert_eq!(labels, vec!["F-1", "F-2", "F-3", "F-4"]);

    // Restoring the sweep makes it superfluous again.
    score_match(&mut store, "F-3", MatchOutcome::BlueWon);
    update(&mut matchups, MatchupKey::terminal(), &mut store, SCHEDULE).unwrap();
    let labels: Vec<String> = elimination_matches(&store).into_iter().map(|r| r.display_name).collect();
    assert_eq!(labels, vec!["F-1", "F-2", "F-3"]);
    assert_eq!(matchups[&MatchupKey::terminal()].winner(), 2);
  }

  #[test]
  fn test_tie_schedules_one_more_game() {
    let mut store = MemoryStore::default();
    create_test_alliances(&mut store, 2);
    let mut matchups = single_matchup(1, 1, 2);
    update(&mut matchups, MatchupKey::terminal(), &mut store, SCHEDULE).unwrap();
    score_match(&mut store, "F", MatchOutcome::Tie);
    update(&mut matchups, MatchupKey::terminal(), &mut store, SCHEDULE).unwrap();

    let matches = elimination_matches(&store);
    assert_eq!(matches.len(), 2);
    assert_eq!(matches[1].display_name, "F-2");
    assert_eq!(matches[1].elim_instance, 2);
    assert_eq!(matches[1].scheduled_at_ms, 1_100);
    assert!(!matchups[&MatchupKey::terminal()].is_complete());
  }

  #[test]
  fn test_missing_alliance_is_reference_error() {
    let mut store = MemoryStore::default();
    create_test_alliances(&mut store, 1);
    let mut matchups = single_matchup(1, 1, 9);
    let err = update(&mut matchups, MatchupKey::terminal(), &mut store, SCHEDULE).unwrap_err();
    assert!(matches!(err, BracketError::ReferenceIntegrity(9)));
    assert_eq!(err.to_string(), "alliance 9 does not exist in the database");
  }

  #[test]
  fn test_update_unknown_key() {
    let mut store = MemoryStore::default();
    let mut matchups = BTreeMap::new();
    let err = update(&mut matchups, MatchupKey::new(3, 1), &mut store, SCHEDULE).unwrap_err();
    assert!(matches!(err, BracketError::NotFound(key) if key == MatchupKey::new(3, 1)));
  }
}
