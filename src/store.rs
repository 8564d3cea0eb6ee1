use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};
use tracing::info;

use crate::error::StoreError;
use crate::types::{Alliance, AllianceId, MatchId, MatchRecord, MatchType, NewMatchRecord};

/// Persistence collaborator consumed by the bracket engine.
pub trait MatchStore {
    fn create_match(&mut self, record: NewMatchRecord) -> Result<MatchId, StoreError>;

    fn update_match(&mut self, record: &MatchRecord) -> Result<(), StoreError>;

    fn delete_match(&mut self, id: MatchId) -> Result<(), StoreError>;

    fn match_by_id(&self, id: MatchId) -> Result<Option<MatchRecord>, StoreError>;

    /// Elimination matches for one bracket slot, ordered by instance.
    fn matches_by_elim_round_group(&self, round: u32, group: u32) -> Result<Vec<MatchRecord>, StoreError>;

    /// All matches of a type, in play order.
    fn matches_by_type(&self, match_type: MatchType) -> Result<Vec<MatchRecord>, StoreError>;

    fn alliance_by_id(&self, id: AllianceId) -> Result<Option<Alliance>, StoreError>;
}

// ── In-memory store ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MemoryStore {
    next_match_id: MatchId,
    matches: BTreeMap<MatchId, MatchRecord>,
    alliances: BTreeMap<AllianceId, Alliance>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub fn upsert_alliance(&mut self, alliance: Alliance) {
        self.alliances.insert(alliance.id, alliance);
    }
}

impl MatchStore for MemoryStore {
    fn create_match(&mut self, record: NewMatchRecord) -> Result<MatchId, StoreError> {
        self.next_match_id += 1;
        let id = self.next_match_id;
        self.matches.insert(id, record.into_record(id));
        Ok(id)
    }

    fn update_match(&mut self, record: &MatchRecord) -> Result<(), StoreError> {
        let existing = self
            .matches
            .get_mut(&record.id)
            .ok_or(StoreError::MissingMatch(record.id))?;
        *existing = record.clone();
        Ok(())
    }

    fn delete_match(&mut self, id: MatchId) -> Result<(), StoreError> {
        self.matches
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::MissingMatch(id))
    }

    fn match_by_id(&self, id: MatchId) -> Result<Option<MatchRecord>, StoreError> {
        Ok(self.matches.get(&id).cloned())
    }

    fn matches_by_elim_round_group(&self, round: u32, group: u32) -> Result<Vec<MatchRecord>, StoreError> {
        let mut out: Vec<MatchRecord> = self
            .matches
            .values()
            .filter(|m| m.match_type == MatchType::Elimination)
            .filter(|m| m.elim_round == round && m.elim_group == group)
            .cloned()
            .collect();
        out.sort_by_key(|m| (m.elim_instance, m.id));
        Ok(out)
    }

    fn matches_by_type(&self, match_type: MatchType) -> Result<Vec<MatchRecord>, StoreError> {
        let mut out: Vec<MatchRecord> = self
            .matches
            .values()
            .filter(|m| m.match_type == match_type)
            .cloned()
            .collect();
        out.sort_by_key(|m| m.play_order_key());
        Ok(out)
    }

    fn alliance_by_id(&self, id: AllianceId) -> Result<Option<Alliance>, StoreError> {
        Ok(self.alliances.get(&id).cloned())
    }
}

// ── JSON file store ────────────────────────────────────────────────────

/// A `MemoryStore` that rewrites its backing JSON file after every mutation.
/// A mutation only becomes visible once the file write succeeds, so a failed
/// write leaves memory and disk in agreement.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    inner: MemoryStore,
}

impl JsonFileStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let inner = if path.is_file() {
            let data = fs::read_to_string(path)?;
            serde_json::from_str::<MemoryStore>(&data)?
        } else {
            MemoryStore::default()
        };
        info!("opened match store at {}", path.display());
        Ok(JsonFileStore {
            path: path.to_path_buf(),
            inner,
        })
    }

    pub fn upsert_alliance(&mut self, alliance: Alliance) -> Result<(), StoreError> {
        self.commit(|next| {
            next.upsert_alliance(alliance);
            Ok(())
        })
    }

    fn commit<T>(
        &mut self,
        mutate: impl FnOnce(&mut MemoryStore) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut next = self.inner.clone();
        let out = mutate(&mut next)?;
        write_store(&self.path, &next)?;
        self.inner = next;
        Ok(out)
    }
}

fn write_store(path: &Path, store: &MemoryStore) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let payload = serde_json::to_string_pretty(store)?;
    fs::write(path, payload)?;
    Ok(())
}

impl MatchStore for JsonFileStore {
    fn create_match(&mut self, record: NewMatchRecord) -> Result<MatchId, StoreError> {
        self.commit(|next| next.create_match(record))
    }

    fn update_match(&mut self, record: &MatchRecord) -> Result<(), StoreError> {
        self.commit(|next| next.update_match(record))
    }

    fn delete_match(&mut self, id: MatchId) -> Result<(), StoreError> {
        self.commit(|next| next.delete_match(id))
    }

    fn match_by_id(&self, id: MatchId) -> Result<Option<MatchRecord>, StoreError> {
        self.inner.match_by_id(id)
    }

    fn matches_by_elim_round_group(&self, round: u32, group: u32) -> Result<Vec<MatchRecord>, StoreError> {
        self.inner.matches_by_elim_round_group(round, group)
    }

    fn matches_by_type(&self, match_type: MatchType) -> Result<Vec<MatchRecord>, StoreError> {
        self.inner.matches_by_type(match_type)
    }

    fn alliance_by_id(&self, id: AllianceId) -> Result<Option<Alliance>, StoreError> {
        self.inner.alliance_by_id(id)
    }
}
