use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::session::StreamSession;

/// One live session entry.
///
/// The instance id is minted on construction and lets asynchronous
/// completions detect that they refer to a record that has since been
/// removed or replaced.
pub struct SessionRecord {
    pub meeting_id: String,
    pub instance: Uuid,
    pub session: Arc<dyn StreamSession>,
    /// Echoed in the started event once the session is live
    pub stream_url: Option<String>,
    pub stream_type: Option<String>,
}

impl SessionRecord {
    pub fn new(
        meeting_id: String,
        session: Arc<dyn StreamSession>,
        stream_url: Option<String>,
        stream_type: Option<String>,
    ) -> Self {
        Self {
            meeting_id,
            instance: Uuid::new_v4(),
            session,
            stream_url,
            stream_type,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("a session is already registered for meeting {0}")]
    AlreadyActive(String),
}

/// Mapping from meeting id to its single active session.
///
/// A plain map, deliberately unsynchronized: the manager task is its only
/// owner and serializes every access. At most one session per meeting is
/// the whole point, so inserting over a live record is an error, never an
/// overwrite.
#[derive(Default)]
pub struct SessionRegistry {
    records: HashMap<String, SessionRecord>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
        }
    }

    pub fn get(&self, meeting_id: &str) -> Option<&SessionRecord> {
        self.records.get(meeting_id)
    }

    pub fn insert(&mut self, record: SessionRecord) -> Result<(), RegistryError> {
        if self.records.contains_key(&record.meeting_id) {
            return Err(RegistryError::AlreadyActive(record.meeting_id.clone()));
        }
        self.records.insert(record.meeting_id.clone(), record);
        Ok(())
    }

    pub fn remove(&mut self, meeting_id: &str) -> Option<SessionRecord> {
        self.records.remove(meeting_id)
    }

    pub fn contains(&self, meeting_id: &str) -> bool {
        self.records.contains_key(meeting_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Active meeting ids, sorted for stable status output
    pub fn meeting_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.records.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Remove and return every record, used for shutdown teardown
    pub fn drain(&mut self) -> Vec<SessionRecord> {
        self.records.drain().map(|(_, record)| record).collect()
    }
}
