//! Meeting-termination signal decoding
//!
//! The termination subject has two wire generations in the wild:
//! - legacy: `{"payload": {"meeting_id": "..."}}`
//! - current: `{"core": {"body": {"meetingId": "..."}}}`
//!
//! Which one a deployment speaks is configuration, decided once at startup,
//! so dispatch logic never branches on schema.

use anyhow::{Context, Result};
use serde::Deserialize;

/// Wire generation of the termination signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminationSchema {
    Legacy,
    Current,
}

impl Default for TerminationSchema {
    fn default() -> Self {
        TerminationSchema::Current
    }
}

#[derive(Debug, Deserialize)]
struct LegacySignal {
    payload: LegacyPayload,
}

#[derive(Debug, Deserialize)]
struct LegacyPayload {
    meeting_id: String,
}

#[derive(Debug, Deserialize)]
struct CurrentSignal {
    core: CurrentCore,
}

#[derive(Debug, Deserialize)]
struct CurrentCore {
    body: CurrentBody,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurrentBody {
    meeting_id: String,
}

impl TerminationSchema {
    /// Extract the terminated meeting id from a raw signal payload.
    pub fn decode(&self, payload: &[u8]) -> Result<String> {
        match self {
            TerminationSchema::Legacy => {
                let signal: LegacySignal = serde_json::from_slice(payload)
                    .context("malformed legacy termination signal")?;
                Ok(signal.payload.meeting_id)
            }
            TerminationSchema::Current => {
                let signal: CurrentSignal = serde_json::from_slice(payload)
                    .context("malformed termination signal")?;
                Ok(signal.core.body.meeting_id)
            }
        }
    }
}
