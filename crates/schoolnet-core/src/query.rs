//! Read-side client: latest snapshot and full history, each verified.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::errors::QueryError;
use crate::ledger::{LedgerConnector, LedgerReader};
use crate::measurement::EntityId;
use crate::verifier::VerifiedRecord;

/// Outcome of a latest-value lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", content = "record", rename_all = "snake_case")]
pub enum Latest {
    Found(VerifiedRecord),
    NotFound,
}

impl Latest {
    pub fn found(self) -> Option<VerifiedRecord> {
        match self {
            Latest::Found(record) => Some(record),
            Latest::NotFound => None,
        }
    }
}

/// Retrieves records and verifies every one of them before returning it.
pub struct QueryClient<C> {
    connector: C,
}

impl<C: LedgerConnector> QueryClient<C> {
    pub fn new(connector: C) -> Self {
        Self { connector }
    }

    /// Most recent record for `entity_id` as held in ledger state.
    pub async fn get_latest(&self, entity_id: EntityId) -> Result<Latest, QueryError> {
        let reader = self.connector.reader()?;
        let Some(record) = reader.get_latest_data(entity_id).await? else {
            debug!("No data for school {}", entity_id);
            return Ok(Latest::NotFound);
        };

        if record.entity_id() != entity_id {
            return Err(QueryError::Malformed(format!(
                "requested school {} but ledger returned school {}",
                entity_id,
                record.entity_id()
            )));
        }

        let verified = VerifiedRecord::check(record);
        if !verified.is_valid() {
            warn!("Latest record for school {} failed verification", entity_id);
        }
        Ok(Latest::Found(verified))
    }

    /// Every record ever submitted for `entity_id`, in ledger emission order.
    ///
    /// Tampered records are included and flagged, never filtered out.
    pub async fn get_history(&self, entity_id: EntityId) -> Result<Vec<VerifiedRecord>, QueryError> {
        let reader = self.connector.reader()?;
        let mut events = reader.query_data_submitted(entity_id).await?;

        if let Some(stray) = events.iter().find(|ev| ev.record.entity_id() != entity_id) {
            return Err(QueryError::Malformed(format!(
                "event for school {} returned by filter on school {}",
                stray.record.entity_id(),
                entity_id
            )));
        }

        events.sort_by_key(|ev| ev.position);

        let history: Vec<VerifiedRecord> = events
            .into_iter()
            .map(|ev| VerifiedRecord::check_at(ev.record, ev.position))
            .collect();

        let tampered = history.iter().filter(|r| !r.is_valid()).count();
        if tampered > 0 {
            warn!(
                "{} of {} history records for school {} failed verification",
                tampered,
                history.len(),
                entity_id
            );
        }
        debug!("History for school {}: {} records", entity_id, history.len());

        Ok(history)
    }
}
