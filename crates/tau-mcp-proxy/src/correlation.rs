use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use crate::envelope::RequestId;

#[derive(Debug, Error, PartialEq, Eq)]
/// Enumerates supported `CorrelationError` values.
pub enum CorrelationError {
    #[error("request id {id} is already pending for tool '{pending_tool}'")]
    DuplicateRequestId { id: String, pending_tool: String },
}

#[derive(Debug, Default)]
/// Pending `tools/call` requests keyed by JSON-RPC id.
///
/// An entry is created when the request is forwarded upstream and removed by
/// the first response carrying the same id.
pub struct CorrelationTable {
    pending: Mutex<HashMap<RequestId, String>>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RequestId, String>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remember `tool_name` for `id`. A live entry for the same id is kept and
    /// reported as an error.
    pub fn record(&self, id: RequestId, tool_name: impl Into<String>) -> Result<(), CorrelationError> {
        let mut pending = self.lock();
        if let Some(existing) = pending.get(&id) {
            return Err(CorrelationError::DuplicateRequestId {
                id: id.to_string(),
                pending_tool: existing.clone(),
            });
        }
        pending.insert(id, tool_name.into());
        Ok(())
    }

    pub fn take(&self, id: &RequestId) -> Option<String> {
        self.lock().remove(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
