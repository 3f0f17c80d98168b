use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use super::{ExternalInventory, SyncAction, SyncError, SyncRequest, SyncResponse};

/// In-memory stand-in for Stockit.
///
/// Intended for tests/dev: records every request, hands out sequential item
/// ids on create and fails with scripted errors on demand.
#[derive(Debug)]
pub struct InMemoryExternalInventory {
    requests: Mutex<Vec<SyncRequest>>,
    failures: Mutex<VecDeque<SyncError>>,
    next_item_id: AtomicI64,
}

impl InMemoryExternalInventory {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            failures: Mutex::new(VecDeque::new()),
            next_item_id: AtomicI64::new(1000),
        }
    }

    /// Make the next call fail with `error` (queued; one error per call).
    pub fn fail_next(&self, error: SyncError) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push_back(error);
        }
    }

    pub fn requests(&self) -> Vec<SyncRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn actions(&self) -> Vec<SyncAction> {
        self.requests().iter().map(|r| r.action).collect()
    }

    pub fn count(&self, action: SyncAction) -> usize {
        self.requests().iter().filter(|r| r.action == action).count()
    }
}

impl Default for InMemoryExternalInventory {
    fn default() -> Self {
        Self::new()
    }
}

impl ExternalInventory for InMemoryExternalInventory {
    fn send(&self, request: &SyncRequest) -> Result<SyncResponse, SyncError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        if let Some(err) = self.failures.lock().ok().and_then(|mut f| f.pop_front()) {
            return Err(err);
        }

        let item_id = match request.action {
            SyncAction::Create => Some(self.next_item_id.fetch_add(1, Ordering::SeqCst)),
            SyncAction::Delete => None,
            _ => request.body.pointer("/item/id").and_then(|v| v.as_i64()),
        };
        Ok(SyncResponse {
            item_id,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn records_requests_and_scripts_failures() {
        let stockit = InMemoryExternalInventory::new();
        let create = SyncRequest {
            action: SyncAction::Create,
            body: serde_json::json!({"item": {"id": null}}),
        };

        let first = stockit.send(&create).unwrap();
        assert_eq!(first.item_id, Some(1000));

        stockit.fail_next(SyncError::Rejected(BTreeMap::from([("code_id".into(), "missing".into())])));
        assert!(matches!(stockit.send(&create), Err(SyncError::Rejected(_))));

        assert_eq!(stockit.count(SyncAction::Create), 2);
    }

    #[test]
    fn update_echoes_item_id() {
        let stockit = InMemoryExternalInventory::new();
        let update = SyncRequest {
            action: SyncAction::Update,
            body: serde_json::json!({"item": {"id": 7}}),
        };
        assert_eq!(stockit.send(&update).unwrap().item_id, Some(7));
    }
}
