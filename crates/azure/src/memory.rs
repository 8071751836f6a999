//! An in-process stand-in for Azure Resource Manager.
//!
//! Mutations are accepted immediately and applied when their long-running
//! operation completes, after a configurable number of in-progress polls.
//! Faults can be injected to exercise the poller and the reconciler's error paths.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value as Json};
use tokio::sync::Mutex;
use tracing::debug;

use r2arm_core::schema::merge_objects;
use r2arm_core::{ApiError, Diagnostic, Operation, OperationHandle, OperationStatus, ResourceApi, ResourceType, Submitted};

use crate::data_lake_store;

type Documents = Arc<Mutex<BTreeMap<(String, String), Json>>>;

/// Faults applied to the next operations the backend hands out.
#[derive(Debug, Clone, Default)]
pub struct Faults {
    /// Transport failures reported by each operation's first polls.
    pub transport_failures: u32,
    /// The next operation ends in this failure and changes nothing.
    pub fail_next: Option<Diagnostic>,
    /// The next delete finds the resource already gone while polling.
    pub vanish_during_delete: bool,
}

pub struct InMemoryArm {
    resource_type: ResourceType,
    subscription_id: String,
    documents: Documents,
    pending_polls: u32,
    retry_after: Option<Duration>,
    faults: Mutex<Faults>,
}

impl InMemoryArm {
    pub fn new(resource_type: ResourceType, subscription_id: impl Into<String>) -> Self {
        Self {
            resource_type,
            subscription_id: subscription_id.into(),
            documents: Arc::default(),
            pending_polls: 1,
            retry_after: None,
            faults: Mutex::default(),
        }
    }

    /// In-progress polls every operation reports before it completes.
    pub fn with_pending_polls(mut self, polls: u32) -> Self {
        self.pending_polls = polls;
        self
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    pub async fn inject(&self, faults: Faults) {
        *self.faults.lock().await = faults;
    }

    pub async fn document(&self, resource_group: &str, name: &str) -> Option<Json> {
        self.documents.lock().await.get(&key(resource_group, name)).cloned()
    }

    /// Removes a resource behind the reconciler's back, as another client would.
    pub async fn remove(&self, resource_group: &str, name: &str) -> Option<Json> {
        self.documents.lock().await.remove(&key(resource_group, name))
    }

    /// Changes a stored document in place, as an edit made outside the reconciler would.
    /// Returns false when there is no such resource.
    pub async fn edit(&self, resource_group: &str, name: &str, change: impl FnOnce(&mut Json)) -> bool {
        match self.documents.lock().await.get_mut(&key(resource_group, name)) {
            Some(document) => {
                change(document);
                true
            }
            None => false,
        }
    }

    pub async fn count(&self) -> usize {
        self.documents.lock().await.len()
    }

    async fn submit(&self, verb: &str, resource_group: &str, name: &str, change: Change) -> Submitted {
        let mut faults = self.faults.lock().await;
        let vanish = matches!(change, Change::Delete) && std::mem::take(&mut faults.vanish_during_delete);
        let pending = Pending {
            documents: self.documents.clone(),
            key: key(resource_group, name),
            change: Some(change),
            remaining: self.pending_polls,
            retry_after: self.retry_after,
            transport_failures: faults.transport_failures,
            failure: faults.fail_next.take(),
            vanish,
        };
        let description = format!("{verb} {}/{name}", self.resource_type);
        debug!(%description, "operation accepted");
        Submitted::Pending(OperationHandle::new(description, pending))
    }

    /// The document as ARM would return it: addressed, provisioned, tier applied.
    fn materialize(&self, resource_group: &str, name: &str, body: Json) -> Result<Json, ApiError> {
        let id = self
            .resource_type
            .encode(&self.subscription_id, resource_group, name)
            .map_err(|err| ApiError::Rejected { status: 400, message: err.to_string() })?;
        let mut document = match body {
            Json::Object(map) => map,
            other => return Err(ApiError::Rejected { status: 400, message: format!("expected a JSON object body, found {other}") }),
        };
        document.insert("id".into(), Json::String(id));
        document.insert("name".into(), Json::String(name.to_owned()));
        document.insert("type".into(), Json::String(self.resource_type.to_string()));
        settle_properties(&self.resource_type, name, &mut document);
        Ok(Json::Object(document))
    }
}

#[async_trait]
impl ResourceApi for InMemoryArm {
    async fn create_or_update(&self, resource_group: &str, name: &str, body: Json) -> Result<Submitted, ApiError> {
        let document = self.materialize(resource_group, name, body)?;
        Ok(self.submit("PUT", resource_group, name, Change::Replace(document)).await)
    }

    async fn update(&self, resource_group: &str, name: &str, body: Json) -> Result<Submitted, ApiError> {
        if self.document(resource_group, name).await.is_none() {
            return Err(ApiError::NotFound);
        }
        let patch = match body {
            Json::Object(patch) => patch,
            other => return Err(ApiError::Rejected { status: 400, message: format!("expected a JSON object body, found {other}") }),
        };
        let change = Change::Merge { resource_type: self.resource_type, name: name.to_owned(), patch };
        Ok(self.submit("PATCH", resource_group, name, change).await)
    }

    async fn get(&self, resource_group: &str, name: &str) -> Result<Json, ApiError> {
        self.document(resource_group, name).await.ok_or(ApiError::NotFound)
    }

    async fn delete(&self, resource_group: &str, name: &str) -> Result<Submitted, ApiError> {
        if self.document(resource_group, name).await.is_none() {
            return Err(ApiError::NotFound);
        }
        Ok(self.submit("DELETE", resource_group, name, Change::Delete).await)
    }
}

enum Change {
    Replace(Json),
    Merge { resource_type: ResourceType, name: String, patch: Map<String, Json> },
    Delete,
}

struct Pending {
    documents: Documents,
    key: (String, String),
    change: Option<Change>,
    remaining: u32,
    retry_after: Option<Duration>,
    transport_failures: u32,
    failure: Option<Diagnostic>,
    vanish: bool,
}

#[async_trait]
impl Operation for Pending {
    async fn poll(&mut self) -> Result<OperationStatus, ApiError> {
        if self.transport_failures > 0 {
            self.transport_failures -= 1;
            return Err(ApiError::Transport("connection reset by peer".into()));
        }
        if self.remaining > 0 {
            self.remaining -= 1;
            return Ok(OperationStatus::InProgress { retry_after: self.retry_after });
        }
        if let Some(diagnostic) = self.failure.take() {
            self.change = None;
            return Ok(OperationStatus::Failed(diagnostic));
        }
        let Some(change) = self.change.take() else {
            return Ok(OperationStatus::Succeeded(None));
        };

        let mut documents = self.documents.lock().await;
        match change {
            Change::Replace(document) => {
                documents.insert(self.key.clone(), document.clone());
                Ok(OperationStatus::Succeeded(Some(document)))
            }
            Change::Merge { resource_type, name, mut patch } => {
                let Some(Json::Object(current)) = documents.get_mut(&self.key) else {
                    return Err(ApiError::NotFound);
                };
                // a patched tag map replaces the old one rather than merging into it
                if let Some(tags) = patch.remove("tags") {
                    current.insert("tags".into(), tags);
                }
                merge_objects(current, patch);
                settle_properties(&resource_type, &name, current);
                Ok(OperationStatus::Succeeded(Some(Json::Object(current.clone()))))
            }
            Change::Delete => match documents.remove(&self.key) {
                Some(_) if !self.vanish => Ok(OperationStatus::Succeeded(None)),
                _ => Err(ApiError::NotFound),
            },
        }
    }
}

/// Resource groups are case-insensitive in ARM; names are not.
fn key(resource_group: &str, name: &str) -> (String, String) {
    (resource_group.to_lowercase(), name.to_owned())
}

fn settle_properties(resource_type: &ResourceType, name: &str, document: &mut Map<String, Json>) {
    let properties = document.entry("properties").or_insert_with(|| json!({}));
    let Some(properties) = properties.as_object_mut() else {
        return;
    };
    properties.insert("provisioningState".into(), json!("Succeeded"));
    if let Some(tier) = properties.get("newTier").cloned() {
        properties.insert("currentTier".into(), tier);
    }
    if *resource_type == data_lake_store::ACCOUNTS {
        properties.insert("endpoint".into(), json!(format!("{name}.{}", data_lake_store::ENDPOINT_SUFFIX)));
    }
}

#[cfg(test)]
mod tests {
    use r2arm_core::{CancellationToken, Poller, PollerConfig};

    use super::*;

    const SUB: &str = "00000000-0000-0000-0000-000000000000";

    fn poller() -> Poller {
        Poller::new(PollerConfig { interval_ms: 1, max_interval_ms: 4, transport_retries: 3 })
    }

    #[tokio::test]
    async fn put_is_applied_when_the_operation_completes() {
        let arm = InMemoryArm::new(data_lake_store::ACCOUNTS, SUB).with_pending_polls(2);
        let submitted = arm
            .create_or_update("RG1", "store1", json!({ "location": "westus", "properties": { "newTier": "Consumption" } }))
            .await
            .unwrap();
        assert!(arm.document("rg1", "store1").await.is_none());

        let body = poller().settle(submitted, &CancellationToken::new()).await.unwrap().unwrap();
        assert_eq!(body["id"], format!("/subscriptions/{SUB}/resourceGroups/RG1/providers/Microsoft.DataLakeStore/accounts/store1"));
        assert_eq!(body["properties"]["currentTier"], "Consumption");
        assert_eq!(body["properties"]["endpoint"], "store1.azuredatalakestore.net");
        assert_eq!(arm.get("rg1", "store1").await.unwrap(), body);
    }

    #[tokio::test]
    async fn patch_merges_into_the_stored_document() {
        let arm = InMemoryArm::new(data_lake_store::ACCOUNTS, SUB).with_pending_polls(0);
        let cancel = CancellationToken::new();
        let created = arm
            .create_or_update("rg1", "store1", json!({ "location": "westus", "properties": { "newTier": "Consumption", "firewallState": "Enabled" } }))
            .await
            .unwrap();
        poller().settle(created, &cancel).await.unwrap();

        let patched = arm.update("rg1", "store1", json!({ "properties": { "newTier": "Commitment_1TB" } })).await.unwrap();
        poller().settle(patched, &cancel).await.unwrap();

        let document = arm.document("rg1", "store1").await.unwrap();
        assert_eq!(document["properties"]["currentTier"], "Commitment_1TB");
        assert_eq!(document["properties"]["firewallState"], "Enabled");
        assert_eq!(document["location"], "westus");
    }

    #[tokio::test]
    async fn patched_tags_replace_the_stored_ones() {
        let arm = InMemoryArm::new(data_lake_store::ACCOUNTS, SUB).with_pending_polls(0);
        let cancel = CancellationToken::new();
        let created = arm
            .create_or_update("rg1", "store1", json!({ "location": "westus", "tags": { "env": "prod", "team": "data" } }))
            .await
            .unwrap();
        poller().settle(created, &cancel).await.unwrap();

        let patched = arm.update("rg1", "store1", json!({ "tags": { "env": "test" } })).await.unwrap();
        poller().settle(patched, &cancel).await.unwrap();

        let document = arm.document("rg1", "store1").await.unwrap();
        assert_eq!(document["tags"], json!({ "env": "test" }));
    }

    #[tokio::test]
    async fn missing_resources_are_not_found() {
        let arm = InMemoryArm::new(data_lake_store::ACCOUNTS, SUB);
        assert_eq!(arm.get("rg1", "nope").await.unwrap_err(), ApiError::NotFound);
        assert!(matches!(arm.delete("rg1", "nope").await, Err(ApiError::NotFound)));
        assert!(matches!(arm.update("rg1", "nope", json!({})).await, Err(ApiError::NotFound)));
    }

    #[tokio::test]
    async fn injected_failure_changes_nothing() {
        let arm = InMemoryArm::new(data_lake_store::ACCOUNTS, SUB);
        arm.inject(Faults { fail_next: Some(Diagnostic::new("QuotaExceeded", "too many accounts")), ..Faults::default() })
            .await;
        let submitted = arm.create_or_update("rg1", "store1", json!({ "location": "westus" })).await.unwrap();
        let result = poller().settle(submitted, &CancellationToken::new()).await;
        assert!(matches!(result, Err(r2arm_core::Error::OperationFailed(d)) if d.code == "QuotaExceeded"));
        assert_eq!(arm.count().await, 0);
    }

    #[tokio::test]
    async fn transport_faults_are_retried_by_the_poller() {
        let arm = InMemoryArm::new(data_lake_store::ACCOUNTS, SUB);
        arm.inject(Faults { transport_failures: 2, ..Faults::default() }).await;
        let submitted = arm.create_or_update("rg1", "store1", json!({ "location": "westus" })).await.unwrap();
        poller().settle(submitted, &CancellationToken::new()).await.unwrap();
        assert_eq!(arm.count().await, 1);
    }
}
