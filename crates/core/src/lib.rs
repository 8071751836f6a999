use async_trait::async_trait;

pub mod api;
pub mod data;
pub mod error;
pub mod id;
pub mod poller;
pub mod reconciler;
pub mod schema;

pub use api::{ApiError, Diagnostic, Operation, OperationHandle, OperationStatus, ResourceApi, Submitted};
pub use data::{Attributes, ResourceData, Value};
pub use error::{Action, Error};
pub use id::{parse_resource_id, MalformedIdError, ParsedResourceId, ResourceCoordinates, ResourceType};
pub use poller::{Poller, PollerConfig};
pub use reconciler::{Reconciler, ReconcilerConfig, ResourceDefinition, Timeouts, UpdateStyle};
pub use tokio_util::sync::CancellationToken;

/// What the orchestration engine calls for each resource instance. Every
/// operation works in place on the instance's [`ResourceData`].
#[async_trait]
pub trait Resource: Send + Sync {
    fn type_name(&self) -> &'static str;
    async fn create(&self, data: &mut ResourceData, cancel: &CancellationToken) -> Result<(), Error>;
    async fn read(&self, data: &mut ResourceData, cancel: &CancellationToken) -> Result<(), Error>;
    async fn update(&self, data: &mut ResourceData, cancel: &CancellationToken) -> Result<(), Error>;
    async fn delete(&self, data: &mut ResourceData, cancel: &CancellationToken) -> Result<(), Error>;
    async fn import(&self, id: &str, cancel: &CancellationToken) -> Result<ResourceData, Error>;
}

#[async_trait]
impl Resource for Reconciler {
    fn type_name(&self) -> &'static str {
        self.definition().type_name
    }

    async fn create(&self, data: &mut ResourceData, cancel: &CancellationToken) -> Result<(), Error> {
        Reconciler::create(self, data, cancel).await
    }

    async fn read(&self, data: &mut ResourceData, cancel: &CancellationToken) -> Result<(), Error> {
        Reconciler::read(self, data, cancel).await
    }

    async fn update(&self, data: &mut ResourceData, cancel: &CancellationToken) -> Result<(), Error> {
        Reconciler::update(self, data, cancel).await
    }

    async fn delete(&self, data: &mut ResourceData, cancel: &CancellationToken) -> Result<(), Error> {
        Reconciler::delete(self, data, cancel).await
    }

    async fn import(&self, id: &str, cancel: &CancellationToken) -> Result<ResourceData, Error> {
        Reconciler::import(self, id, cancel).await
    }
}
