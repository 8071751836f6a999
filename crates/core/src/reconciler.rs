use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tokio_util::sync::CancellationToken;
use tracing::field::Empty;
use tracing::{info, instrument, warn, Span};

use crate::api::{ApiError, ResourceApi};
use crate::data::{Attributes, ResourceData};
use crate::error::{Action, Error};
use crate::id::{ResourceCoordinates, ResourceType};
use crate::poller::{Poller, PollerConfig};
use crate::schema::{Schema, WriteMode};

pub const NAME: &str = "name";
pub const RESOURCE_GROUP_NAME: &str = "resource_group_name";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStyle {
    /// Updates re-send the whole body through create-or-update.
    Put,
    /// Updates send only mutable fields through a patch call.
    Patch,
}

/// Everything that distinguishes one resource kind from another.
#[derive(Debug)]
pub struct ResourceDefinition {
    pub type_name: &'static str,
    pub display_name: &'static str,
    pub resource_type: ResourceType,
    pub schema: Schema,
    pub update_style: UpdateStyle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub create_secs: u64,
    pub read_secs: u64,
    pub update_secs: u64,
    pub delete_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self { create_secs: 3600, read_secs: 300, update_secs: 3600, delete_secs: 3600 }
    }
}

impl Timeouts {
    pub fn for_action(&self, action: Action) -> Duration {
        Duration::from_secs(match action {
            Action::Create => self.create_secs,
            Action::Read | Action::Import => self.read_secs,
            Action::Update => self.update_secs,
            Action::Delete => self.delete_secs,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReconcilerConfig {
    pub subscription_id: String,
    pub poller: PollerConfig,
    pub timeouts: Timeouts,
}

struct Snapshot {
    id: String,
    attributes: Attributes,
}

/// Drives create, read, update and delete for one resource kind.
///
/// Each call works on the caller's [`ResourceData`] and only touches it once the
/// whole remote exchange has succeeded, so a failed or cancelled call leaves the
/// previous state in place.
pub struct Reconciler {
    definition: &'static ResourceDefinition,
    api: Arc<dyn ResourceApi>,
    poller: Poller,
    subscription_id: String,
    timeouts: Timeouts,
}

impl Reconciler {
    pub fn new(definition: &'static ResourceDefinition, api: Arc<dyn ResourceApi>, config: ReconcilerConfig) -> Self {
        Self {
            definition,
            api,
            poller: Poller::new(config.poller),
            subscription_id: config.subscription_id,
            timeouts: config.timeouts,
        }
    }

    pub fn definition(&self) -> &'static ResourceDefinition {
        self.definition
    }

    #[instrument(skip_all, fields(kind = self.definition.type_name, name = Empty, resource_group = Empty))]
    pub async fn create(&self, data: &mut ResourceData, cancel: &CancellationToken) -> Result<(), Error> {
        let (name, group) = self.identity(data).map_err(|e| self.labelled(e, Action::Create, data))?;
        record(&name, &group);

        let snapshot = self
            .guard(Action::Create, cancel, self.create_remote(data.attributes(), &name, &group, cancel))
            .await
            .map_err(|e| e.context(self.definition.display_name, Action::Create, &name, &group))?;
        self.commit(data, snapshot);
        Ok(())
    }

    /// Refreshes `data` from the remote. A resource that no longer exists is not
    /// an error: the id and attributes are cleared so the engine can recreate it.
    #[instrument(skip_all, fields(kind = self.definition.type_name, name = Empty, resource_group = Empty))]
    pub async fn read(&self, data: &mut ResourceData, cancel: &CancellationToken) -> Result<(), Error> {
        let (id, coordinates) = self.stored_id(data, Action::Read)?;
        record(&coordinates.name, &coordinates.resource_group);

        let fetched = self
            .guard(Action::Read, cancel, self.fetch(&id))
            .await
            .map_err(|e| self.located(e, Action::Read, &coordinates))?;
        match fetched {
            Some(snapshot) => self.commit(data, snapshot),
            None => {
                warn!(
                    "{} {:?} was not found (resource group {:?}), removing from state",
                    self.definition.display_name, coordinates.name, coordinates.resource_group
                );
                data.clear();
            }
        }
        Ok(())
    }

    /// Pushes mutable attributes to the remote. Attributes that require
    /// replacement are the engine's business; renaming through an update is refused.
    #[instrument(skip_all, fields(kind = self.definition.type_name, name = Empty, resource_group = Empty))]
    pub async fn update(&self, data: &mut ResourceData, cancel: &CancellationToken) -> Result<(), Error> {
        let (id, coordinates) = self.stored_id(data, Action::Update)?;
        record(&coordinates.name, &coordinates.resource_group);

        let snapshot = self
            .guard(Action::Update, cancel, self.update_remote(data.attributes(), &id, &coordinates, cancel))
            .await
            .map_err(|e| self.located(e, Action::Update, &coordinates))?;
        self.commit(data, snapshot);
        Ok(())
    }

    /// Deletes the remote resource. One that is already gone counts as deleted.
    #[instrument(skip_all, fields(kind = self.definition.type_name, name = Empty, resource_group = Empty))]
    pub async fn delete(&self, data: &mut ResourceData, cancel: &CancellationToken) -> Result<(), Error> {
        let (_, coordinates) = self.stored_id(data, Action::Delete)?;
        record(&coordinates.name, &coordinates.resource_group);

        let existed = self
            .guard(Action::Delete, cancel, self.delete_remote(&coordinates, cancel))
            .await
            .map_err(|e| self.located(e, Action::Delete, &coordinates))?;
        if !existed {
            warn!(
                "{} {:?} (resource group {:?}) was already deleted",
                self.definition.display_name, coordinates.name, coordinates.resource_group
            );
        }
        data.clear_id();
        Ok(())
    }

    /// Adopts an existing remote resource by id.
    #[instrument(skip_all, fields(kind = self.definition.type_name, name = Empty, resource_group = Empty))]
    pub async fn import(&self, id: &str, cancel: &CancellationToken) -> Result<ResourceData, Error> {
        let mut data = ResourceData::default().with_id(id);
        let (_, coordinates) = self.stored_id(&data, Action::Import)?;
        record(&coordinates.name, &coordinates.resource_group);

        self.read(&mut data, cancel).await?;
        if data.id().is_none() {
            return Err(self.located(Error::NotFound, Action::Import, &coordinates));
        }
        Ok(data)
    }

    pub async fn exists(&self, data: &ResourceData, cancel: &CancellationToken) -> Result<bool, Error> {
        let (_, coordinates) = self.stored_id(data, Action::Read)?;
        let lookup = async {
            match self.api.get(&coordinates.resource_group, &coordinates.name).await {
                Ok(_) => Ok(true),
                Err(ApiError::NotFound) => Ok(false),
                Err(err) => Err(err.into()),
            }
        };
        self.guard(Action::Read, cancel, lookup)
            .await
            .map_err(|e| self.located(e, Action::Read, &coordinates))
    }

    async fn create_remote(&self, attributes: &Attributes, name: &str, group: &str, cancel: &CancellationToken) -> Result<Snapshot, Error> {
        let schema = &self.definition.schema;
        schema.validate(attributes)?;
        let body = schema.expand(attributes, WriteMode::Full)?;

        info!("creating {} {name:?} in resource group {group:?}", self.definition.display_name);
        let submitted = self.api.create_or_update(group, name, body).await?;
        let result = self.poller.settle(submitted, cancel).await?;

        let id = match returned_id(result.as_ref()) {
            Some(id) => id.to_owned(),
            None => self.definition.resource_type.encode(&self.subscription_id, group, name)?,
        };
        self.fetch(&id).await?.ok_or(Error::NotFound)
    }

    async fn update_remote(
        &self,
        attributes: &Attributes,
        id: &str,
        coordinates: &ResourceCoordinates,
        cancel: &CancellationToken,
    ) -> Result<Snapshot, Error> {
        let schema = &self.definition.schema;
        let attributes = &schema.without_computed(attributes);
        schema.validate(attributes)?;
        self.ensure_same_identity(attributes, coordinates)?;
        let (group, name) = (coordinates.resource_group.as_str(), coordinates.name.as_str());

        info!("updating {} {name:?} in resource group {group:?}", self.definition.display_name);
        let submitted = match self.definition.update_style {
            UpdateStyle::Put => self.api.create_or_update(group, name, schema.expand(attributes, WriteMode::Full)?).await?,
            UpdateStyle::Patch => self.api.update(group, name, schema.expand(attributes, WriteMode::Patch)?).await?,
        };
        self.poller.settle(submitted, cancel).await?;
        self.fetch(id).await?.ok_or(Error::NotFound)
    }

    async fn delete_remote(&self, coordinates: &ResourceCoordinates, cancel: &CancellationToken) -> Result<bool, Error> {
        info!("deleting {} {:?}", self.definition.display_name, coordinates.name);
        let submitted = match self.api.delete(&coordinates.resource_group, &coordinates.name).await {
            Ok(submitted) => submitted,
            Err(ApiError::NotFound) => return Ok(false),
            Err(err) => return Err(err.into()),
        };
        match self.poller.settle(submitted, cancel).await {
            Ok(_) => Ok(true),
            Err(Error::NotFound) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Fetches the resource behind `id` and flattens it; `None` when it does not exist.
    async fn fetch(&self, id: &str) -> Result<Option<Snapshot>, Error> {
        let coordinates = self.definition.resource_type.decode(id)?;
        let remote = match self.api.get(&coordinates.resource_group, &coordinates.name).await {
            Ok(remote) => remote,
            Err(ApiError::NotFound) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let id = returned_id(Some(&remote)).ok_or(Error::MissingId)?.to_owned();

        let mut attributes = self.definition.schema.flatten(&remote)?;
        attributes.insert(NAME.to_owned(), coordinates.name.into());
        attributes.insert(RESOURCE_GROUP_NAME.to_owned(), coordinates.resource_group.into());
        Ok(Some(Snapshot { id, attributes }))
    }

    async fn guard<T>(&self, action: Action, cancel: &CancellationToken, work: impl Future<Output = Result<T, Error>>) -> Result<T, Error> {
        let limit = self.timeouts.for_action(action);
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(Error::Cancelled),
            outcome = tokio::time::timeout(limit, work) => outcome.unwrap_or_else(|_| Err(Error::TimedOut(limit))),
        }
    }

    fn commit(&self, data: &mut ResourceData, snapshot: Snapshot) {
        data.commit(snapshot.id, snapshot.attributes, &self.definition.schema.remote_attributes());
    }

    fn identity(&self, data: &ResourceData) -> Result<(String, String), Error> {
        Ok((data.require_str(NAME)?.to_owned(), data.require_str(RESOURCE_GROUP_NAME)?.to_owned()))
    }

    fn stored_id(&self, data: &ResourceData, action: Action) -> Result<(String, ResourceCoordinates), Error> {
        let id = data.id().unwrap_or_default();
        match self.definition.resource_type.decode(id) {
            Ok(coordinates) => Ok((id.to_owned(), coordinates)),
            Err(err) => Err(self.labelled(err.into(), action, data)),
        }
    }

    fn ensure_same_identity(&self, attributes: &Attributes, coordinates: &ResourceCoordinates) -> Result<(), Error> {
        let declared = |key| attributes.get(key).and_then(|v| v.as_str());
        if declared(NAME).is_some_and(|name| name != coordinates.name) {
            return Err(Error::validation(NAME, format!("renaming {:?} requires replacing the resource", coordinates.name)));
        }
        if declared(RESOURCE_GROUP_NAME).is_some_and(|group| !group.eq_ignore_ascii_case(&coordinates.resource_group)) {
            return Err(Error::validation(
                RESOURCE_GROUP_NAME,
                format!("moving out of {:?} requires replacing the resource", coordinates.resource_group),
            ));
        }
        Ok(())
    }

    fn located(&self, err: Error, action: Action, coordinates: &ResourceCoordinates) -> Error {
        err.context(self.definition.display_name, action, &coordinates.name, &coordinates.resource_group)
    }

    /// Context from the declared attributes, for failures before an id could be decoded.
    fn labelled(&self, err: Error, action: Action, data: &ResourceData) -> Error {
        let declared = |key| data.get(key).and_then(|v| v.as_str()).unwrap_or_default();
        err.context(self.definition.display_name, action, declared(NAME), declared(RESOURCE_GROUP_NAME))
    }
}

fn returned_id(body: Option<&Json>) -> Option<&str> {
    body.and_then(|b| b.get("id")).and_then(Json::as_str).filter(|id| !id.is_empty())
}

fn record(name: &str, group: &str) {
    let span = Span::current();
    span.record("name", name);
    span.record("resource_group", group);
}
