use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use r2arm_core::{PollerConfig, Reconciler, ReconcilerConfig, Resource, ResourceApi, ResourceDefinition, Timeouts};

pub mod availability_test;
pub mod data_lake_analytics;
pub mod data_lake_store;
pub mod firewall;
pub mod memory;
pub mod normalize;

pub use availability_test::AVAILABILITY_TEST;
pub use data_lake_analytics::DATA_LAKE_ANALYTICS;
pub use data_lake_store::DATA_LAKE_STORE;
pub use memory::{Faults, InMemoryArm};

/// Every resource kind this provider manages.
pub static DEFINITIONS: &[&ResourceDefinition] = &[&AVAILABILITY_TEST, &DATA_LAKE_STORE, &DATA_LAKE_ANALYTICS];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProviderError {
    #[error("unsupported resource type {type_name:?}, expected one of {supported}")]
    UnsupportedType { type_name: String, supported: String },

    #[error("no subscription id configured; set provider.azurerm.subscription_id or ARM_SUBSCRIPTION_ID")]
    MissingSubscription,
}

pub fn definition(type_name: &str) -> Result<&'static ResourceDefinition, ProviderError> {
    DEFINITIONS
        .iter()
        .copied()
        .find(|d| d.type_name == type_name)
        .ok_or_else(|| ProviderError::UnsupportedType {
            type_name: type_name.to_owned(),
            supported: DEFINITIONS.iter().map(|d| d.type_name).collect::<Vec<_>>().join(", "),
        })
}

/// The `provider.azurerm` block of a stack file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AzureProvider {
    #[serde(default)]
    pub subscription_id: Option<String>,
    #[serde(default)]
    pub polling: PollerConfig,
    #[serde(default)]
    pub timeouts: Timeouts,
}

impl AzureProvider {
    pub fn subscription_id(&self) -> Result<&str, ProviderError> {
        self.subscription_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(ProviderError::MissingSubscription)
    }

    pub fn reconciler_config(&self) -> Result<ReconcilerConfig, ProviderError> {
        Ok(ReconcilerConfig {
            subscription_id: self.subscription_id()?.to_owned(),
            poller: self.polling.clone(),
            timeouts: self.timeouts.clone(),
        })
    }

    pub fn reconciler(&self, type_name: &str, api: Arc<dyn ResourceApi>) -> Result<Reconciler, ProviderError> {
        Ok(Reconciler::new(definition(type_name)?, api, self.reconciler_config()?))
    }

    pub fn resource(&self, type_name: &str, api: Arc<dyn ResourceApi>) -> Result<Box<dyn Resource>, ProviderError> {
        Ok(Box::new(self.reconciler(type_name, api)?))
    }
}
