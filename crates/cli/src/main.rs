use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::{Map, Value as Json};
use tracing::{info, warn};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

use r2arm_azure::{AzureProvider, InMemoryArm};
use r2arm_core::schema::WriteMode;
use r2arm_core::{parse_resource_id, CancellationToken, Resource, ResourceData, ResourceDefinition};
use r2arm_policy::Policy;

#[derive(Parser, Debug)]
#[command(author, version, about = "r2arm - Azure Resource Manager lifecycle reconciler")]
struct Cli {
    /// Stack file (YAML)
    #[arg(short, long, global = true)]
    file: Option<PathBuf>,

    /// Allow Data Lake Stores with encryption disabled
    #[arg(long, default_value_t = false, global = true)]
    allow_unencrypted: bool,

    /// Overrides provider.azurerm.subscription_id
    #[arg(long, env = "ARM_SUBSCRIPTION_ID", global = true)]
    subscription_id: Option<String>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Check every resource in the stack without contacting Azure
    Validate,
    /// Write the create request body of every resource as `<type>.<name>.json`
    Render {
        #[arg(short, long, default_value = "out")]
        out: PathBuf,
    },
    /// Decode an ARM resource id
    ParseId { id: String },
    /// Create, read and delete every resource against an in-memory ARM
    Simulate {
        #[arg(long, default_value_t = 1)]
        pending_polls: u32,
    },
}

#[derive(Deserialize)]
struct Stack {
    #[serde(default)]
    provider: Providers,
    #[serde(default)]
    resources: Vec<StackResource>,
}

#[derive(Deserialize, Default)]
struct Providers {
    #[serde(default)]
    azurerm: AzureProvider,
}

#[derive(Deserialize, Clone)]
struct StackResource {
    #[serde(rename = "type")]
    type_name: String,
    name: String,
    #[serde(flatten)]
    attributes: Map<String, Json>,
}

impl StackResource {
    fn definition(&self) -> Result<&'static ResourceDefinition> {
        Ok(r2arm_azure::definition(&self.type_name)?)
    }

    fn data(&self) -> Result<ResourceData> {
        let mut attributes = self.attributes.clone();
        attributes.insert("name".to_owned(), Json::String(self.name.clone()));
        ResourceData::from_json(Json::Object(attributes)).with_context(|| format!("reading {} {:?}", self.type_name, self.name))
    }

    /// Validates and expands the create body, then applies the plan-time policy.
    fn request(&self, policy: &Policy) -> Result<Json> {
        let definition = self.definition()?;
        let data = self.data()?;
        let label = || format!("{} {:?}", self.type_name, self.name);
        definition.schema.validate(data.attributes()).with_context(label)?;
        let body = definition.schema.expand(data.attributes(), WriteMode::Full).with_context(label)?;
        policy.check_request(&self.type_name, &self.name, &body)?;
        Ok(body)
    }
}

fn load_stack(file: Option<&Path>) -> Result<Stack> {
    let file = file.context("a stack file is required (-f/--file)")?;
    let raw = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    serde_yaml::from_slice(&raw).with_context(|| format!("parsing {}", file.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .json()
        .with_span_events(FmtSpan::CLOSE)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    let policy = Policy::new(cli.allow_unencrypted);

    match cli.cmd {
        Cmd::ParseId { id } => {
            let parsed = parse_resource_id(&id)?;
            println!("{}", serde_json::to_string_pretty(&parsed)?);
        }
        Cmd::Validate => {
            let stack = load_stack(cli.file.as_deref())?;
            for resource in &stack.resources {
                resource.request(&policy)?;
                info!(kind = %resource.type_name, name = %resource.name, "valid");
            }
        }
        Cmd::Render { out } => {
            let stack = load_stack(cli.file.as_deref())?;
            std::fs::create_dir_all(&out).with_context(|| format!("creating {}", out.display()))?;
            for resource in &stack.resources {
                let body = resource.request(&policy)?;
                let path = out.join(format!("{}.{}.json", resource.type_name, resource.name));
                std::fs::write(&path, serde_json::to_vec_pretty(&body)?).with_context(|| format!("writing {}", path.display()))?;
                info!(path = %path.display(), "rendered");
            }
        }
        Cmd::Simulate { pending_polls } => {
            let stack = load_stack(cli.file.as_deref())?;
            let mut provider = stack.provider.azurerm;
            if let Some(subscription_id) = cli.subscription_id {
                provider.subscription_id = Some(subscription_id);
            }
            let subscription_id = provider.subscription_id()?.to_owned();

            let cancel = CancellationToken::new();
            let trigger = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupted, abandoning in-flight operations");
                    trigger.cancel();
                }
            });

            for resource in &stack.resources {
                resource.request(&policy)?;
                let definition = resource.definition()?;
                let arm = InMemoryArm::new(definition.resource_type, subscription_id.as_str())
                    .with_pending_polls(pending_polls)
                    .with_retry_after(Duration::from_millis(200));
                let reconciler = provider.resource(definition.type_name, Arc::new(arm))?;

                let mut data = resource.data()?;
                reconciler.create(&mut data, &cancel).await?;
                reconciler.read(&mut data, &cancel).await?;
                println!("{}", serde_json::to_string_pretty(&data)?);
                reconciler.delete(&mut data, &cancel).await?;
                info!(kind = definition.type_name, name = %resource.name, "simulated create, read and delete");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const STACK: &str = r#"
provider:
  azurerm:
    subscription_id: 00000000-0000-0000-0000-000000000000
    polling: { interval_ms: 100 }
resources:
  - type: azurerm_data_lake_store
    name: store1
    resource_group_name: rg1
    location: East US 2
    encryption_state: Disabled
  - type: azurerm_availability_test
    name: webtest1
    resource_group_name: rg1
    location: westus
    locations: [us-tx-sn1-azr]
    frequency: 600
"#;

    fn stack() -> Stack {
        serde_yaml::from_str(STACK).unwrap()
    }

    #[test]
    fn stack_resources_carry_their_name() {
        let stack = stack();
        assert_eq!(stack.provider.azurerm.polling.interval_ms, 100);
        let data = stack.resources[1].data().unwrap();
        assert_eq!(data.get_str("name").unwrap(), Some("webtest1"));
        assert_eq!(data.get_int("frequency").unwrap(), Some(600));
    }

    #[test]
    fn policy_blocks_unencrypted_stores() {
        let stack = stack();
        let err = stack.resources[0].request(&Policy::new(false)).unwrap_err();
        assert!(err.to_string().contains("disables encryption"));
        let body = stack.resources[0].request(&Policy::new(true)).unwrap();
        assert_eq!(body["location"], "eastus2");
    }

    #[test]
    fn unknown_types_are_reported() {
        let resource = StackResource { type_name: "azurerm_vm".into(), name: "x".into(), attributes: Map::new() };
        assert!(resource.request(&Policy::new(false)).is_err());
    }
}
