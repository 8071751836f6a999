use r2arm_core::schema::{field, Check, Coercion, EnumTable, Fallback, FieldMapping, Schema};
use r2arm_core::{ResourceDefinition, ResourceType, UpdateStyle};
use r2arm_policy::{data_lake_name, resource_group_name};

use crate::firewall::{FIREWALL_RULE_FIELDS, SWITCH};
use crate::normalize::{LOCATION, TAGS};

pub const TYPE_NAME: &str = "azurerm_data_lake_store";
pub const ACCOUNTS: ResourceType = ResourceType::new("Microsoft.DataLakeStore", "accounts");
pub const ENDPOINT_SUFFIX: &str = "azuredatalakestore.net";

pub static STORE_TIER: EnumTable = EnumTable {
    name: "tier",
    variants: &[
        ("Consumption", "Consumption"),
        ("Commitment_1TB", "Commitment_1TB"),
        ("Commitment_10TB", "Commitment_10TB"),
        ("Commitment_100TB", "Commitment_100TB"),
        ("Commitment_500TB", "Commitment_500TB"),
        ("Commitment_1PB", "Commitment_1PB"),
        ("Commitment_5PB", "Commitment_5PB"),
    ],
};

pub static ENCRYPTION_STATE: EnumTable = EnumTable { name: "encryption state", variants: &[("Enabled", "Enabled"), ("Disabled", "Disabled")] };

pub static ENCRYPTION_TYPE: EnumTable = EnumTable {
    name: "encryption type",
    variants: &[("ServiceManaged", "ServiceManaged"), ("UserManaged", "UserManaged")],
};

static FIELDS: &[FieldMapping] = &[
    field("name", &[], Coercion::String).required().immutable().write_only().check(Check::Str(data_lake_name)),
    field("resource_group_name", &[], Coercion::String)
        .required()
        .immutable()
        .write_only()
        .check(Check::Str(resource_group_name)),
    field("location", &["location"], Coercion::Custom(&LOCATION)).required().immutable().normalized(),
    field("tier", &["properties", "newTier"], Coercion::Enum(&STORE_TIER))
        .read_from(&["properties", "currentTier"])
        .default_to(Fallback::Str("Consumption"))
        .normalized(),
    field("encryption_state", &["properties", "encryptionState"], Coercion::Enum(&ENCRYPTION_STATE))
        .default_to(Fallback::Str("Enabled"))
        .immutable()
        .normalized(),
    field("encryption_type", &["properties", "encryptionConfig", "type"], Coercion::Enum(&ENCRYPTION_TYPE))
        .immutable()
        .normalized(),
    field("firewall_enabled", &["properties", "firewallState"], SWITCH).default_to(Fallback::Bool(true)),
    field("firewall_allow_azure_ips", &["properties", "firewallAllowAzureIps"], SWITCH).default_to(Fallback::Bool(true)),
    field("firewall_rule", &["properties", "firewallRules"], Coercion::Blocks(FIREWALL_RULE_FIELDS)),
    field("endpoint", &["properties", "endpoint"], Coercion::String).computed(),
    field("tags", &["tags"], Coercion::Custom(&TAGS)),
];

pub static DATA_LAKE_STORE: ResourceDefinition = ResourceDefinition {
    type_name: TYPE_NAME,
    display_name: "Data Lake Store",
    resource_type: ACCOUNTS,
    schema: Schema::new(FIELDS),
    update_style: UpdateStyle::Patch,
};

#[cfg(test)]
mod tests {
    use r2arm_core::schema::WriteMode;
    use r2arm_core::{Error, ResourceData, Value};
    use serde_json::json;

    use super::*;

    fn store() -> ResourceData {
        ResourceData::from_json(json!({
            "name": "store1",
            "resource_group_name": "rg1",
            "location": "East US 2",
            "tier": "commitment_1tb",
            "encryption_type": "ServiceManaged",
        }))
        .unwrap()
    }

    #[test]
    fn create_body_carries_encryption_and_firewall() {
        let body = DATA_LAKE_STORE.schema.expand(store().attributes(), WriteMode::Full).unwrap();
        assert_eq!(
            body,
            json!({
                "location": "eastus2",
                "properties": {
                    "newTier": "Commitment_1TB",
                    "encryptionState": "Enabled",
                    "encryptionConfig": { "type": "ServiceManaged" },
                    "firewallState": "Enabled",
                    "firewallAllowAzureIps": "Enabled",
                }
            })
        );
    }

    #[test]
    fn patch_body_leaves_immutable_settings_out() {
        let mut data = store();
        data.set("firewall_enabled", false);
        let body = DATA_LAKE_STORE.schema.expand(data.attributes(), WriteMode::Patch).unwrap();
        assert_eq!(
            body,
            json!({
                "properties": {
                    "newTier": "Commitment_1TB",
                    "firewallState": "Disabled",
                    "firewallAllowAzureIps": "Enabled",
                    "firewallRules": [],
                },
                "tags": {},
            })
        );
    }

    #[test]
    fn tier_is_read_from_the_current_tier() {
        let remote = json!({
            "location": "eastus2",
            "properties": {
                "newTier": "Commitment_1TB",
                "currentTier": "Consumption",
                "encryptionState": "Enabled",
                "firewallState": "Disabled",
                "firewallAllowAzureIps": "Enabled",
                "endpoint": "store1.azuredatalakestore.net",
            }
        });
        let attributes = DATA_LAKE_STORE.schema.flatten(&remote).unwrap();
        assert_eq!(attributes["tier"], Value::from("Consumption"));
        assert_eq!(attributes["firewall_enabled"], Value::Bool(false));
        assert_eq!(attributes["endpoint"], Value::from("store1.azuredatalakestore.net"));
        assert_eq!(attributes["firewall_rule"], Value::List(vec![]));
        assert!(!attributes.contains_key("encryption_type"));
    }

    #[test]
    fn endpoint_cannot_be_configured() {
        let mut data = store();
        data.set("endpoint", "elsewhere.example.com");
        assert!(matches!(
            DATA_LAKE_STORE.schema.validate(data.attributes()),
            Err(Error::Validation { attribute, .. }) if attribute == "endpoint"
        ));
    }
}
