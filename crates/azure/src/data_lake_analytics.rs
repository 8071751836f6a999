use r2arm_core::schema::{field, Check, Coercion, EnumTable, Fallback, FieldMapping, Schema};
use r2arm_core::{ResourceDefinition, ResourceType, UpdateStyle};
use r2arm_policy::{data_lake_name, resource_group_name};

use crate::firewall::{FIREWALL_RULE_FIELDS, SWITCH};
use crate::normalize::{LOCATION, TAGS};

pub const TYPE_NAME: &str = "azurerm_data_lake_analytics_account";
pub const ACCOUNTS: ResourceType = ResourceType::new("Microsoft.DataLakeAnalytics", "accounts");

pub static ANALYTICS_TIER: EnumTable = EnumTable {
    name: "tier",
    variants: &[
        ("Consumption", "Consumption"),
        ("Commitment_100AUHours", "Commitment_100AUHours"),
        ("Commitment_500AUHours", "Commitment_500AUHours"),
        ("Commitment_1000AUHours", "Commitment_1000AUHours"),
        ("Commitment_5000AUHours", "Commitment_5000AUHours"),
        ("Commitment_10000AUHours", "Commitment_10000AUHours"),
        ("Commitment_50000AUHours", "Commitment_50000AUHours"),
        ("Commitment_100000AUHours", "Commitment_100000AUHours"),
        ("Commitment_500000AUHours", "Commitment_500000AUHours"),
    ],
};

static FIELDS: &[FieldMapping] = &[
    field("name", &[], Coercion::String).required().immutable().write_only().check(Check::Str(data_lake_name)),
    field("resource_group_name", &[], Coercion::String)
        .required()
        .immutable()
        .write_only()
        .check(Check::Str(resource_group_name)),
    field("location", &["location"], Coercion::Custom(&LOCATION)).required().immutable().normalized(),
    field("default_data_lake_store_account_name", &["properties", "defaultDataLakeStoreAccount"], Coercion::String)
        .required()
        .immutable()
        .check(Check::Str(data_lake_name)),
    field("data_lake_store_accounts", &["properties", "dataLakeStoreAccounts"], Coercion::StringList { item_key: Some("name") })
        .required()
        .check(Check::Str(data_lake_name)),
    field("firewall_enabled", &["properties", "firewallState"], SWITCH).default_to(Fallback::Bool(false)),
    field("firewall_allow_azure_ips", &["properties", "firewallAllowAzureIps"], SWITCH).default_to(Fallback::Bool(false)),
    field("firewall_rule", &["properties", "firewallRules"], Coercion::Blocks(FIREWALL_RULE_FIELDS)),
    field("max_job_count", &["properties", "maxJobCount"], Coercion::Int32).default_to(Fallback::Int(1)),
    field("max_degree_of_parallelism", &["properties", "maxDegreeOfParallelism"], Coercion::Int32).default_to(Fallback::Int(1)),
    field("max_degree_of_parallelism_per_job", &["properties", "maxDegreeOfParallelismPerJob"], Coercion::Int32)
        .default_to(Fallback::Int(1)),
    field("min_priority_per_job", &["properties", "minPriorityPerJob"], Coercion::Int32).default_to(Fallback::Int(1)),
    field("query_retention", &["properties", "queryStoreRetention"], Coercion::Int32)
        .default_to(Fallback::Int(30))
        .check(Check::IntRange(1, 180)),
    field("tier", &["properties", "newTier"], Coercion::Enum(&ANALYTICS_TIER))
        .read_from(&["properties", "currentTier"])
        .default_to(Fallback::Str("Consumption"))
        .normalized(),
    field("tags", &["tags"], Coercion::Custom(&TAGS)),
];

pub static DATA_LAKE_ANALYTICS: ResourceDefinition = ResourceDefinition {
    type_name: TYPE_NAME,
    display_name: "Data Lake Analytics",
    resource_type: ACCOUNTS,
    schema: Schema::new(FIELDS),
    update_style: UpdateStyle::Patch,
};
