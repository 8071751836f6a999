//! `azurerm_availability_test`: an Application Insights web test.
//!
//! The service has no PATCH for web tests, so updates re-send the whole body.
//! The resource name doubles as the synthetic monitor id and the display name.

use serde_json::{json, Value as Json};

use r2arm_core::schema::{field, Check, Coercion, CustomCoercion, EnumTable, Fallback, FieldMapping, Schema};
use r2arm_core::{ResourceDefinition, ResourceType, UpdateStyle, Value};
use r2arm_policy::{availability_test_name, resource_group_name};

use crate::normalize::{normalize_location, LOCATION, TAGS};

pub const TYPE_NAME: &str = "azurerm_availability_test";
pub const WEB_TESTS: ResourceType = ResourceType::new("Microsoft.Insights", "webtests");

pub static WEB_TEST_KIND: EnumTable = EnumTable { name: "kind", variants: &[("ping", "ping"), ("multistep", "multistep")] };

pub const FREQUENCIES: &[i64] = &[300, 600, 900];

fn expand_geo_locations(value: &Value) -> Result<Json, String> {
    let items = value
        .as_list()
        .ok_or_else(|| format!("expected a list, found a {}", value.type_name()))?;
    items
        .iter()
        .enumerate()
        .map(|(i, item)| match item.as_str() {
            Some(location) if !location.trim().is_empty() => Ok(json!({ "Id": normalize_location(location) })),
            Some(_) => Err(format!("entry {i} must not be empty")),
            None => Err(format!("entry {i}: expected a string, found a {}", item.type_name())),
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Json::Array)
}

fn flatten_geo_locations(json: &Json) -> Result<Value, String> {
    let items = json.as_array().ok_or_else(|| format!("expected an array, found {json}"))?;
    items
        .iter()
        .map(|item| {
            item.get("Id")
                .and_then(Json::as_str)
                .map(|id| Value::from(normalize_location(id)))
                .ok_or_else(|| format!("expected a location with an `Id`, found {item}"))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Value::List)
}

fn no_geo_locations() -> Value {
    Value::List(Vec::new())
}

/// Test locations, normalized the same way as the resource's own location.
static GEO_LOCATIONS: CustomCoercion = CustomCoercion {
    name: "locations",
    expand: expand_geo_locations,
    flatten: flatten_geo_locations,
    absent: Some(no_geo_locations),
};

static FIELDS: &[FieldMapping] = &[
    field("name", &[], Coercion::String)
        .required()
        .immutable()
        .write_only()
        .check(Check::Str(availability_test_name)),
    field("name", &["properties", "SyntheticMonitorId"], Coercion::String).write_only(),
    field("name", &["properties", "Name"], Coercion::String).write_only(),
    field("resource_group_name", &[], Coercion::String)
        .required()
        .immutable()
        .write_only()
        .check(Check::Str(resource_group_name)),
    field("location", &["location"], Coercion::Custom(&LOCATION)).required().immutable().normalized(),
    field("kind", &["kind"], Coercion::Enum(&WEB_TEST_KIND)).default_to(Fallback::Str("ping")).normalized(),
    field("kind", &["properties", "Kind"], Coercion::Enum(&WEB_TEST_KIND))
        .default_to(Fallback::Str("ping"))
        .write_only(),
    field("description", &["properties", "Description"], Coercion::String),
    field("enabled", &["properties", "Enabled"], Coercion::Bool).default_to(Fallback::Bool(true)),
    field("frequency", &["properties", "Frequency"], Coercion::Int32)
        .default_to(Fallback::Int(300))
        .check(Check::OneOf(FREQUENCIES)),
    field("timeout", &["properties", "Timeout"], Coercion::Int32).default_to(Fallback::Int(30)),
    field("retry_enabled", &["properties", "RetryEnabled"], Coercion::Bool).default_to(Fallback::Bool(true)),
    field("locations", &["properties", "Locations"], Coercion::Custom(&GEO_LOCATIONS))
        .required()
        .normalized(),
    field("configuration", &["properties", "Configuration", "WebTest"], Coercion::String),
    field("tags", &["tags"], Coercion::Custom(&TAGS)),
];

pub static AVAILABILITY_TEST: ResourceDefinition = ResourceDefinition {
    type_name: TYPE_NAME,
    display_name: "Web Test",
    resource_type: WEB_TESTS,
    schema: Schema::new(FIELDS),
    update_style: UpdateStyle::Put,
};

#[cfg(test)]
mod tests {
    use r2arm_core::schema::WriteMode;
    use r2arm_core::{Error, ResourceData};
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    fn config(overrides: Json) -> ResourceData {
        let mut base = json!({
            "name": "webtest1",
            "resource_group_name": "rg1",
            "location": "West US",
            "locations": ["us-tx-sn1-azr", "emea-nl-ams-azr"],
        });
        if let (Some(base), Json::Object(extra)) = (base.as_object_mut(), overrides) {
            base.extend(extra);
        }
        ResourceData::from_json(base).unwrap()
    }

    #[test]
    fn expands_with_modeled_defaults() {
        let body = AVAILABILITY_TEST.schema.expand(config(json!({})).attributes(), WriteMode::Full).unwrap();
        assert_eq!(
            body,
            json!({
                "location": "westus",
                "kind": "ping",
                "properties": {
                    "SyntheticMonitorId": "webtest1",
                    "Name": "webtest1",
                    "Kind": "ping",
                    "Enabled": true,
                    "Frequency": 300,
                    "Timeout": 30,
                    "RetryEnabled": true,
                    "Locations": [{ "Id": "us-tx-sn1-azr" }, { "Id": "emea-nl-ams-azr" }],
                }
            })
        );
    }

    #[test]
    fn kind_is_case_insensitive() {
        let body = AVAILABILITY_TEST
            .schema
            .expand(config(json!({ "kind": "MultiStep", "configuration": "<WebTest/>" })).attributes(), WriteMode::Full)
            .unwrap();
        assert_eq!(body["kind"], "multistep");
        assert_eq!(body["properties"]["Kind"], "multistep");
        assert_eq!(body["properties"]["Configuration"]["WebTest"], "<WebTest/>");
    }

    #[test]
    fn geo_locations_are_normalized_both_ways() {
        let data = config(json!({ "locations": ["US-TX-SN1-AZR", "West Europe"] }));
        let body = AVAILABILITY_TEST.schema.expand(data.attributes(), WriteMode::Full).unwrap();
        assert_eq!(body["properties"]["Locations"], json!([{ "Id": "us-tx-sn1-azr" }, { "Id": "westeurope" }]));

        let remote = json!({ "location": "westus", "properties": { "Locations": [{ "Id": "North Europe" }] } });
        let flattened = AVAILABILITY_TEST.schema.flatten(&remote).unwrap();
        assert_eq!(flattened["locations"], Value::from(vec!["northeurope"]));
    }

    #[rstest]
    #[case(json!({ "name": "WebTest" }), "name")]
    #[case(json!({ "resource_group_name": "rg." }), "resource_group_name")]
    #[case(json!({ "kind": "standard" }), "kind")]
    #[case(json!({ "frequency": 301 }), "frequency")]
    #[case(json!({ "locations": "westus" }), "locations")]
    #[case(json!({ "locations": ["westus", 1] }), "locations")]
    #[case(json!({ "location": "" }), "location")]
    fn rejects_invalid_configuration(#[case] overrides: Json, #[case] attribute: &str) {
        match AVAILABILITY_TEST.schema.validate(config(overrides).attributes()) {
            Err(Error::Validation { attribute: found, .. }) => assert_eq!(found, attribute),
            other => panic!("expected a validation error for {attribute}, got {other:?}"),
        }
    }

    #[rstest]
    #[case(300)]
    #[case(600)]
    #[case(900)]
    fn accepts_supported_frequencies(#[case] frequency: i64) {
        AVAILABILITY_TEST.schema.validate(config(json!({ "frequency": frequency })).attributes()).unwrap();
    }
}
