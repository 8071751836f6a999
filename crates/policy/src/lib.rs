//! Naming rules and plan-time checks applied to expanded request bodies.

use std::net::Ipv4Addr;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value as Json;
use thiserror::Error;

pub const DATA_LAKE_STORE: &str = "azurerm_data_lake_store";

static AVAILABILITY_TEST_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\A[a-z0-9\-\s]{1,64}\z").expect("failed to compile availability test name regex"));

static DATA_LAKE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\A[a-z0-9]{3,24}\z").expect("failed to compile data lake name regex"));

static RESOURCE_GROUP_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\A[-\w._()]{1,90}\z").expect("failed to compile resource group name regex"));

pub fn availability_test_name(name: &str) -> Result<(), String> {
    if AVAILABILITY_TEST_NAME.is_match(name) {
        return Ok(());
    }
    Err(format!(
        "{name:?} may only contain lowercase letters, numbers, hyphens and spaces, and must be between 1 and 64 characters long"
    ))
}

pub fn data_lake_name(name: &str) -> Result<(), String> {
    if DATA_LAKE_NAME.is_match(name) {
        return Ok(());
    }
    Err(format!("{name:?} may only contain lowercase letters and numbers, and must be between 3 and 24 characters long"))
}

pub fn resource_group_name(name: &str) -> Result<(), String> {
    if name.ends_with('.') {
        return Err(format!("{name:?} cannot end with a period"));
    }
    if RESOURCE_GROUP_NAME.is_match(name) {
        return Ok(());
    }
    Err(format!(
        "{name:?} may only contain alphanumerics, underscores, parentheses, hyphens and periods, and must be between 1 and 90 characters long"
    ))
}

pub fn ipv4_address(address: &str) -> Result<(), String> {
    address
        .parse::<Ipv4Addr>()
        .map(drop)
        .map_err(|_| format!("{address:?} is not a valid IPv4 address"))
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PolicyViolation {
    #[error("policy: {resource} {name:?} disables encryption at rest; pass --allow-unencrypted to permit it")]
    Unencrypted { resource: String, name: String },
}

/// Plan-time checks on request bodies, before anything is sent.
pub struct Policy {
    pub allow_unencrypted: bool,
}

impl Policy {
    pub fn new(allow_unencrypted: bool) -> Self {
        Self { allow_unencrypted }
    }

    pub fn check_request(&self, type_name: &str, name: &str, body: &Json) -> Result<(), PolicyViolation> {
        if type_name == DATA_LAKE_STORE && !self.allow_unencrypted {
            let state = body.pointer("/properties/encryptionState").and_then(Json::as_str);
            if state.is_some_and(|s| s.eq_ignore_ascii_case("Disabled")) {
                return Err(PolicyViolation::Unencrypted { resource: type_name.to_owned(), name: name.to_owned() });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[rstest]
    #[case("webtest1", true)]
    #[case("my web-test", true)]
    #[case("", false)]
    #[case("WebTest", false)]
    #[case("web_test", false)]
    #[case(&"a".repeat(64), true)]
    #[case(&"a".repeat(65), false)]
    fn availability_test_names(#[case] name: &str, #[case] valid: bool) {
        assert_eq!(availability_test_name(name).is_ok(), valid);
    }

    #[rstest]
    #[case("abc", true)]
    #[case("store2024", true)]
    #[case("ab", false)]
    #[case("Store", false)]
    #[case("my-store", false)]
    #[case(&"a".repeat(25), false)]
    fn data_lake_names(#[case] name: &str, #[case] valid: bool) {
        assert_eq!(data_lake_name(name).is_ok(), valid);
    }

    #[rstest]
    #[case("rg1", true)]
    #[case("My_Group.(prod)-1", true)]
    #[case("", false)]
    #[case("group.", false)]
    #[case("has space", false)]
    #[case("a/b", false)]
    #[case(&"g".repeat(91), false)]
    fn resource_group_names(#[case] name: &str, #[case] valid: bool) {
        assert_eq!(resource_group_name(name).is_ok(), valid);
    }

    #[rstest]
    #[case("", false)]
    #[case("0.0.0.0", true)]
    #[case("1.2.3.no", false)]
    #[case("text", false)]
    #[case("255.255.255.255", true)]
    #[case("256.0.0.1", false)]
    #[case("::1", false)]
    fn ipv4_addresses(#[case] address: &str, #[case] valid: bool) {
        assert_eq!(ipv4_address(address).is_ok(), valid);
    }

    #[test]
    fn unencrypted_store_needs_opt_in() {
        let body = json!({ "properties": { "encryptionState": "Disabled" } });
        assert_eq!(
            Policy::new(false).check_request(DATA_LAKE_STORE, "store1", &body),
            Err(PolicyViolation::Unencrypted { resource: DATA_LAKE_STORE.into(), name: "store1".into() })
        );
        assert!(Policy::new(true).check_request(DATA_LAKE_STORE, "store1", &body).is_ok());
    }

    #[test]
    fn other_requests_pass() {
        let encrypted = json!({ "properties": { "encryptionState": "Enabled" } });
        assert!(Policy::new(false).check_request(DATA_LAKE_STORE, "store1", &encrypted).is_ok());
        let unrelated = json!({ "properties": { "encryptionState": "Disabled" } });
        assert!(Policy::new(false).check_request("azurerm_availability_test", "web", &unrelated).is_ok());
    }
}
