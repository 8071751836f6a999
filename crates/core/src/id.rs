//! Composite resource ids.
//!
//! An ARM id addresses one resource through its full path:
//! `/subscriptions/{subscription}/resourceGroups/{group}/providers/{namespace}/{type}/{name}`.
//! User-supplied segments are percent-encoded so that any ASCII resource group
//! or name survives a round trip through a single `/`-separated string.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

const SUBSCRIPTIONS: &str = "subscriptions";
const RESOURCE_GROUPS: &str = "resourceGroups";
const PROVIDERS: &str = "providers";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed resource id {id:?}: {reason}")]
pub struct MalformedIdError {
    pub id: String,
    pub reason: String,
}

impl MalformedIdError {
    fn new(id: &str, reason: impl Into<String>) -> Self {
        Self { id: id.to_owned(), reason: reason.into() }
    }
}

/// Provider namespace plus resource type, e.g. `Microsoft.Insights/webtests`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceType {
    pub namespace: &'static str,
    pub type_name: &'static str,
}

/// The coordinates a resource API needs to address one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceCoordinates {
    pub subscription_id: String,
    pub resource_group: String,
    pub name: String,
}

impl ResourceType {
    pub const fn new(namespace: &'static str, type_name: &'static str) -> Self {
        Self { namespace, type_name }
    }

    pub fn encode(&self, subscription_id: &str, resource_group: &str, name: &str) -> Result<String, MalformedIdError> {
        for (segment, value) in [("subscription", subscription_id), ("resource group", resource_group), ("name", name)] {
            if value.is_empty() {
                return Err(MalformedIdError::new("", format!("{segment} must not be empty")));
            }
        }
        Ok(format!(
            "/{SUBSCRIPTIONS}/{}/{RESOURCE_GROUPS}/{}/{PROVIDERS}/{}/{}/{}",
            escape(subscription_id),
            escape(resource_group),
            self.namespace,
            self.type_name,
            escape(name),
        ))
    }

    pub fn decode(&self, id: &str) -> Result<ResourceCoordinates, MalformedIdError> {
        let parsed = parse_resource_id(id)?;
        if !parsed.provider.eq_ignore_ascii_case(self.namespace) {
            return Err(MalformedIdError::new(id, format!("expected provider namespace `{}`", self.namespace)));
        }
        match parsed.path.as_slice() {
            [(key, name)] if key.eq_ignore_ascii_case(self.type_name) => Ok(ResourceCoordinates {
                subscription_id: parsed.subscription_id,
                resource_group: parsed.resource_group,
                name: name.clone(),
            }),
            _ => Err(MalformedIdError::new(id, format!("expected `{}/<name>` after the provider namespace", self.type_name))),
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.type_name)
    }
}

/// A generic ARM id: the fixed prefix plus every key/value pair below the provider namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedResourceId {
    pub subscription_id: String,
    pub resource_group: String,
    pub provider: String,
    pub path: Vec<(String, String)>,
}

impl ParsedResourceId {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.path
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

pub fn parse_resource_id(id: &str) -> Result<ParsedResourceId, MalformedIdError> {
    if id.is_empty() {
        return Err(MalformedIdError::new(id, "id is empty"));
    }
    let Some(rest) = id.strip_prefix('/') else {
        return Err(MalformedIdError::new(id, "id must start with `/`"));
    };
    let rest = rest.strip_suffix('/').unwrap_or(rest);
    let components: Vec<&str> = rest.split('/').collect();
    if components.iter().any(|c| c.is_empty()) {
        return Err(MalformedIdError::new(id, "id contains an empty segment"));
    }

    let [sub_key, subscription, group_key, group, providers_key, provider, path @ ..] = components.as_slice() else {
        return Err(MalformedIdError::new(id, "id is missing required segments"));
    };
    for (found, expected) in [(sub_key, SUBSCRIPTIONS), (group_key, RESOURCE_GROUPS), (providers_key, PROVIDERS)] {
        if !found.eq_ignore_ascii_case(expected) {
            return Err(MalformedIdError::new(id, format!("expected `{expected}` segment, found `{found}`")));
        }
    }
    if path.is_empty() || path.len() % 2 != 0 {
        return Err(MalformedIdError::new(id, "resource path must consist of type/name pairs"));
    }

    let mut pairs = Vec::with_capacity(path.len() / 2);
    let mut remaining = path;
    while let [key, value, tail @ ..] = remaining {
        pairs.push(((*key).to_owned(), unescape(id, value)?));
        remaining = tail;
    }

    Ok(ParsedResourceId {
        subscription_id: unescape(id, subscription)?,
        resource_group: unescape(id, group)?,
        provider: (*provider).to_owned(),
        path: pairs,
    })
}

fn escape(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}

fn unescape(id: &str, segment: &str) -> Result<String, MalformedIdError> {
    // every escape must be exactly `%HH`
    let well_formed = segment
        .split('%')
        .skip(1)
        .all(|rest| rest.len() >= 2 && rest.as_bytes()[..2].iter().all(u8::is_ascii_hexdigit));
    if !well_formed {
        return Err(MalformedIdError::new(id, format!("invalid percent escape in `{segment}`")));
    }
    urlencoding::decode(segment)
        .map(|decoded| decoded.into_owned())
        .map_err(|_| MalformedIdError::new(id, format!("segment `{segment}` is not valid UTF-8")))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    const WEBTESTS: ResourceType = ResourceType::new("Microsoft.Insights", "webtests");
    const SUB: &str = "00000000-0000-0000-0000-000000000000";

    #[rstest]
    #[case("rg1", "webtest1")]
    #[case("acctestRG_1234", "web test with spaces")]
    #[case("group.with(parens)", "100% / slashes & more?")]
    #[case("a", "~tilde_under-score.dot")]
    fn decode_inverts_encode(#[case] group: &str, #[case] name: &str) {
        let id = WEBTESTS.encode(SUB, group, name).unwrap();
        assert!(!id.contains(' '));
        let coordinates = WEBTESTS.decode(&id).unwrap();
        assert_eq!(coordinates.subscription_id, SUB);
        assert_eq!(coordinates.resource_group, group);
        assert_eq!(coordinates.name, name);
    }

    #[test]
    fn encode_is_deterministic() {
        assert_eq!(
            WEBTESTS.encode(SUB, "rg1", "webtest1").unwrap(),
            format!("/subscriptions/{SUB}/resourceGroups/rg1/providers/Microsoft.Insights/webtests/webtest1")
        );
        assert_eq!(WEBTESTS.encode(SUB, "rg 1", "x").unwrap(), WEBTESTS.encode(SUB, "rg 1", "x").unwrap());
    }

    #[test]
    fn distinct_inputs_stay_distinct() {
        let a = WEBTESTS.encode(SUB, "rg/a", "b").unwrap();
        let b = WEBTESTS.encode(SUB, "rg", "a/b").unwrap();
        assert_ne!(a, b);
        assert_ne!(WEBTESTS.decode(&a).unwrap(), WEBTESTS.decode(&b).unwrap());
    }

    #[rstest]
    #[case("")]
    #[case("garbage")]
    #[case("/subscriptions/s/providers/Microsoft.Insights/webtests/n")]
    #[case("/subscriptions/s/resourceGroups/rg/providers/Microsoft.Insights/webtests")]
    #[case("/subscriptions/s/resourceGroups/rg/providers/Microsoft.Insights/components/n")]
    #[case("/subscriptions/s/resourceGroups/rg/providers/Microsoft.Web/webtests/n")]
    #[case("/subscriptions/s/resourceGroups//providers/Microsoft.Insights/webtests/n")]
    #[case("/subscriptions/s/resourceGroups/rg/providers/Microsoft.Insights/webtests/n%2")]
    #[case("/subscriptions/s/resourceGroups/rg/providers/Microsoft.Insights/webtests/n%+1")]
    #[case("/subscriptions/s/resourceGroups/rg/providers/Microsoft.Insights/webtests/n%zz")]
    #[case("/subscriptions/s/resourceGroups/rg/providers/Microsoft.Insights/webtests/n%C3")]
    #[case("/subscriptions/s/resourceGroups/rg/providers/Microsoft.Insights/webtests/n/extra/child")]
    fn decode_rejects_malformed_ids(#[case] id: &str) {
        assert!(WEBTESTS.decode(id).is_err(), "{id} should be rejected");
    }

    #[test]
    fn escapes_decode_to_their_bytes() {
        let coordinates = WEBTESTS
            .decode("/subscriptions/s/resourceGroups/rg%28a%29/providers/Microsoft.Insights/webtests/caf%C3%A9%20bar")
            .unwrap();
        assert_eq!(coordinates.resource_group, "rg(a)");
        assert_eq!(coordinates.name, "caf\u{e9} bar");
        assert_eq!(WEBTESTS.encode(SUB, "rg", "a b").unwrap().rsplit('/').next(), Some("a%20b"));
    }

    #[test]
    fn encode_rejects_empty_segments() {
        assert!(WEBTESTS.encode(SUB, "", "n").is_err());
        assert!(WEBTESTS.encode(SUB, "rg", "").is_err());
        assert!(WEBTESTS.encode("", "rg", "n").is_err());
    }

    #[test]
    fn segment_keys_match_case_insensitively() {
        let id = "/subscriptions/s/resourcegroups/rg1/providers/microsoft.insights/WebTests/webtest1";
        let coordinates = WEBTESTS.decode(id).unwrap();
        assert_eq!(coordinates.resource_group, "rg1");
        assert_eq!(coordinates.name, "webtest1");
    }

    #[test]
    fn parses_nested_paths() {
        let parsed = parse_resource_id(
            "/subscriptions/s/resourceGroups/rg/providers/Microsoft.DataLakeStore/accounts/store1/firewallRules/allow/",
        )
        .unwrap();
        assert_eq!(parsed.provider, "Microsoft.DataLakeStore");
        assert_eq!(parsed.get("accounts"), Some("store1"));
        assert_eq!(parsed.get("firewallrules"), Some("allow"));
    }
}
