use r2arm_core::schema::{field, Check, Coercion, FieldMapping};
use r2arm_policy::ipv4_address;

/// ARM spells both firewall switches as `Enabled` / `Disabled`.
pub const SWITCH: Coercion = Coercion::Toggle { on: "Enabled", off: "Disabled" };

/// One `firewall_rule` block, relative to an element of `properties.firewallRules`.
pub static FIREWALL_RULE_FIELDS: &[FieldMapping] = &[
    field("name", &["name"], Coercion::String).required(),
    field("start_ip_address", &["properties", "startIpAddress"], Coercion::String)
        .required()
        .check(Check::Str(ipv4_address)),
    field("end_ip_address", &["properties", "endIpAddress"], Coercion::String)
        .required()
        .check(Check::Str(ipv4_address)),
];
