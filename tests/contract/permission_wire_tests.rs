//! Contract tests pinning permission-decision wire shapes.

use agent_conduit::session::PermissionDecision;
use serde_json::{json, Map, Value};

/// `{"behavior":"allow","updatedInput":…,"updatedPermissions":…}`
#[test]
fn allow_shape() {
    let mut updated = Map::new();
    updated.insert("command".into(), Value::String("ls".into()));

    let wire = PermissionDecision::Allow {
        updated_input: Some(updated),
        updated_permissions: Some(json!([{ "type": "addRules", "rules": [] }])),
    }
    .to_wire();

    assert_eq!(
        Value::Object(wire),
        json!({
            "behavior": "allow",
            "updatedInput": { "command": "ls" },
            "updatedPermissions": [{ "type": "addRules", "rules": [] }],
        })
    );
}

/// `{"behavior":"deny","message":…,"interrupt":true}`
#[test]
fn deny_shape() {
    let wire = PermissionDecision::Deny {
        message: "outside the workspace".into(),
        interrupt: true,
    }
    .to_wire();

    assert_eq!(
        Value::Object(wire),
        json!({
            "behavior": "deny",
            "message": "outside the workspace",
            "interrupt": true,
        })
    );
}
