//! Unit tests for permission-decision wire translation.

use agent_conduit::session::PermissionDecision;
use serde_json::{json, Map, Value};

// ── Allow ────────────────────────────────────────────────────────────────────

/// A bare allow emits only the behavior field.
#[test]
fn bare_allow_translates() {
    let wire = PermissionDecision::Allow {
        updated_input: None,
        updated_permissions: None,
    }
    .to_wire();

    assert_eq!(wire["behavior"], "allow");
    assert!(!wire.contains_key("updatedInput"));
    assert!(!wire.contains_key("updatedPermissions"));
}

/// An allow with updates carries both `camelCase` fields.
#[test]
fn allow_with_updates_translates() {
    let mut updated = Map::new();
    updated.insert("command".into(), Value::String("ls -la".into()));

    let wire = PermissionDecision::Allow {
        updated_input: Some(updated),
        updated_permissions: Some(json!([{ "type": "addRules" }])),
    }
    .to_wire();

    assert_eq!(wire["behavior"], "allow");
    assert_eq!(wire["updatedInput"]["command"], "ls -la");
    assert_eq!(wire["updatedPermissions"][0]["type"], "addRules");
}

// ── Deny ─────────────────────────────────────────────────────────────────────

/// A deny always carries its message.
#[test]
fn deny_translates() {
    let wire = PermissionDecision::Deny {
        message: "not in this workspace".into(),
        interrupt: false,
    }
    .to_wire();

    assert_eq!(wire["behavior"], "deny");
    assert_eq!(wire["message"], "not in this workspace");
    assert!(!wire.contains_key("interrupt"), "false interrupt must be omitted");
}

/// A deny with interrupt set emits the flag.
#[test]
fn deny_with_interrupt_translates() {
    let wire = PermissionDecision::Deny {
        message: "stop".into(),
        interrupt: true,
    }
    .to_wire();

    assert_eq!(wire["interrupt"], true);
}
