//! Typed views over the status documents the monitor consumes.
//!
//! Both `isMaster` and `replSetGetStatus` replies are permissively parsed:
//! every field is optional, and a field of the wrong type is treated the same
//! as an absent one. Servers of different versions disagree about these
//! shapes, so unknown or malformed fields are never an error.

use serde_json::Value;

/// Member state code for a primary in `replSetGetStatus`.
pub const MEMBER_STATE_PRIMARY: i64 = 1;
/// Member state code for a secondary in `replSetGetStatus`.
pub const MEMBER_STATE_SECONDARY: i64 = 2;

/// Topology hints extracted from an `isMaster` status document.
#[derive(Debug, Clone, Default)]
pub struct IsMasterReply {
    /// Addresses of electable members, as `"host:port"` strings.
    pub hosts: Vec<String>,
    /// Addresses of passive (non-electable) members.
    pub passives: Vec<String>,
    /// The member's view of the current primary, if it reports one.
    pub primary: Option<String>,
}

impl IsMasterReply {
    /// Extracts the optional `hosts`, `passives` and `primary` fields from a
    /// status document. Missing or wrong-typed fields yield empty values;
    /// non-string entries inside the arrays are skipped.
    pub fn parse(doc: &Value) -> Self {
        Self {
            hosts: string_array(doc.get("hosts")),
            passives: string_array(doc.get("passives")),
            primary: doc
                .get("primary")
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }
}

/// One entry of the `members` array in a `replSetGetStatus` reply.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberStatus {
    /// Member address as `"host:port"`.
    pub name: String,
    /// Replica-set member state code.
    pub state: i64,
    /// Health indicator; `1` means the reporting member can reach this one.
    pub health: i64,
}

impl MemberStatus {
    /// A member counts as healthy when it is reachable and is currently
    /// acting as primary or secondary. Arbiters, recovering members and
    /// unreachable members all count as unhealthy for routing purposes.
    pub fn is_healthy(&self) -> bool {
        self.health == 1
            && (self.state == MEMBER_STATE_PRIMARY || self.state == MEMBER_STATE_SECONDARY)
    }
}

/// The subset of a `replSetGetStatus` reply the monitor reconciles against.
#[derive(Debug, Clone, Default)]
pub struct ReplSetStatus {
    pub members: Vec<MemberStatus>,
}

impl ReplSetStatus {
    /// Extracts the `members` array. Entries without a string `name` are
    /// skipped; missing `state`/`health` numbers default to values that make
    /// the member unhealthy.
    pub fn parse(doc: &Value) -> Self {
        let members = match doc.get("members").and_then(Value::as_array) {
            Some(entries) => entries
                .iter()
                .filter_map(|entry| {
                    let name = entry.get("name")?.as_str()?.to_string();
                    Some(MemberStatus {
                        name,
                        state: number_field(entry, "state"),
                        health: number_field(entry, "health"),
                    })
                })
                .collect(),
            None => Vec::new(),
        };
        Self { members }
    }
}

fn string_array(value: Option<&Value>) -> Vec<String> {
    match value.and_then(Value::as_array) {
        Some(entries) => entries
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        None => Vec::new(),
    }
}

/// Servers report these numbers as either integers or doubles.
fn number_field(doc: &Value, field: &str) -> i64 {
    doc.get(field)
        .and_then(Value::as_f64)
        .map(|n| n as i64)
        .unwrap_or(-1)
}
