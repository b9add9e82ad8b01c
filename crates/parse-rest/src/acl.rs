//! Access control lists.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

const PUBLIC: &str = "*";

/// Read/write permission for one principal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRule {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub read: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub write: bool,
}

/// Per-object permissions keyed by `*`, a user id, or `role:<name>`.
///
/// Serialized as the server expects under the `ACL` key:
/// `{"*": {"read": true}, "u1": {"read": true, "write": true}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Acl {
    entries: BTreeMap<String, AccessRule>,
}

impl Acl {
    /// An empty ACL (only the master key may access the object).
    pub fn new() -> Self {
        Self::default()
    }

    /// An ACL granting read and write to the given user only.
    pub fn for_user(user_id: &str) -> Self {
        let mut acl = Self::new();
        acl.set_read_access(user_id, true);
        acl.set_write_access(user_id, true);
        acl
    }

    pub fn public_read(&self) -> bool {
        self.rule(PUBLIC).read
    }

    pub fn public_write(&self) -> bool {
        self.rule(PUBLIC).write
    }

    pub fn set_public_read(&mut self, allowed: bool) {
        self.set(PUBLIC, |rule| rule.read = allowed);
    }

    pub fn set_public_write(&mut self, allowed: bool) {
        self.set(PUBLIC, |rule| rule.write = allowed);
    }

    pub fn read_access(&self, user_id: &str) -> bool {
        self.rule(user_id).read
    }

    pub fn write_access(&self, user_id: &str) -> bool {
        self.rule(user_id).write
    }

    pub fn set_read_access(&mut self, user_id: &str, allowed: bool) {
        self.set(user_id, |rule| rule.read = allowed);
    }

    pub fn set_write_access(&mut self, user_id: &str, allowed: bool) {
        self.set(user_id, |rule| rule.write = allowed);
    }

    pub fn role_read_access(&self, role: &str) -> bool {
        self.rule(&role_key(role)).read
    }

    pub fn role_write_access(&self, role: &str) -> bool {
        self.rule(&role_key(role)).write
    }

    pub fn set_role_read_access(&mut self, role: &str, allowed: bool) {
        self.set(&role_key(role), |rule| rule.read = allowed);
    }

    pub fn set_role_write_access(&mut self, role: &str, allowed: bool) {
        self.set(&role_key(role), |rule| rule.write = allowed);
    }

    /// Whether no principal has any access.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn rule(&self, key: &str) -> AccessRule {
        self.entries.get(key).copied().unwrap_or_default()
    }

    fn set(&mut self, key: &str, change: impl FnOnce(&mut AccessRule)) {
        let mut rule = self.rule(key);
        change(&mut rule);
        // Entries granting nothing are dropped so the wire form stays minimal.
        if rule.read || rule.write {
            self.entries.insert(key.to_string(), rule);
        } else {
            self.entries.remove(key);
        }
    }
}

fn role_key(role: &str) -> String {
    format!("role:{}", role)
}
