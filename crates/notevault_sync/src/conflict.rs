//! Conflict detection and resolution for concurrently edited records.

use crate::payload::EntityType;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How a conflict should be decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionStrategy {
    /// Take the local version verbatim.
    Local,
    /// Take the remote version verbatim.
    Remote,
    /// Entity-specific merge.
    Merge,
    /// Leave the conflict pending for the user.
    Manual,
}

/// Outcome of resolving a conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConflictResolution {
    /// The conflict was decided; `value` is the record to write back.
    Resolved {
        /// Strategy that produced the value.
        strategy: ResolutionStrategy,
        /// The winning or merged record.
        value: Value,
    },
    /// No decision was made; the conflict must be surfaced to the user.
    Pending,
}

/// Two divergent versions of the same logical record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConflict {
    /// Entity id both sides claim.
    pub id: String,
    /// Kind of record in conflict.
    pub entity_type: EntityType,
    /// Our version.
    pub local_version: Value,
    /// Their version.
    pub remote_version: Value,
    /// When the conflict was detected (unix millis).
    pub timestamp: u64,
    /// Resolution, once decided.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<ConflictResolution>,
}

impl SyncConflict {
    /// Creates an unresolved conflict.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        entity_type: EntityType,
        local_version: Value,
        remote_version: Value,
        timestamp: u64,
    ) -> Self {
        Self {
            id: id.into(),
            entity_type,
            local_version,
            remote_version,
            timestamp,
            resolution: None,
        }
    }

    /// Returns true once a resolution has been recorded.
    pub fn is_resolved(&self) -> bool {
        matches!(self.resolution, Some(ConflictResolution::Resolved { .. }))
    }
}

/// Which settings fields the remote side always wins.
///
/// The field list is policy, not an invariant: account-global fields go
/// here, everything else stays local-preferred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsMergePolicy {
    /// Field names taken from the remote version when present.
    pub remote_fields: Vec<String>,
}

impl Default for SettingsMergePolicy {
    fn default() -> Self {
        Self {
            remote_fields: vec!["syncEnabled".into(), "encryptionEnabled".into()],
        }
    }
}

/// Decides or merges divergent record versions.
///
/// Resolution is a pure function of the conflict and strategy, so
/// resolving the same conflict twice always yields the same output.
#[derive(Debug, Clone, Default)]
pub struct ConflictResolver {
    settings_policy: SettingsMergePolicy,
}

impl ConflictResolver {
    /// Creates a resolver with the default settings policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a resolver with a custom settings merge policy.
    #[must_use]
    pub fn with_settings_policy(policy: SettingsMergePolicy) -> Self {
        Self {
            settings_policy: policy,
        }
    }

    /// Resolves `conflict` with `strategy`.
    ///
    /// `Manual` returns [`ConflictResolution::Pending`]; the conflict is
    /// not dropped and must be surfaced to the caller.
    pub fn resolve(
        &self,
        conflict: &SyncConflict,
        strategy: ResolutionStrategy,
    ) -> ConflictResolution {
        let value = match strategy {
            ResolutionStrategy::Local => conflict.local_version.clone(),
            ResolutionStrategy::Remote => conflict.remote_version.clone(),
            ResolutionStrategy::Manual => return ConflictResolution::Pending,
            ResolutionStrategy::Merge => self.merge(conflict),
        };
        ConflictResolution::Resolved { strategy, value }
    }

    /// Resolves and records the outcome on the conflict itself.
    pub fn resolve_and_mark(
        &self,
        conflict: &mut SyncConflict,
        strategy: ResolutionStrategy,
    ) -> ConflictResolution {
        let resolution = self.resolve(conflict, strategy);
        if matches!(resolution, ConflictResolution::Resolved { .. }) {
            conflict.resolution = Some(resolution.clone());
        }
        resolution
    }

    fn merge(&self, conflict: &SyncConflict) -> Value {
        match conflict.entity_type {
            EntityType::Notes => merge_note(&conflict.local_version, &conflict.remote_version),
            EntityType::Notebooks => {
                merge_notebooks(&conflict.local_version, &conflict.remote_version)
            }
            EntityType::Settings => merge_settings(
                &conflict.local_version,
                &conflict.remote_version,
                &self.settings_policy,
            ),
            EntityType::TagColors => {
                merge_tag_colors(&conflict.local_version, &conflict.remote_version)
            }
        }
    }
}

fn updated_at(value: &Value) -> u64 {
    value.get("updatedAt").and_then(Value::as_u64).unwrap_or(0)
}

fn content_len(value: &Value) -> usize {
    value
        .get("content")
        .and_then(Value::as_str)
        .map(str::len)
        .unwrap_or(0)
}

/// Later `updatedAt` wins. On an exact tie, keep the longer content
/// body and the union of both tag sets, stamped with a fresh (but
/// deterministic) `updatedAt` one tick past the tie.
fn merge_note(local: &Value, remote: &Value) -> Value {
    let (local_ts, remote_ts) = (updated_at(local), updated_at(remote));
    if local_ts > remote_ts {
        return local.clone();
    }
    if remote_ts > local_ts {
        return remote.clone();
    }

    let (base, other) = if content_len(local) >= content_len(remote) {
        (local, remote)
    } else {
        (remote, local)
    };

    let mut merged = base.clone();
    if let Value::Object(map) = &mut merged {
        let mut tags: Vec<Value> = base
            .get("tags")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for tag in other.get("tags").and_then(Value::as_array).into_iter().flatten() {
            if !tags.contains(tag) {
                tags.push(tag.clone());
            }
        }
        if !tags.is_empty() {
            map.insert("tags".into(), Value::Array(tags));
        }
        map.insert("updatedAt".into(), Value::from(local_ts + 1));
    }
    merged
}

/// Union by notebook id, preferring the more recently updated version
/// of each id. Local ordering first, then remote-only ids.
fn merge_notebooks(local: &Value, remote: &Value) -> Value {
    let empty = Vec::new();
    let local_books = local.as_array().unwrap_or(&empty);
    let remote_books = remote.as_array().unwrap_or(&empty);

    let find = |books: &[Value], id: &str| -> Option<Value> {
        books
            .iter()
            .find(|b| b.get("id").and_then(Value::as_str) == Some(id))
            .cloned()
    };

    let mut merged = Vec::new();
    let mut seen = Vec::new();
    for book in local_books {
        let Some(id) = book.get("id").and_then(Value::as_str) else {
            merged.push(book.clone());
            continue;
        };
        seen.push(id.to_string());
        match find(remote_books, id) {
            Some(theirs) if updated_at(&theirs) > updated_at(book) => merged.push(theirs),
            _ => merged.push(book.clone()),
        }
    }
    for book in remote_books {
        match book.get("id").and_then(Value::as_str) {
            Some(id) if seen.iter().any(|s| s == id) => {}
            _ => merged.push(book.clone()),
        }
    }
    Value::Array(merged)
}

/// Prefer local for UI-preference fields, remote for the explicitly
/// enumerated account-global fields.
fn merge_settings(local: &Value, remote: &Value, policy: &SettingsMergePolicy) -> Value {
    let mut merged = match local {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    if let Value::Object(remote_map) = remote {
        for field in &policy.remote_fields {
            if let Some(value) = remote_map.get(field) {
                merged.insert(field.clone(), value.clone());
            }
        }
    }
    Value::Object(merged)
}

/// Union of both color maps; remote wins on a collision since tag
/// colors follow the account, not the device.
fn merge_tag_colors(local: &Value, remote: &Value) -> Value {
    let mut merged = match local {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    if let Value::Object(remote_map) = remote {
        for (tag, color) in remote_map {
            merged.insert(tag.clone(), color.clone());
        }
    }
    Value::Object(merged)
}
