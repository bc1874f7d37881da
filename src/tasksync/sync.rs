//! # Applying Sync Responses
//!
//! After the flush collaborator transmits a drained batch, the server answers
//! with a per-command status, the permanent ids it assigned to temp ids, and
//! the authoritative state of every section the batch touched. Applying that
//! answer is what moves the cache from optimistic to confirmed state:
//!
//! 1. Record each temp id pairing in the shared [`TempIdMap`](crate::id::TempIdMap).
//!    Mapping values are always read as permanent ids.
//! 2. Store each returned section. Soft-deleted ones drop out of the cache.
//!    A returned id spelled like one of the assigned permanent ids is taken as
//!    that permanent id even when it reads as a UUID.
//! 3. Rewrite any temp ids still held by cached records.
//! 4. Report commands the server rejected.

use crate::cache::{Cache, StoreOutcome};
use crate::id::{self, Id};
use crate::model::Section;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use tracing::warn;
use uuid::Uuid;

/// Server verdict for one command, keyed by the command's token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CommandStatus {
    /// `"ok"` on success.
    Text(String),
    Error { error_code: i64, error: String },
}

impl CommandStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, CommandStatus::Text(s) if s == "ok")
    }

    pub fn error_message(&self) -> Option<String> {
        match self {
            CommandStatus::Text(s) if s == "ok" => None,
            CommandStatus::Text(s) => Some(s.clone()),
            CommandStatus::Error { error_code, error } => {
                Some(format!("{} (code {})", error, error_code))
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SyncResponse {
    #[serde(default)]
    pub sync_status: HashMap<Uuid, CommandStatus>,
    #[serde(default, deserialize_with = "id::deserialize_mapping")]
    pub temp_id_mapping: HashMap<Uuid, Id>,
    #[serde(default)]
    pub sections: Vec<Section>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Sections inserted or replaced.
    pub stored: usize,
    /// Sections evicted because the server reported them deleted.
    pub removed: usize,
    /// Cached records whose temp ids were rewritten.
    pub remapped: usize,
    /// Rejected commands, ordered by token.
    pub failed: Vec<(Uuid, String)>,
}

pub(crate) fn apply(response: SyncResponse, cache: &Cache<Section>) -> SyncReport {
    let mut report = SyncReport::default();

    let mut assigned = HashSet::new();
    for (temp, permanent) in &response.temp_id_mapping {
        if cache.ids().insert(*temp, permanent) {
            assigned.insert(permanent.to_string());
        }
    }

    for mut section in response.sections {
        confirm_assigned(&mut section.entity.id, &assigned);
        if let Some(project_id) = section.project_id.as_mut() {
            confirm_assigned(project_id, &assigned);
        }
        match cache.store(section) {
            StoreOutcome::Inserted | StoreOutcome::Replaced => report.stored += 1,
            StoreOutcome::Removed => report.removed += 1,
            StoreOutcome::Ignored => {}
        }
    }

    report.remapped = cache.remap_ids();

    for (uuid, status) in &response.sync_status {
        if let Some(message) = status.error_message() {
            warn!(%uuid, %message, "command rejected");
            report.failed.push((*uuid, message));
        }
    }
    report.failed.sort();

    report
}

fn confirm_assigned(id: &mut Id, assigned: &HashSet<String>) {
    if let Id::Temp(uuid) = id {
        let spelled = uuid.hyphenated().to_string();
        if assigned.contains(&spelled) {
            *id = Id::Permanent(spelled);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::TempIdMap;
    use crate::model::NewSectionOpts;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn parses_statuses_and_mappings() {
        let ok = Uuid::new_v4();
        let bad = Uuid::new_v4();
        let temp = Uuid::new_v4();
        let response: SyncResponse = serde_json::from_value(json!({
            "sync_status": {
                ok.to_string(): "ok",
                bad.to_string(): { "error_code": 15, "error": "Invalid temporary id" }
            },
            "temp_id_mapping": { temp.to_string(): 7025 },
            "sections": []
        }))
        .unwrap();

        assert!(response.sync_status[&ok].is_ok());
        assert_eq!(
            response.sync_status[&bad].error_message().as_deref(),
            Some("Invalid temporary id (code 15)")
        );
        assert_eq!(response.temp_id_mapping[&temp], Id::permanent("7025"));
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let response: SyncResponse = serde_json::from_value(json!({})).unwrap();
        assert_eq!(response, SyncResponse::default());
    }

    #[test]
    fn apply_rekeys_and_replaces_local_section() {
        let cache = Cache::new(Arc::new(TempIdMap::new()));
        let local = Section::new("work", NewSectionOpts::default()).unwrap();
        let temp = local.id().as_temp().unwrap();
        cache.store(local.clone());

        let mut echo = local.clone();
        echo.entity.id = Id::permanent("7025");
        echo.section_order = Some(1);

        let report = apply(
            SyncResponse {
                temp_id_mapping: HashMap::from([(temp, Id::permanent("7025"))]),
                sections: vec![echo],
                ..SyncResponse::default()
            },
            &cache,
        );

        assert_eq!(report.stored, 1);
        assert_eq!(cache.len(), 1);
        let cached = cache.resolve(local.id()).unwrap();
        assert_eq!(cached.id(), &Id::permanent("7025"));
        assert_eq!(cached.section_order, Some(1));
    }

    #[test]
    fn apply_evicts_deleted_sections_and_reports_failures() {
        let cache = Cache::new(Arc::new(TempIdMap::new()));
        let mut gone = Section::new("old", NewSectionOpts::default()).unwrap();
        gone.entity.id = Id::permanent("1");
        cache.store(gone.clone());
        gone.entity.is_deleted = true;

        let rejected = Uuid::new_v4();
        let report = apply(
            SyncResponse {
                sync_status: HashMap::from([(
                    rejected,
                    CommandStatus::Error {
                        error_code: 20,
                        error: "Section not found".to_string(),
                    },
                )]),
                sections: vec![gone],
                ..SyncResponse::default()
            },
            &cache,
        );

        assert!(cache.is_empty());
        assert_eq!(report.removed, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, rejected);
    }

    #[test]
    fn uuid_shaped_permanent_ids_are_recorded() {
        let cache = Cache::new(Arc::new(TempIdMap::new()));
        let local = Section::new("work", NewSectionOpts::default()).unwrap();
        let temp = local.id().as_temp().unwrap();
        cache.store(local.clone());

        let simple = "0123456789abcdef0123456789abcdef";
        let response: SyncResponse = serde_json::from_value(json!({
            "temp_id_mapping": { temp.to_string(): simple }
        }))
        .unwrap();
        let report = apply(response, &cache);

        assert_eq!(cache.ids().len(), 1);
        assert_eq!(cache.ids().get(&temp), Some(Id::permanent(simple)));
        assert_eq!(report.remapped, 1);
        assert_eq!(cache.get_all()[0].id(), &Id::permanent(simple));
    }

    #[test]
    fn hyphenated_permanent_id_echo_replaces_local_section() {
        let cache = Cache::new(Arc::new(TempIdMap::new()));
        let local = Section::new("work", NewSectionOpts::default()).unwrap();
        let temp = local.id().as_temp().unwrap();
        cache.store(local);

        let server = Uuid::new_v4().hyphenated().to_string();
        let response: SyncResponse = serde_json::from_value(json!({
            "temp_id_mapping": { temp.to_string(): server.clone() },
            "sections": [{ "id": server.clone(), "name": "work", "section_order": 3 }]
        }))
        .unwrap();
        let report = apply(response, &cache);

        assert_eq!(report.stored, 1);
        assert_eq!(cache.len(), 1);
        let cached = cache.resolve(&Id::Temp(temp)).unwrap();
        assert_eq!(cached.id(), &Id::Permanent(server));
        assert_eq!(cached.section_order, Some(3));
    }
}
