//! Record store over a flat key-value backend
//!
//! Storage layout:
//! ```text
//! consultationRequests -> [ConsultationRequest, ...]   (insertion order)
//! clientProject        -> ProjectState                (singleton)
//! ```
//!
//! Every mutation reads the whole value, changes it and writes the whole
//! value back. Mutations through one `RecordStore` are serialized; separate
//! processes sharing a backend are last-write-wins.
//!
//! Mutations edit the stored JSON document in place rather than a typed
//! copy of it, so fields and elements the typed records cannot represent
//! are written back untouched. Text that is not JSON at all reads as absent.

use crate::records::types::*;
use crate::storage::KeyValueStore;
use crate::{Error, Result};
use chrono::{SubsecRound, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Ids handed out by every `RecordStore` in the process
static IDS: IdGenerator = IdGenerator::new();

/// Typed access to consultation requests and the project singleton
pub struct RecordStore {
    storage: Arc<dyn KeyValueStore>,
    write_lock: Mutex<()>,
}

impl RecordStore {
    /// Create a record store over `storage`
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self {
            storage,
            write_lock: Mutex::new(()),
        }
    }

    /// Underlying key-value backend
    pub fn storage(&self) -> &Arc<dyn KeyValueStore> {
        &self.storage
    }

    // =========================================================================
    // Consultation requests
    // =========================================================================

    /// All consultation requests in insertion order.
    ///
    /// Absent or unparsable data reads as an empty list. Stored entries that
    /// do not decode as a request are skipped here but stay in storage.
    pub async fn list_consultation_requests(&self) -> Result<Vec<ConsultationRequest>> {
        let requests = self.read_collection(CONSULTATION_REQUESTS_KEY).await?;
        Ok(requests
            .into_iter()
            .enumerate()
            .filter_map(|(index, entry)| match serde_json::from_value(entry) {
                Ok(request) => Some(request),
                Err(e) => {
                    tracing::warn!(index, "Skipping undecodable consultation request: {}", e);
                    None
                }
            })
            .collect())
    }

    /// Get a consultation request by ID
    pub async fn get_consultation_request(
        &self,
        id: RecordId,
    ) -> Result<Option<ConsultationRequest>> {
        let requests = self.list_consultation_requests().await?;
        Ok(requests.into_iter().find(|r| r.id == id))
    }

    /// Append a new consultation request (id, status and date are store-assigned)
    pub async fn save_consultation_request(
        &self,
        req: NewConsultationRequest,
    ) -> Result<ConsultationRequest> {
        let _guard = self.write_lock.lock().await;
        let mut requests = self.read_collection(CONSULTATION_REQUESTS_KEY).await?;

        let mut details = req.details;
        for reserved in ["id", "status", "date"] {
            details.remove(reserved);
        }

        let request = ConsultationRequest {
            id: IDS.next_after(max_id(&requests)),
            status: ConsultationStatus::New,
            date: Utc::now().trunc_subsecs(3),
            details,
        };

        requests.push(serde_json::to_value(&request)?);
        self.write_json(CONSULTATION_REQUESTS_KEY, &requests).await?;

        tracing::debug!(id = request.id, "Saved consultation request");
        Ok(request)
    }

    /// Set the status of the first request with `id`.
    ///
    /// Returns `false` and leaves storage untouched when no request matches.
    pub async fn update_consultation_status(
        &self,
        id: RecordId,
        status: impl Into<ConsultationStatus>,
    ) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut requests = self.read_collection(CONSULTATION_REQUESTS_KEY).await?;

        let Some(request) = requests
            .iter_mut()
            .filter_map(Value::as_object_mut)
            .find(|r| r.get("id").and_then(Value::as_u64) == Some(id))
        else {
            tracing::debug!(id, "Consultation request not found, status unchanged");
            return Ok(false);
        };
        let status: ConsultationStatus = status.into();
        request.insert("status".to_string(), serde_json::to_value(&status)?);

        self.write_json(CONSULTATION_REQUESTS_KEY, &requests).await?;
        tracing::debug!(id, status = %status, "Updated consultation status");
        Ok(true)
    }

    // =========================================================================
    // Project state
    // =========================================================================

    /// Stored project state, or the built-in default when absent or unparsable.
    ///
    /// A stored project that is valid JSON of the wrong shape is an
    /// [`Error::Schema`], never silently replaced by the default.
    pub async fn get_project_state(&self) -> Result<ProjectState> {
        match self.read_value(CLIENT_PROJECT_KEY).await? {
            Some(value) => decode_project(value),
            None => Ok(default_project()),
        }
    }

    /// Overwrite the project state
    pub async fn save_project_state(&self, state: &ProjectState) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write_json(CLIENT_PROJECT_KEY, state).await
    }

    /// Drop the stored project so the default is served again
    pub async fn reset_project_state(&self) -> Result<ProjectState> {
        let _guard = self.write_lock.lock().await;
        self.storage.remove_item(CLIENT_PROJECT_KEY).await?;
        tracing::info!("Project state reset to default");
        Ok(default_project())
    }

    /// Prepend an update to the project feed
    pub async fn add_project_update(&self, update: NewProjectUpdate) -> Result<ProjectUpdate> {
        let _guard = self.write_lock.lock().await;
        let mut project = self.read_project_document().await?;
        let updates = project_list(&mut project, "updates")?;

        let update = ProjectUpdate {
            id: IDS.next_after(max_id(updates)),
            title: update.title,
            description: update.description,
            time: JUST_NOW.to_string(),
            icon: update.icon,
            extra: update.extra,
        };

        updates.insert(0, serde_json::to_value(&update)?);
        self.write_json(CLIENT_PROJECT_KEY, &project).await?;

        tracing::debug!(id = update.id, "Added project update");
        Ok(update)
    }

    /// Append an item to the project timeline
    pub async fn add_timeline_item(&self, item: NewTimelineItem) -> Result<TimelineItem> {
        let _guard = self.write_lock.lock().await;
        let mut project = self.read_project_document().await?;
        let timeline = project_list(&mut project, "timeline")?;

        let item = TimelineItem {
            id: IDS.next_after(max_id(timeline)),
            title: item.title,
            description: item.description,
            date: item.date,
            status: item.status,
            extra: item.extra,
        };

        timeline.push(serde_json::to_value(&item)?);
        self.write_json(CLIENT_PROJECT_KEY, &project).await?;

        tracing::debug!(id = item.id, "Added timeline item");
        Ok(item)
    }

    /// Shallow-merge `patch` into the project and persist the result.
    ///
    /// Refused with [`Error::Schema`], leaving storage untouched, when the
    /// merged project still does not decode.
    pub async fn merge_project_fields(&self, patch: ProjectPatch) -> Result<ProjectState> {
        let _guard = self.write_lock.lock().await;
        let mut project = self.read_project_document().await?;

        for (key, value) in patch.into_fields()? {
            project.insert(key, value);
        }

        let merged = decode_project(Value::Object(project.clone()))?;
        self.write_json(CLIENT_PROJECT_KEY, &project).await?;

        tracing::debug!(progress = merged.progress, "Merged project fields");
        Ok(merged)
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Read a key as JSON. Text that does not parse is logged and read as absent.
    async fn read_value(&self, key: &str) -> Result<Option<Value>> {
        let Some(raw) = self.storage.get_item(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!(key, "Ignoring malformed stored value: {}", e);
                Ok(None)
            }
        }
    }

    /// Read a key holding a JSON array; absent reads as empty
    async fn read_collection(&self, key: &str) -> Result<Vec<Value>> {
        match self.read_value(key).await? {
            None => Ok(Vec::new()),
            Some(Value::Array(entries)) => Ok(entries),
            Some(other) => Err(schema_error(
                key,
                format!("expected an array, found {}", json_kind(&other)),
            )),
        }
    }

    /// The stored project document, or the default project when absent
    async fn read_project_document(&self) -> Result<Map<String, Value>> {
        match self.read_value(CLIENT_PROJECT_KEY).await? {
            None => match serde_json::to_value(default_project())? {
                Value::Object(fields) => Ok(fields),
                _ => Err(Error::Internal("default project is not an object".to_string())),
            },
            Some(Value::Object(fields)) => Ok(fields),
            Some(other) => Err(schema_error(
                CLIENT_PROJECT_KEY,
                format!("expected an object, found {}", json_kind(&other)),
            )),
        }
    }

    /// Encode and write a key. Backend failures propagate.
    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.storage.set_item(key, &json).await
    }
}

fn schema_error(key: &str, reason: impl Into<String>) -> Error {
    Error::Schema {
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn decode_project(value: Value) -> Result<ProjectState> {
    serde_json::from_value(value).map_err(|e| schema_error(CLIENT_PROJECT_KEY, e.to_string()))
}

/// The `field` array of a project document, created when missing
fn project_list<'a>(
    project: &'a mut Map<String, Value>,
    field: &str,
) -> Result<&'a mut Vec<Value>> {
    match project
        .entry(field)
        .or_insert_with(|| Value::Array(Vec::new()))
    {
        Value::Array(entries) => Ok(entries),
        other => Err(schema_error(
            CLIENT_PROJECT_KEY,
            format!("`{}` should be an array, found {}", field, json_kind(other)),
        )),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Largest numeric `id` among stored entries, 0 when there are none
fn max_id(entries: &[Value]) -> RecordId {
    entries
        .iter()
        .filter_map(|entry| entry.get("id").and_then(Value::as_u64))
        .max()
        .unwrap_or(0)
}

// =============================================================================
// Id generation
// =============================================================================

/// Millisecond-timestamp ids, bumped past the last id handed out and past
/// any id already stored in the target collection
#[derive(Debug, Default)]
struct IdGenerator {
    last: AtomicU64,
}

impl IdGenerator {
    const fn new() -> Self {
        Self {
            last: AtomicU64::new(0),
        }
    }

    /// Next id, strictly greater than `floor`
    fn next_after(&self, floor: RecordId) -> RecordId {
        let now = now_millis();
        let candidate =
            |last: u64| now.max(last.saturating_add(1)).max(floor.saturating_add(1));
        let prev = match self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(candidate(last))
            }) {
            Ok(prev) | Err(prev) => prev,
        };
        candidate(prev)
    }
}

/// Current time in Unix milliseconds
fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// =============================================================================
// Default project
// =============================================================================

/// Project served until one has been stored
pub fn default_project() -> ProjectState {
    ProjectState {
        name: "LuxeBrand Global Website".to_string(),
        description: "Complete website redesign with e-commerce integration and AI-powered personalization".to_string(),
        progress: 75,
        days_remaining: 14,
        tasks_completed: 24,
        total_tasks: 32,
        team_members: 5,
        timeline: vec![
            timeline_item(
                1,
                "Project Kickoff",
                "Initial meeting to establish project goals, timeline, and deliverables.",
                "2025-01-10",
                TimelineStatus::Completed,
            ),
            timeline_item(
                2,
                "Design Phase",
                "Creation of wireframes, mockups, and design concepts for approval.",
                "2025-01-25",
                TimelineStatus::Completed,
            ),
            timeline_item(
                3,
                "Development Phase",
                "Implementation of frontend and backend functionality.",
                "2025-02-15",
                TimelineStatus::Active,
            ),
            timeline_item(
                4,
                "Content Integration",
                "Adding client-provided content and media to the website.",
                "2025-03-01",
                TimelineStatus::Upcoming,
            ),
        ],
        updates: vec![
            ProjectUpdate {
                id: 1,
                title: "Development Milestone Reached".to_string(),
                description: "The backend API integration has been completed successfully. Frontend development is now 80% complete.".to_string(),
                time: "2 hours ago".to_string(),
                icon: "fas fa-code".to_string(),
                extra: Map::new(),
            },
            ProjectUpdate {
                id: 2,
                title: "Design Review Completed".to_string(),
                description: "Client feedback has been incorporated into the design revisions. Final mockups approved.".to_string(),
                time: "1 day ago".to_string(),
                icon: "fas fa-palette".to_string(),
                extra: Map::new(),
            },
        ],
        extra: Map::new(),
    }
}

fn timeline_item(
    id: RecordId,
    title: &str,
    description: &str,
    date: &str,
    status: TimelineStatus,
) -> TimelineItem {
    TimelineItem {
        id,
        title: title.to_string(),
        description: description.to_string(),
        date: date.to_string(),
        status,
        extra: Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FileStorage, MemoryStorage};
    use crate::Error;
    use serde_json::json;
    use std::collections::HashSet;
    use tempfile::TempDir;
    use tokio_test::assert_err;

    fn make_store() -> (RecordStore, MemoryStorage) {
        let storage = MemoryStorage::new();
        let store = RecordStore::new(Arc::new(storage.clone()));
        (store, storage)
    }

    fn consultation(name: &str) -> NewConsultationRequest {
        NewConsultationRequest::from_pairs([
            ("name", name.to_string()),
            ("email", format!("{}@example.com", name.to_lowercase())),
            ("message", "We need a new storefront".to_string()),
        ])
    }

    fn new_update(title: &str) -> NewProjectUpdate {
        NewProjectUpdate {
            title: title.to_string(),
            description: "Details".to_string(),
            icon: "fas fa-check".to_string(),
            extra: Map::new(),
        }
    }

    // -------------------------------------------------------------------------
    // Consultation requests
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_list_empty() {
        let (store, _) = make_store();
        assert!(store.list_consultation_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_assigns_system_fields_and_appends() {
        let (store, _) = make_store();

        let first = store.save_consultation_request(consultation("Ada")).await.unwrap();
        assert_eq!(first.status, ConsultationStatus::New);
        assert!(first.id > 0);
        assert_eq!(first.details["name"], json!("Ada"));

        let second = store.save_consultation_request(consultation("Grace")).await.unwrap();

        let all = store.list_consultation_requests().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0], first);
        assert_eq!(all[1], second);
        assert!(second.date >= first.date);
    }

    #[tokio::test]
    async fn test_save_overrides_reserved_caller_fields() {
        let (store, _) = make_store();
        let mut req = consultation("Ada");
        req.details.insert("id".to_string(), json!(7));
        req.details.insert("status".to_string(), json!("closed"));
        req.details.insert("date".to_string(), json!("yesterday"));

        let saved = store.save_consultation_request(req).await.unwrap();
        assert_ne!(saved.id, 7);
        assert_eq!(saved.status, ConsultationStatus::New);
        assert!(!saved.details.contains_key("id"));

        // Stored JSON decodes cleanly with no duplicate keys
        let all = store.list_consultation_requests().await.unwrap();
        assert_eq!(all, vec![saved]);
    }

    #[tokio::test]
    async fn test_persisted_json_layout() {
        let (store, storage) = make_store();
        let saved = store.save_consultation_request(consultation("Ada")).await.unwrap();

        let raw = storage.get_item(CONSULTATION_REQUESTS_KEY).await.unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let entry = &value.as_array().unwrap()[0];
        assert_eq!(entry["id"], json!(saved.id));
        assert_eq!(entry["status"], json!("new"));
        assert!(entry["date"].as_str().unwrap().ends_with('Z'));
        assert_eq!(entry["email"], json!("ada@example.com"));
    }

    #[tokio::test]
    async fn test_rapid_saves_get_unique_ids() {
        let (store, _) = make_store();
        let mut ids = HashSet::new();
        for i in 0..50 {
            let saved = store
                .save_consultation_request(consultation(&format!("User{}", i)))
                .await
                .unwrap();
            assert!(ids.insert(saved.id));
        }
        let all = store.list_consultation_requests().await.unwrap();
        assert_eq!(all.len(), 50);
        assert!(all.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[tokio::test]
    async fn test_update_status_changes_only_target() {
        let (store, _) = make_store();
        let a = store.save_consultation_request(consultation("Ada")).await.unwrap();
        let b = store.save_consultation_request(consultation("Grace")).await.unwrap();

        let found = store.update_consultation_status(b.id, "contacted").await.unwrap();
        assert!(found);

        let all = store.list_consultation_requests().await.unwrap();
        assert_eq!(all[0], a);
        assert_eq!(all[1].status, ConsultationStatus::Other("contacted".to_string()));
        assert_eq!(all[1].details, b.details);
        assert_eq!(all[1].date, b.date);

        let fetched = store.get_consultation_request(b.id).await.unwrap().unwrap();
        assert_eq!(fetched.status.to_string(), "contacted");
    }

    #[tokio::test]
    async fn test_update_status_unknown_id_is_noop() {
        let (store, storage) = make_store();
        store.save_consultation_request(consultation("Ada")).await.unwrap();
        let before = storage.get_item(CONSULTATION_REQUESTS_KEY).await.unwrap();

        let found = store.update_consultation_status(42, "closed").await.unwrap();
        assert!(!found);
        assert_eq!(storage.get_item(CONSULTATION_REQUESTS_KEY).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_update_status_on_empty_store_writes_nothing() {
        let (store, storage) = make_store();
        assert!(!store.update_consultation_status(1, "closed").await.unwrap());
        assert!(storage.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_requests_read_as_empty() {
        let (store, storage) = make_store();
        storage
            .set_item(CONSULTATION_REQUESTS_KEY, "not valid json")
            .await
            .unwrap();
        assert!(store.list_consultation_requests().await.unwrap().is_empty());

        // The next save starts a fresh collection
        store.save_consultation_request(consultation("Ada")).await.unwrap();
        assert_eq!(store.list_consultation_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_write_failure_propagates() {
        let storage = MemoryStorage::with_quota(64);
        let store = RecordStore::new(Arc::new(storage.clone()));

        let mut req = consultation("Ada");
        req.details
            .insert("message".to_string(), json!("x".repeat(200)));
        let err = assert_err!(store.save_consultation_request(req).await);
        assert!(matches!(err, Error::QuotaExceeded { .. }));
        assert!(storage.get_item(CONSULTATION_REQUESTS_KEY).await.unwrap().is_none());
    }

    // -------------------------------------------------------------------------
    // Project state
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_default_project_on_empty_storage() {
        let (store, storage) = make_store();
        let project = store.get_project_state().await.unwrap();
        assert_eq!(project.progress, 75);
        assert_eq!(project.team_members, 5);
        assert_eq!(project.timeline.len(), 4);
        assert_eq!(project.updates.len(), 2);
        assert_eq!(project.timeline[2].status, TimelineStatus::Active);
        // Reading does not materialize anything in storage
        assert!(storage.get_item(CLIENT_PROJECT_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_malformed_project_reads_as_default() {
        let (store, storage) = make_store();
        storage.set_item(CLIENT_PROJECT_KEY, "{\"name\":").await.unwrap();
        assert_eq!(store.get_project_state().await.unwrap(), default_project());
    }

    #[tokio::test]
    async fn test_save_project_round_trip() {
        let (store, _) = make_store();
        let mut project = default_project();
        project.name = "Atlas Rebrand".to_string();
        project.progress = 12;
        project.days_remaining = -3;
        project.timeline.truncate(1);
        project.extra.insert("budget".to_string(), json!(42000));

        store.save_project_state(&project).await.unwrap();
        assert_eq!(store.get_project_state().await.unwrap(), project);
    }

    #[tokio::test]
    async fn test_add_project_update_prepends() {
        let (store, _) = make_store();
        let update = store.add_project_update(new_update("QA Started")).await.unwrap();
        assert_eq!(update.time, JUST_NOW);

        let project = store.get_project_state().await.unwrap();
        assert_eq!(project.updates.len(), 3);
        assert_eq!(project.updates[0], update);
        assert_eq!(project.updates[1].title, "Development Milestone Reached");

        let newer = store.add_project_update(new_update("QA Passed")).await.unwrap();
        let project = store.get_project_state().await.unwrap();
        assert_eq!(project.updates[0].id, newer.id);
        assert_eq!(project.updates[1].id, update.id);
    }

    #[tokio::test]
    async fn test_add_timeline_item_appends() {
        let (store, _) = make_store();
        let item = store
            .add_timeline_item(NewTimelineItem {
                title: "Launch".to_string(),
                description: "Go live".to_string(),
                date: "2025-03-20".to_string(),
                status: TimelineStatus::Upcoming,
                extra: Map::new(),
            })
            .await
            .unwrap();

        let project = store.get_project_state().await.unwrap();
        assert_eq!(project.timeline.len(), 5);
        assert_eq!(project.timeline.last(), Some(&item));
        assert_eq!(project.timeline[0].title, "Project Kickoff");
    }

    #[tokio::test]
    async fn test_merge_project_fields() {
        let (store, _) = make_store();
        let merged = store
            .merge_project_fields(ProjectPatch {
                progress: Some(90),
                tasks_completed: Some(29),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(merged.progress, 90);
        assert_eq!(merged.tasks_completed, 29);
        assert_eq!(merged.total_tasks, 32);
        assert_eq!(merged.timeline.len(), 4);
        assert_eq!(store.get_project_state().await.unwrap(), merged);
    }

    #[tokio::test]
    async fn test_mutations_keep_earlier_mutations() {
        let (store, _) = make_store();
        store.add_project_update(new_update("One")).await.unwrap();
        store
            .merge_project_fields(ProjectPatch {
                progress: Some(80),
                ..Default::default()
            })
            .await
            .unwrap();

        let project = store.get_project_state().await.unwrap();
        assert_eq!(project.progress, 80);
        assert_eq!(project.updates[0].title, "One");
    }

    #[tokio::test]
    async fn test_reset_project_state() {
        let (store, storage) = make_store();
        store
            .merge_project_fields(ProjectPatch {
                progress: Some(5),
                ..Default::default()
            })
            .await
            .unwrap();

        let project = store.reset_project_state().await.unwrap();
        assert_eq!(project.progress, 75);
        assert!(storage.get_item(CLIENT_PROJECT_KEY).await.unwrap().is_none());
        assert_eq!(store.get_project_state().await.unwrap().progress, 75);
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_serialized() {
        let (store, _) = make_store();
        let store = Arc::new(store);

        let mut handles = Vec::new();
        for i in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .add_project_update(new_update(&format!("Update {}", i)))
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let project = store.get_project_state().await.unwrap();
        assert_eq!(project.updates.len(), 12);
    }

    #[tokio::test]
    async fn test_separate_stores_are_last_write_wins() {
        let storage: Arc<dyn KeyValueStore> = Arc::new(MemoryStorage::new());
        let tab_a = RecordStore::new(storage.clone());
        let tab_b = RecordStore::new(storage);

        let mut from_a = tab_a.get_project_state().await.unwrap();
        let mut from_b = tab_b.get_project_state().await.unwrap();
        from_a.progress = 10;
        from_b.progress = 20;

        tab_a.save_project_state(&from_a).await.unwrap();
        tab_b.save_project_state(&from_b).await.unwrap();
        assert_eq!(tab_a.get_project_state().await.unwrap().progress, 20);
    }

    #[tokio::test]
    async fn test_file_backed_persistence() {
        let dir = TempDir::new().unwrap();
        let saved = {
            let storage = FileStorage::new(dir.path().to_path_buf()).await.unwrap();
            let store = RecordStore::new(Arc::new(storage));
            store.add_project_update(new_update("Persisted")).await.unwrap();
            store.save_consultation_request(consultation("Ada")).await.unwrap()
        };

        let storage = FileStorage::new(dir.path().to_path_buf()).await.unwrap();
        let store = RecordStore::new(Arc::new(storage));
        assert_eq!(store.list_consultation_requests().await.unwrap(), vec![saved]);
        assert_eq!(
            store.get_project_state().await.unwrap().updates[0].title,
            "Persisted"
        );
    }

    #[tokio::test]
    async fn test_two_stores_never_share_ids() {
        let storage: Arc<dyn KeyValueStore> = Arc::new(MemoryStorage::new());
        let tab_a = RecordStore::new(storage.clone());
        let tab_b = RecordStore::new(storage);

        let mut ids = HashSet::new();
        for i in 0..200 {
            for (store, tab) in [(&tab_a, "A"), (&tab_b, "B")] {
                let name = format!("{}{}", tab, i);
                let saved = store.save_consultation_request(consultation(&name)).await.unwrap();
                assert!(ids.insert(saved.id));
            }
        }
        assert_eq!(tab_a.list_consultation_requests().await.unwrap().len(), 400);
    }

    #[tokio::test]
    async fn test_new_ids_pass_stored_ids() {
        let (store, storage) = make_store();
        let future_id = now_millis() + 3_600_000;
        let stored = json!([{"id": future_id, "status": "new", "date": "2025-01-10"}]);
        storage
            .set_item(CONSULTATION_REQUESTS_KEY, &stored.to_string())
            .await
            .unwrap();

        let saved = store.save_consultation_request(consultation("Ada")).await.unwrap();
        assert!(saved.id > future_id);
    }

    // -------------------------------------------------------------------------
    // Stored JSON of an unexpected shape
    // -------------------------------------------------------------------------

    async fn stored_json(storage: &MemoryStorage, key: &str) -> serde_json::Value {
        let raw = storage.get_item(key).await.unwrap().unwrap();
        serde_json::from_str(&raw).unwrap()
    }

    #[tokio::test]
    async fn test_alternate_date_forms_survive_save() {
        let (store, storage) = make_store();
        let stored = json!([
            {"id": 1, "status": "new", "date": "2025-01-10T09:30:00.000Z", "name": "Ada"},
            {"id": 2, "status": "new", "date": "2025-01-10", "name": "Grace"},
            {"id": 3, "status": "new", "date": "2025-01-10T09:30:00", "name": "Barbara"},
        ]);
        storage
            .set_item(CONSULTATION_REQUESTS_KEY, &stored.to_string())
            .await
            .unwrap();

        store.save_consultation_request(consultation("Linus")).await.unwrap();

        let names: Vec<_> = store
            .list_consultation_requests()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.details["name"].clone())
            .collect();
        assert_eq!(names, vec![json!("Ada"), json!("Grace"), json!("Barbara"), json!("Linus")]);

        // Entries already stored are written back byte-for-byte
        let raw = stored_json(&storage, CONSULTATION_REQUESTS_KEY).await;
        assert_eq!(raw[1]["date"], json!("2025-01-10"));
    }

    #[tokio::test]
    async fn test_undecodable_requests_are_kept() {
        let (store, storage) = make_store();
        let stored = json!([
            {"id": "abc", "status": "new", "date": "2025-01-10", "name": "Mistyped"},
            {"id": 5, "name": "Missing fields"},
            {"id": 6, "status": "new", "date": "2025-01-10", "name": "Ada"},
        ]);
        storage
            .set_item(CONSULTATION_REQUESTS_KEY, &stored.to_string())
            .await
            .unwrap();

        // Only the decodable entry is listed
        let listed = store.list_consultation_requests().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, 6);

        // Mutations keep every stored entry, decodable or not
        store.save_consultation_request(consultation("Linus")).await.unwrap();
        assert!(store.update_consultation_status(5, "contacted").await.unwrap());

        let raw = stored_json(&storage, CONSULTATION_REQUESTS_KEY).await;
        let raw = raw.as_array().unwrap();
        assert_eq!(raw.len(), 4);
        assert_eq!(raw[0], stored[0]);
        assert_eq!(raw[1]["name"], json!("Missing fields"));
        assert_eq!(raw[1]["status"], json!("contacted"));
        assert_eq!(raw[2], stored[2]);
        assert_eq!(raw[3]["name"], json!("Linus"));
    }

    #[tokio::test]
    async fn test_non_array_requests_refuse_mutation() {
        let (store, storage) = make_store();
        let stored = r#"{"name":"Ada"}"#;
        storage.set_item(CONSULTATION_REQUESTS_KEY, stored).await.unwrap();

        assert!(matches!(
            store.list_consultation_requests().await,
            Err(Error::Schema { .. })
        ));
        let err = assert_err!(store.save_consultation_request(consultation("Linus")).await);
        assert!(matches!(err, Error::Schema { .. }));
        assert_err!(store.update_consultation_status(1, "closed").await);
        assert_eq!(
            storage.get_item(CONSULTATION_REQUESTS_KEY).await.unwrap().as_deref(),
            Some(stored)
        );
    }

    fn mistyped_project() -> serde_json::Value {
        let mut project = serde_json::to_value(default_project()).unwrap();
        project["name"] = json!("Client Custom Name");
        project["progress"] = json!("80");
        project
    }

    #[tokio::test]
    async fn test_mistyped_project_is_an_error_not_the_default() {
        let (store, storage) = make_store();
        storage
            .set_item(CLIENT_PROJECT_KEY, &mistyped_project().to_string())
            .await
            .unwrap();

        let err = assert_err!(store.get_project_state().await);
        assert!(matches!(err, Error::Schema { ref key, .. } if key == CLIENT_PROJECT_KEY));
    }

    #[tokio::test]
    async fn test_timeline_and_update_keep_mistyped_project() {
        let (store, storage) = make_store();
        storage
            .set_item(CLIENT_PROJECT_KEY, &mistyped_project().to_string())
            .await
            .unwrap();

        let item = store
            .add_timeline_item(NewTimelineItem {
                title: "Launch".to_string(),
                description: "Go live".to_string(),
                date: "2025-03-20".to_string(),
                status: TimelineStatus::Upcoming,
                extra: Map::new(),
            })
            .await
            .unwrap();
        let update = store.add_project_update(new_update("QA Started")).await.unwrap();

        let raw = stored_json(&storage, CLIENT_PROJECT_KEY).await;
        assert_eq!(raw["name"], json!("Client Custom Name"));
        assert_eq!(raw["progress"], json!("80"));
        assert_eq!(raw["timeline"][4]["id"], json!(item.id));
        assert_eq!(raw["updates"][0]["id"], json!(update.id));
    }

    #[tokio::test]
    async fn test_merge_can_repair_mistyped_project() {
        let (store, storage) = make_store();
        storage
            .set_item(CLIENT_PROJECT_KEY, &mistyped_project().to_string())
            .await
            .unwrap();

        let merged = store
            .merge_project_fields(ProjectPatch {
                progress: Some(80),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(merged.name, "Client Custom Name");
        assert_eq!(merged.progress, 80);
        assert_eq!(store.get_project_state().await.unwrap(), merged);
    }

    #[tokio::test]
    async fn test_merge_refuses_when_result_still_mistyped() {
        let (store, storage) = make_store();
        let stored = mistyped_project().to_string();
        storage.set_item(CLIENT_PROJECT_KEY, &stored).await.unwrap();

        let err = assert_err!(
            store
                .merge_project_fields(ProjectPatch {
                    team_members: Some(6),
                    ..Default::default()
                })
                .await
        );
        assert!(matches!(err, Error::Schema { .. }));
        assert_eq!(
            storage.get_item(CLIENT_PROJECT_KEY).await.unwrap(),
            Some(stored)
        );
    }

    #[tokio::test]
    async fn test_project_missing_fields() {
        let (store, storage) = make_store();
        let stored = json!({"name": "Bare", "description": "Only a name", "budget": 100});
        storage
            .set_item(CLIENT_PROJECT_KEY, &stored.to_string())
            .await
            .unwrap();

        // Missing counters are a shape error on read
        assert_err!(store.get_project_state().await);

        // Missing feed is created on demand; other fields are untouched
        store.add_project_update(new_update("First")).await.unwrap();
        let raw = stored_json(&storage, CLIENT_PROJECT_KEY).await;
        assert_eq!(raw["name"], json!("Bare"));
        assert_eq!(raw["budget"], json!(100));
        assert_eq!(raw["updates"].as_array().unwrap().len(), 1);
        assert!(raw.get("progress").is_none());
    }

    #[tokio::test]
    async fn test_non_object_project_refuses_mutation() {
        let (store, storage) = make_store();
        storage.set_item(CLIENT_PROJECT_KEY, "[1, 2, 3]").await.unwrap();

        assert_err!(store.get_project_state().await);
        assert_err!(store.add_project_update(new_update("Lost")).await);
        assert_err!(
            store
                .merge_project_fields(ProjectPatch {
                    progress: Some(1),
                    ..Default::default()
                })
                .await
        );
        assert_eq!(
            storage.get_item(CLIENT_PROJECT_KEY).await.unwrap().as_deref(),
            Some("[1, 2, 3]")
        );
    }

    #[tokio::test]
    async fn test_project_feed_of_wrong_type_refuses_mutation() {
        let (store, storage) = make_store();
        let mut project = serde_json::to_value(default_project()).unwrap();
        project["timeline"] = json!("see spreadsheet");
        let stored = project.to_string();
        storage.set_item(CLIENT_PROJECT_KEY, &stored).await.unwrap();

        let err = assert_err!(
            store
                .add_timeline_item(NewTimelineItem {
                    title: "Launch".to_string(),
                    description: "Go live".to_string(),
                    date: "2025-03-20".to_string(),
                    status: TimelineStatus::Upcoming,
                    extra: Map::new(),
                })
                .await
        );
        assert!(matches!(err, Error::Schema { .. }));
        assert_eq!(storage.get_item(CLIENT_PROJECT_KEY).await.unwrap(), Some(stored));
    }

    #[test]
    fn test_id_generator_monotonic() {
        let ids = IdGenerator::default();
        let a = ids.next_after(0);
        let b = ids.next_after(0);
        let c = ids.next_after(0);
        assert!(a < b && b < c);
        assert!(a >= now_millis() - 1000);
    }

    #[test]
    fn test_id_generator_respects_floor() {
        let ids = IdGenerator::new();
        let floor = now_millis() + 10_000;
        assert_eq!(ids.next_after(floor), floor + 1);
        assert_eq!(ids.next_after(0), floor + 2);
    }
}
