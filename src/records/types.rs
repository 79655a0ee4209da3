//! Record types for consultation intake and project tracking
//!
//! All types serialize with camelCase field names, matching the JSON
//! persisted under the storage keys. Fields a caller supplies beyond the
//! known ones are kept in a flattened `extra`/`details` map so they survive
//! read-modify-write cycles.

use crate::presentation::parse_timestamp;
use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Storage key for the consultation request collection
pub const CONSULTATION_REQUESTS_KEY: &str = "consultationRequests";

/// Storage key for the project singleton
pub const CLIENT_PROJECT_KEY: &str = "clientProject";

/// Relative-time label given to freshly added project updates
pub const JUST_NOW: &str = "Just now";

/// Numeric record identifier (milliseconds-based, see `IdGenerator`)
pub type RecordId = u64;

// =============================================================================
// Consultation requests
// =============================================================================

/// Consultation request status.
///
/// Only `new` is assigned by the store; any other value written by a status
/// update is accepted verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsultationStatus {
    New,
    #[serde(untagged)]
    Other(String),
}

impl std::fmt::Display for ConsultationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::Other(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for ConsultationStatus {
    fn from(s: &str) -> Self {
        match s {
            "new" => Self::New,
            other => Self::Other(other.to_string()),
        }
    }
}

/// A stored consultation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsultationRequest {
    pub id: RecordId,
    pub status: ConsultationStatus,
    /// Submission time. Any ISO-8601 form is read, including a bare date.
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub date: DateTime<Utc>,
    /// Caller-supplied form fields (name, email, message, ...)
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| de::Error::custom(format!("unrecognized timestamp '{}'", raw)))
}

/// Caller-supplied fields for a new consultation request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NewConsultationRequest {
    pub details: Map<String, Value>,
}

impl NewConsultationRequest {
    /// Build from string key/value pairs
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let details = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), Value::String(v.into())))
            .collect();
        Self { details }
    }
}

// =============================================================================
// Project state
// =============================================================================

/// Timeline entry status
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineStatus {
    Completed,
    Active,
    Upcoming,
    #[serde(untagged)]
    Other(String),
}

impl std::fmt::Display for TimelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Active => write!(f, "active"),
            Self::Upcoming => write!(f, "upcoming"),
            Self::Other(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for TimelineStatus {
    fn from(s: &str) -> Self {
        match s {
            "completed" => Self::Completed,
            "active" => Self::Active,
            "upcoming" => Self::Upcoming,
            other => Self::Other(other.to_string()),
        }
    }
}

/// A milestone on the project timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineItem {
    pub id: RecordId,
    pub title: String,
    pub description: String,
    /// Calendar date as written by the caller (usually `YYYY-MM-DD`)
    pub date: String,
    pub status: TimelineStatus,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Fields for a new timeline item (id is store-assigned)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTimelineItem {
    pub title: String,
    pub description: String,
    pub date: String,
    pub status: TimelineStatus,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A project activity update shown newest-first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectUpdate {
    pub id: RecordId,
    pub title: String,
    pub description: String,
    /// Relative-time label, e.g. "2 hours ago"
    pub time: String,
    /// Icon reference, e.g. "fas fa-code"
    pub icon: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Fields for a new project update (id and time label are store-assigned)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProjectUpdate {
    pub title: String,
    pub description: String,
    pub icon: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The project singleton
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectState {
    pub name: String,
    pub description: String,
    pub progress: u32,
    pub days_remaining: i64,
    pub tasks_completed: u32,
    pub total_tasks: u32,
    pub team_members: u32,
    #[serde(default)]
    pub timeline: Vec<TimelineItem>,
    #[serde(default)]
    pub updates: Vec<ProjectUpdate>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// camelCase names of the typed `ProjectState` fields
const PROJECT_FIELDS: &[&str] = &[
    "name",
    "description",
    "progress",
    "daysRemaining",
    "tasksCompleted",
    "totalTasks",
    "teamMembers",
    "timeline",
    "updates",
];

/// Shallow patch for [`ProjectState`]: every present field replaces the
/// stored one, sequences included.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_remaining: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks_completed: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tasks: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_members: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeline: Option<Vec<TimelineItem>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updates: Option<Vec<ProjectUpdate>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProjectPatch {
    /// True when the patch would change nothing
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// The present fields as a camelCase JSON object, ready to assign over a
    /// stored project. Extras named like a typed field are dropped.
    pub fn into_fields(mut self) -> serde_json::Result<Map<String, Value>> {
        self.extra = std::mem::take(&mut self.extra)
            .into_iter()
            .filter(|(key, _)| !PROJECT_FIELDS.contains(&key.as_str()))
            .collect();
        match serde_json::to_value(&self)? {
            Value::Object(fields) => Ok(fields),
            _ => Ok(Map::new()),
        }
    }
}
