//! User-facing text helpers: toasts, long dates and relative times
//!
//! Everything here is pure. Dates are rendered in UTC with English month
//! names, so output does not depend on the host locale or time zone.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const MINUTE_MS: i64 = 60_000;
const HOUR_MS: i64 = 3_600_000;
const DAY_MS: i64 = 86_400_000;

/// How long a toast stays visible
pub const TOAST_DURATION: Duration = Duration::from_millis(4000);

/// Rendered when a date string cannot be parsed
pub const INVALID_DATE: &str = "Invalid Date";

// =============================================================================
// Toasts
// =============================================================================

/// Toast styling kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToastKind {
    #[default]
    Success,
    Warning,
}

impl ToastKind {
    /// Icon glyph shown next to the message
    pub fn icon(&self) -> &'static str {
        match self {
            Self::Success => "✓",
            Self::Warning => "⚠️",
        }
    }

    /// Icon background (CSS value)
    pub fn accent(&self) -> &'static str {
        match self {
            Self::Success => "var(--gradient-neon)",
            Self::Warning => "#dc2626",
        }
    }
}

impl std::fmt::Display for ToastKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

impl std::str::FromStr for ToastKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "warning" => Ok(Self::Warning),
            other => Err(format!("unknown toast kind: {}", other)),
        }
    }
}

/// A transient feedback message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toast {
    pub message: String,
    #[serde(default)]
    pub kind: ToastKind,
}

impl Toast {
    /// Success toast (the default kind)
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_kind(message, ToastKind::Success)
    }

    /// Warning toast
    pub fn warning(message: impl Into<String>) -> Self {
        Self::with_kind(message, ToastKind::Warning)
    }

    pub fn with_kind(message: impl Into<String>, kind: ToastKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    pub fn icon(&self) -> &'static str {
        self.kind.icon()
    }

    pub fn accent(&self) -> &'static str {
        self.kind.accent()
    }

    pub fn duration(&self) -> Duration {
        TOAST_DURATION
    }
}

impl std::fmt::Display for Toast {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.icon(), self.message)
    }
}

/// Something that can display toasts (a UI layer, a terminal, a log)
pub trait ToastPresenter: Send + Sync {
    fn show_toast(&self, toast: &Toast);
}

/// Presenter that writes toasts to the tracing log
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingToasts;

impl ToastPresenter for TracingToasts {
    fn show_toast(&self, toast: &Toast) {
        match toast.kind {
            ToastKind::Success => tracing::info!(kind = %toast.kind, "{}", toast),
            ToastKind::Warning => tracing::warn!(kind = %toast.kind, "{}", toast),
        }
    }
}

// =============================================================================
// Dates
// =============================================================================

/// Parse an RFC 3339 timestamp, a naive `YYYY-MM-DDTHH:MM:SS` or a bare date
pub fn parse_timestamp(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Long human-readable date, e.g. `January 10, 2025`.
///
/// Unparsable input yields [`INVALID_DATE`].
pub fn format_date(input: &str) -> String {
    match parse_timestamp(input) {
        Some(dt) => dt.format("%B %-d, %Y").to_string(),
        None => INVALID_DATE.to_string(),
    }
}

/// Relative time from `timestamp` until now
pub fn relative_time(timestamp: DateTime<Utc>) -> String {
    relative_time_since(timestamp, Utc::now())
}

/// Relative time between `timestamp` and `now`.
///
/// Elapsed milliseconds are floor-divided into days, then hours, then
/// minutes; the first non-zero bucket wins. Under a minute, or in the
/// future, is "Just now".
pub fn relative_time_since(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = (now - timestamp).num_milliseconds();

    let days = elapsed.div_euclid(DAY_MS);
    if days > 0 {
        return ago(days, "day");
    }
    let hours = elapsed.div_euclid(HOUR_MS);
    if hours > 0 {
        return ago(hours, "hour");
    }
    let minutes = elapsed.div_euclid(MINUTE_MS);
    if minutes > 0 {
        return ago(minutes, "minute");
    }
    crate::records::JUST_NOW.to_string()
}

fn ago(count: i64, unit: &str) -> String {
    let plural = if count == 1 { "" } else { "s" };
    format!("{} {}{} ago", count, unit, plural)
}
