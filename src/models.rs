// Data model for collected diagnostics and page state
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Severity reported by the browser for a console entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Severe,
}

impl LogLevel {
    /// Parse a WebDriver log level. Unknown or verbose levels (DEBUG, FINE, ALL) count as INFO.
    pub fn parse(level: &str) -> Self {
        match level.trim().to_uppercase().as_str() {
            "SEVERE" => LogLevel::Severe,
            "ERROR" => LogLevel::Error,
            "WARNING" | "WARN" => LogLevel::Warning,
            _ => LogLevel::Info,
        }
    }

    /// WARNING, ERROR and SEVERE entries are categorized and counted
    pub fn is_significant(&self) -> bool {
        !matches!(self, LogLevel::Info)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Severe => "SEVERE",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a diagnostic entry was collected from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryOrigin {
    BrowserLog,
    InjectedListener,
}

/// One normalized console line or JS error event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticEntry {
    pub level: LogLevel,
    pub message: String,
    pub source: String,
    pub timestamp_millis: i64,
    pub origin: EntryOrigin,
}

impl DiagnosticEntry {
    pub fn new(
        level: LogLevel,
        message: impl Into<String>,
        source: impl Into<String>,
        timestamp_millis: i64,
    ) -> Self {
        Self {
            level,
            message: message.into(),
            source: source.into(),
            timestamp_millis,
            origin: EntryOrigin::BrowserLog,
        }
    }
}

/// Entry as returned by the WebDriver `browser` log endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct RawBrowserLog {
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub timestamp: i64,
}

impl From<RawBrowserLog> for DiagnosticEntry {
    fn from(raw: RawBrowserLog) -> Self {
        DiagnosticEntry::new(
            LogLevel::parse(&raw.level),
            raw.message,
            raw.source.unwrap_or_default(),
            raw.timestamp,
        )
    }
}

/// Event recorded by the injected `error` / `unhandledrejection` listeners
#[derive(Debug, Clone, Deserialize)]
pub struct RawJsError {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub message: Value,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub lineno: Option<u64>,
    #[serde(default)]
    pub colno: Option<u64>,
    #[serde(rename = "error", default)]
    pub stack: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl RawJsError {
    /// Normalize into a diagnostic entry. `collected_at` stands in for a missing or bad timestamp.
    pub fn into_entry(self, collected_at: i64) -> DiagnosticEntry {
        let timestamp_millis = self
            .timestamp
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|ts| ts.timestamp_millis())
            .unwrap_or(collected_at);

        let message = match self.message {
            Value::String(s) => s,
            Value::Null => String::new(),
            other => other.to_string(),
        };

        let (level, source) = if self.kind == "unhandledrejection" {
            (LogLevel::Error, "unhandledrejection".to_string())
        } else {
            let file = self
                .filename
                .filter(|f| !f.is_empty())
                .unwrap_or_else(|| "inline".to_string());
            let source = match (self.lineno, self.colno) {
                (Some(line), Some(col)) => format!("{}:{}:{}", file, line, col),
                (Some(line), None) => format!("{}:{}", file, line),
                _ => file,
            };
            (LogLevel::Severe, source)
        };

        DiagnosticEntry {
            level,
            message,
            source,
            timestamp_millis,
            origin: EntryOrigin::InjectedListener,
        }
    }
}

/// Resource timing entry read from `performance.getEntriesByType("resource")`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkRequest {
    pub name: String,
    #[serde(default)]
    pub duration: f64,
    #[serde(rename = "startTime", alias = "start_time", default)]
    pub start_time: f64,
    #[serde(rename = "responseEnd", alias = "response_end", default)]
    pub response_end: f64,
    #[serde(rename = "initiatorType", alias = "initiator_type", default)]
    pub initiator_type: String,
}

/// Page details captured once per session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageInfo {
    pub url: String,
    pub title: String,
    pub load_time_seconds: f64,
    pub login_time_seconds: Option<f64>,
    pub total_time_seconds: f64,
    pub page_source_excerpt: String,
    pub network_requests: Vec<NetworkRequest>,
}

pub const SOURCE_EXCERPT_CHARS: usize = 1000;

/// First 1000 characters of the page source, with "..." when truncated
pub fn source_excerpt(source: &str) -> String {
    let mut chars = source.char_indices();
    match chars.nth(SOURCE_EXCERPT_CHARS) {
        Some((idx, _)) => format!("{}...", &source[..idx]),
        None => source.to_string(),
    }
}

/// Millisecond-precision UTC rendering of an epoch-millis timestamp
pub fn format_timestamp_millis(millis: i64) -> String {
    match DateTime::<Utc>::from_timestamp_millis(millis) {
        Some(ts) => ts.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
        None => millis.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_level_parse() {
        assert_eq!(LogLevel::parse("SEVERE"), LogLevel::Severe);
        assert_eq!(LogLevel::parse("warning"), LogLevel::Warning);
        assert_eq!(LogLevel::parse("ERROR"), LogLevel::Error);
        assert_eq!(LogLevel::parse("DEBUG"), LogLevel::Info);
        assert_eq!(LogLevel::parse(""), LogLevel::Info);
        assert!(!LogLevel::Info.is_significant());
        assert!(LogLevel::Warning.is_significant());
    }

    #[test]
    fn test_browser_log_adapter() {
        let raw: RawBrowserLog = serde_json::from_value(json!({
            "level": "SEVERE",
            "message": "https://example.com/app.js 12:4 Uncaught TypeError",
            "source": "javascript",
            "timestamp": 1700000000000i64
        }))
        .unwrap();

        let entry = DiagnosticEntry::from(raw);
        assert_eq!(entry.level, LogLevel::Severe);
        assert_eq!(entry.source, "javascript");
        assert_eq!(entry.timestamp_millis, 1_700_000_000_000);
        assert_eq!(entry.origin, EntryOrigin::BrowserLog);
    }

    #[test]
    fn test_js_error_adapter() {
        let raw: RawJsError = serde_json::from_value(json!({
            "type": "error",
            "message": "Uncaught ReferenceError: foo is not defined",
            "filename": "https://example.com/main.js",
            "lineno": 10,
            "colno": 5,
            "error": "ReferenceError: foo is not defined\n    at main.js:10:5",
            "timestamp": "2023-11-14T22:13:20.000Z"
        }))
        .unwrap();

        let entry = raw.into_entry(0);
        assert_eq!(entry.level, LogLevel::Severe);
        assert_eq!(entry.source, "https://example.com/main.js:10:5");
        assert_eq!(entry.timestamp_millis, 1_700_000_000_000);
        assert_eq!(entry.origin, EntryOrigin::InjectedListener);
    }

    #[test]
    fn test_unhandled_rejection_adapter() {
        let raw: RawJsError = serde_json::from_value(json!({
            "type": "unhandledrejection",
            "message": {"code": 500},
            "timestamp": "not-a-date"
        }))
        .unwrap();

        let entry = raw.into_entry(42);
        assert_eq!(entry.level, LogLevel::Error);
        assert_eq!(entry.source, "unhandledrejection");
        assert_eq!(entry.message, "{\"code\":500}");
        assert_eq!(entry.timestamp_millis, 42);
    }

    #[test]
    fn test_source_excerpt() {
        assert_eq!(source_excerpt("<html></html>"), "<html></html>");

        let long = "a".repeat(1500);
        let excerpt = source_excerpt(&long);
        assert_eq!(excerpt.len(), 1003);
        assert!(excerpt.ends_with("..."));

        let exact = "b".repeat(1000);
        assert_eq!(source_excerpt(&exact), exact);
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(
            format_timestamp_millis(1_700_000_000_123),
            "2023-11-14 22:13:20.123"
        );
    }
}
