// Optional page analyses - screenshot, memory, accessibility, security headers, storage
//
// Each module returns a ModuleOutcome. Collaborator failures are logged and
// turned into `Failed`; nothing here aborts the session.

use crate::browser::{BrowserControl, StoredCookie};
use crate::config::FeatureFlags;
use crate::headers::HeaderFetcher;
use crate::layout::ReportLayout;
use crate::output::OutputWriter;
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::PathBuf;
use sysinfo::System;
use tracing::{debug, info, warn};

pub const AXE_CORE_URL: &str = "https://cdnjs.cloudflare.com/ajax/libs/axe-core/4.8.4/axe.min.js";

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Result of one enrichment module. `Disabled` and `Failed` stay distinguishable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum ModuleOutcome<T> {
    Disabled,
    Skipped { reason: String },
    Failed { reason: String },
    Completed(T),
}

impl<T> ModuleOutcome<T> {
    pub fn completed(&self) -> Option<&T> {
        match self {
            ModuleOutcome::Completed(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, ModuleOutcome::Completed(_))
    }
}

impl<T> Default for ModuleOutcome<T> {
    fn default() -> Self {
        ModuleOutcome::Disabled
    }
}

/// Memory figures in MB; `percent` is the share of total system memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryUsage {
    pub rss: f64,
    pub vms: f64,
    pub percent: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub js_heap_used: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub js_heap_total: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessibilityViolation {
    pub rule_id: String,
    pub impact: Option<String>,
    pub description: String,
    #[serde(default)]
    pub help_url: Option<String>,
    #[serde(default)]
    pub nodes: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccessibilityReport {
    pub violations: Vec<AccessibilityViolation>,
}

pub const NOT_SET: &str = "Not Set";

/// The five checked response headers, each a value or "Not Set"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityHeaders {
    #[serde(rename = "Strict-Transport-Security")]
    pub strict_transport_security: String,
    #[serde(rename = "Content-Security-Policy")]
    pub content_security_policy: String,
    #[serde(rename = "X-Frame-Options")]
    pub x_frame_options: String,
    #[serde(rename = "X-Content-Type-Options")]
    pub x_content_type_options: String,
    #[serde(rename = "X-XSS-Protection")]
    pub x_xss_protection: String,
}

impl SecurityHeaders {
    /// Pick the checked headers out of a response (names compared case-insensitively)
    pub fn from_response(headers: &[(String, String)]) -> Self {
        let lookup = |name: &str| {
            headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.clone())
                .unwrap_or_else(|| NOT_SET.to_string())
        };

        Self {
            strict_transport_security: lookup("Strict-Transport-Security"),
            content_security_policy: lookup("Content-Security-Policy"),
            x_frame_options: lookup("X-Frame-Options"),
            x_content_type_options: lookup("X-Content-Type-Options"),
            x_xss_protection: lookup("X-XSS-Protection"),
        }
    }

    pub fn entries(&self) -> [(&'static str, &str); 5] {
        [
            ("Strict-Transport-Security", &self.strict_transport_security),
            ("Content-Security-Policy", &self.content_security_policy),
            ("X-Frame-Options", &self.x_frame_options),
            ("X-Content-Type-Options", &self.x_content_type_options),
            ("X-XSS-Protection", &self.x_xss_protection),
        ]
    }

    pub fn missing_count(&self) -> usize {
        self.entries().iter().filter(|(_, v)| *v == NOT_SET).count()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageSnapshot {
    pub cookies: Vec<StoredCookie>,
    #[serde(rename = "localStorage")]
    pub local_storage: BTreeMap<String, String>,
}

/// One outcome per module, keyed by module name when serialized
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentResults {
    pub screenshots: ModuleOutcome<PathBuf>,
    pub memory: ModuleOutcome<MemoryUsage>,
    pub accessibility: ModuleOutcome<AccessibilityReport>,
    pub security: ModuleOutcome<SecurityHeaders>,
    pub storage: ModuleOutcome<StorageSnapshot>,
}

impl EnrichmentResults {
    pub fn present_count(&self) -> usize {
        [
            self.screenshots.is_present(),
            self.memory.is_present(),
            self.accessibility.is_present(),
            self.security.is_present(),
            self.storage.is_present(),
        ]
        .iter()
        .filter(|present| **present)
        .count()
    }
}

fn failed<T>(module: &str, out: &OutputWriter, err: impl Display) -> ModuleOutcome<T> {
    let reason = err.to_string();
    warn!("{} failed: {}", module, reason);
    out.warning(&format!("Failed to {}: {}", module, reason));
    ModuleOutcome::Failed { reason }
}

/// Save a PNG of the current page when the session saw significant logs
pub async fn capture_screenshot<B: BrowserControl>(
    browser: &B,
    layout: &ReportLayout,
    features: &FeatureFlags,
    error_count: usize,
    out: &OutputWriter,
) -> ModuleOutcome<PathBuf> {
    if !features.screenshots {
        return ModuleOutcome::Disabled;
    }
    if error_count == 0 {
        return ModuleOutcome::Skipped {
            reason: "no significant console logs".to_string(),
        };
    }

    let path = layout.screenshot_path(error_count, Local::now());
    match browser.save_screenshot(&path).await {
        Ok(()) => {
            info!("Screenshot saved to {}", path.display());
            out.success(&format!("Screenshot saved: {}", path.display()));
            ModuleOutcome::Completed(path)
        }
        Err(e) => failed("capture screenshot", out, e),
    }
}

fn process_memory() -> Result<(f64, f64, f64), String> {
    let pid = sysinfo::get_current_pid().map_err(|e| e.to_string())?;
    let mut sys = System::new();
    sys.refresh_memory();
    sys.refresh_process(pid);

    let process = sys
        .process(pid)
        .ok_or_else(|| format!("process {} not visible", pid))?;

    let rss = process.memory() as f64;
    let vms = process.virtual_memory() as f64;
    let total = sys.total_memory() as f64;
    let percent = if total > 0.0 { rss / total * 100.0 } else { 0.0 };

    Ok((rss / BYTES_PER_MB, vms / BYTES_PER_MB, percent))
}

const JS_HEAP_SCRIPT: &str = r#"
    const m = window.performance && window.performance.memory;
    return m ? { used: m.usedJSHeapSize, total: m.totalJSHeapSize } : null;
"#;

/// Process memory of the analyzer plus the page's JS heap when Chrome exposes it
pub async fn memory_usage<B: BrowserControl>(
    browser: &B,
    features: &FeatureFlags,
    out: &OutputWriter,
) -> ModuleOutcome<MemoryUsage> {
    if !features.memory {
        return ModuleOutcome::Disabled;
    }

    let (rss, vms, percent) = match process_memory() {
        Ok(figures) => figures,
        Err(e) => return failed("get memory usage", out, e),
    };

    let heap = match browser.execute(JS_HEAP_SCRIPT, vec![]).await {
        Ok(value) => value,
        Err(e) => {
            debug!("JS heap figures unavailable: {}", e);
            Value::Null
        }
    };
    let heap_mb = |key: &str| heap.get(key).and_then(Value::as_f64).map(|b| b / BYTES_PER_MB);

    ModuleOutcome::Completed(MemoryUsage {
        rss,
        vms,
        percent,
        js_heap_used: heap_mb("used"),
        js_heap_total: heap_mb("total"),
    })
}

const AXE_SCRIPT: &str = r#"
    const done = arguments[arguments.length - 1];
    const axeUrl = arguments[0];
    function run() {
        window.axe.run(document).then(function (results) {
            done({
                violations: results.violations.map(function (v) {
                    return {
                        rule_id: v.id,
                        impact: v.impact,
                        description: v.description,
                        help_url: v.helpUrl,
                        nodes: v.nodes.length
                    };
                })
            });
        }).catch(function (err) { done({ error: String(err) }); });
    }
    if (window.axe) {
        run();
    } else {
        const script = document.createElement('script');
        script.src = axeUrl;
        script.onload = run;
        script.onerror = function () { done({ error: 'could not load axe-core from ' + axeUrl }); };
        document.head.appendChild(script);
    }
"#;

/// Run axe-core in the page and collect its violations
pub async fn check_accessibility<B: BrowserControl>(
    browser: &B,
    features: &FeatureFlags,
    out: &OutputWriter,
) -> ModuleOutcome<AccessibilityReport> {
    if !features.accessibility {
        return ModuleOutcome::Disabled;
    }

    let value = match browser.execute_async(AXE_SCRIPT, vec![json!(AXE_CORE_URL)]).await {
        Ok(value) => value,
        Err(e) => return failed("perform accessibility check", out, e),
    };

    if let Some(err) = value.get("error").and_then(Value::as_str) {
        return failed("perform accessibility check", out, err);
    }

    let report: AccessibilityReport = match serde_json::from_value(value) {
        Ok(report) => report,
        Err(e) => return failed("perform accessibility check", out, e),
    };

    if !report.violations.is_empty() {
        out.section("Accessibility Issues Found");
        for violation in &report.violations {
            out.warning(&format!("Rule: {}", violation.rule_id));
            out.info(&format!(
                "Impact: {}",
                violation.impact.as_deref().unwrap_or("unknown")
            ));
            out.info(&format!("Description: {}", violation.description));
        }
    }

    ModuleOutcome::Completed(report)
}

/// Fetch the current URL over HTTP and check the five security headers
pub async fn analyze_security_headers<B: BrowserControl, H: HeaderFetcher>(
    browser: &B,
    fetcher: &H,
    features: &FeatureFlags,
    out: &OutputWriter,
) -> ModuleOutcome<SecurityHeaders> {
    if !features.security {
        return ModuleOutcome::Disabled;
    }

    let url = match browser.current_url().await {
        Ok(url) => url,
        Err(e) => return failed("analyze security headers", out, e),
    };

    match fetcher.fetch_headers(&url).await {
        Ok(headers) => ModuleOutcome::Completed(SecurityHeaders::from_response(&headers)),
        Err(e) => failed("analyze security headers", out, e),
    }
}

const LOCAL_STORAGE_SCRIPT: &str = r#"
    const items = {};
    for (let i = 0; i < localStorage.length; i++) {
        const key = localStorage.key(i);
        items[key] = localStorage.getItem(key);
    }
    return items;
"#;

/// Cookies and localStorage entries of the current page
pub async fn inspect_storage<B: BrowserControl>(
    browser: &B,
    features: &FeatureFlags,
    out: &OutputWriter,
) -> ModuleOutcome<StorageSnapshot> {
    if !features.storage {
        return ModuleOutcome::Disabled;
    }

    let cookies = match browser.cookies().await {
        Ok(cookies) => cookies,
        Err(e) => return failed("inspect storage", out, e),
    };

    let local_storage = match browser.execute(LOCAL_STORAGE_SCRIPT, vec![]).await {
        Ok(Value::Object(items)) => items
            .into_iter()
            .map(|(k, v)| {
                let value = match v {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                (k, value)
            })
            .collect(),
        Ok(Value::Null) => BTreeMap::new(),
        Ok(other) => {
            let reason = format!("unexpected localStorage payload: {}", other);
            return failed("inspect storage", out, reason);
        }
        Err(e) => return failed("inspect storage", out, e),
    };

    ModuleOutcome::Completed(StorageSnapshot {
        cookies,
        local_storage,
    })
}

/// Run every module in order. Disabled modules make no collaborator calls.
pub async fn run_enabled<B: BrowserControl, H: HeaderFetcher>(
    browser: &B,
    fetcher: &H,
    layout: &ReportLayout,
    features: &FeatureFlags,
    error_count: usize,
    out: &OutputWriter,
) -> EnrichmentResults {
    EnrichmentResults {
        screenshots: capture_screenshot(browser, layout, features, error_count, out).await,
        memory: memory_usage(browser, features, out).await,
        accessibility: check_accessibility(browser, features, out).await,
        security: analyze_security_headers(browser, fetcher, features, out).await,
        storage: inspect_storage(browser, features, out).await,
    }
}
