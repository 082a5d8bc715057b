// Report assembly, console rendering and JSON/HTML export
use crate::aggregator::AggregationState;
use crate::config::ExportFormat;
use crate::enrichment::EnrichmentResults;
use crate::layout::ReportLayout;
use crate::models::PageInfo;
use crate::output::{format_megabytes, format_seconds};
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

const RULE_WIDTH: usize = 80;
const SLOWEST_REQUESTS: usize = 5;

/// Immutable snapshot of one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub page_info: PageInfo,
    pub console_logs: AggregationState,
    pub advanced_features: EnrichmentResults,
}

impl Report {
    pub fn build(
        page_info: PageInfo,
        console_logs: AggregationState,
        advanced_features: EnrichmentResults,
    ) -> Self {
        Self {
            page_info,
            console_logs,
            advanced_features,
        }
    }

    /// Same data, category counts compared without regard to order
    #[cfg(test)]
    pub fn equivalent(&self, other: &Report) -> bool {
        self.page_info == other.page_info
            && self.console_logs.entries == other.console_logs.entries
            && self
                .console_logs
                .category_counts
                .same_counts(&other.console_logs.category_counts)
            && self.advanced_features == other.advanced_features
    }

    /// Console layout: timing, page info, categorized logs, then each present enrichment
    pub fn render(&self) -> String {
        let mut out = Vec::new();
        let rule = "=".repeat(RULE_WIDTH);
        let label = |s: &str| s.bold().to_string();
        let page = &self.page_info;

        out.push(format!("\n{}", rule.cyan()));
        out.push(format!("{}", "DETAILED ANALYSIS REPORT".bold().cyan()));
        out.push(format!("{}", rule.cyan()));

        let mut section = 0;
        let mut heading = |title: &str| {
            section += 1;
            format!("\n{}", format!("{}. {}:", section, title).bold())
        };

        out.push(heading("Timing Information"));
        out.push(format!(
            "{} {}",
            label("Page Load Time:"),
            format_seconds(page.load_time_seconds)
        ));
        if let Some(login) = page.login_time_seconds {
            out.push(format!("{} {}", label("Login Time:"), format_seconds(login)));
        }
        out.push(format!(
            "{} {}",
            label("Total Analysis Time:"),
            format_seconds(page.total_time_seconds)
        ));

        out.push(heading("Page Information"));
        out.push(format!("{} {}", label("URL:"), page.url));
        out.push(format!("{} {}", label("Page Title:"), page.title));

        out.push(heading("Console Errors and Warnings"));
        out.push(self.console_logs.render_formatted());

        if !page.network_requests.is_empty() {
            out.push(heading("Network Requests"));
            out.push(format!("{} {}", label("Requests:"), page.network_requests.len()));
            let mut slowest: Vec<_> = page.network_requests.iter().collect();
            slowest.sort_by(|a, b| b.duration.total_cmp(&a.duration));
            for request in slowest.into_iter().take(SLOWEST_REQUESTS) {
                out.push(format!(
                    "  {:>9.1} ms  [{}] {}",
                    request.duration, request.initiator_type, request.name
                ));
            }
        }

        let features = &self.advanced_features;

        if let Some(path) = features.screenshots.completed() {
            out.push(heading("Screenshot"));
            out.push(format!("{} {}", label("Saved:"), path.display()));
        }

        if let Some(memory) = features.memory.completed() {
            out.push(heading("Memory Usage"));
            out.push(format!("{} {}", label("RSS:"), format_megabytes(memory.rss)));
            out.push(format!("{} {}", label("VMS:"), format_megabytes(memory.vms)));
            out.push(format!("{} {:.2}%", label("Percent:"), memory.percent));
            if let (Some(used), Some(total)) = (memory.js_heap_used, memory.js_heap_total) {
                out.push(format!(
                    "{} {} / {}",
                    label("JS Heap:"),
                    format_megabytes(used),
                    format_megabytes(total)
                ));
            }
        }

        if let Some(report) = features.accessibility.completed() {
            out.push(heading("Accessibility"));
            if report.violations.is_empty() {
                out.push(format!("{}", "No accessibility violations found.".green()));
            } else {
                out.push(format!("{} violation(s)", report.violations.len()));
                for v in &report.violations {
                    out.push(format!(
                        "  {} [{}] {} ({} node(s))",
                        v.rule_id.yellow(),
                        v.impact.as_deref().unwrap_or("unknown"),
                        v.description,
                        v.nodes
                    ));
                }
            }
        }

        if let Some(security) = features.security.completed() {
            out.push(heading("Security Headers"));
            for (name, value) in security.entries() {
                let value = if value == crate::enrichment::NOT_SET {
                    value.red().to_string()
                } else {
                    value.green().to_string()
                };
                out.push(format!("{} {}", label(&format!("{}:", name)), value));
            }
        }

        if let Some(storage) = features.storage.completed() {
            out.push(heading("Storage"));
            out.push(format!("{} {}", label("Cookies:"), storage.cookies.len()));
            for cookie in &storage.cookies {
                out.push(format!(
                    "  {} (domain: {}, secure: {}, httpOnly: {})",
                    cookie.name,
                    cookie.domain.as_deref().unwrap_or("-"),
                    cookie.secure,
                    cookie.http_only
                ));
            }
            out.push(format!(
                "{} {}",
                label("localStorage entries:"),
                storage.local_storage.len()
            ));
            for key in storage.local_storage.keys() {
                out.push(format!("  {}", key));
            }
        }

        out.join("\n")
    }

    /// Write the report under the layout. `ExportFormat::None` writes nothing.
    pub fn export(
        &self,
        format: ExportFormat,
        layout: &ReportLayout,
        at: DateTime<Local>,
    ) -> Result<Option<PathBuf>> {
        let (path, contents) = match format {
            ExportFormat::None => return Ok(None),
            ExportFormat::Json => (
                layout.json_report_path(at),
                serde_json::to_string_pretty(self)?,
            ),
            ExportFormat::Html => (layout.html_report_path(at), self.to_html()?),
        };

        fs::write(&path, contents)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;

        Ok(Some(path))
    }

    pub fn to_html(&self) -> Result<String> {
        let block = |value: String| html_escape(&value);
        let page_info = block(serde_json::to_string_pretty(&self.page_info)?);
        let console_logs = block(serde_json::to_string_pretty(&self.console_logs)?);
        let advanced = block(serde_json::to_string_pretty(&self.advanced_features)?);

        Ok(format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>aiDoc Report</title>
    <style>
        body {{ font-family: Arial, sans-serif; margin: 20px; }}
        .error {{ color: red; }}
        .warning {{ color: orange; }}
        .success {{ color: green; }}
        .section {{ margin: 20px 0; padding: 10px; border: 1px solid #ccc; }}
    </style>
</head>
<body>
    <h1>aiDoc Analysis Report</h1>
    <div class="section">
        <h2>Page Information</h2>
        <pre>{}</pre>
    </div>
    <div class="section">
        <h2>Console Logs</h2>
        <pre>{}</pre>
    </div>
    <div class="section">
        <h2>Advanced Analysis</h2>
        <pre>{}</pre>
    </div>
</body>
</html>
"#,
            page_info, console_logs, advanced
        ))
    }
}

fn html_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::LogAggregator;
    use crate::enrichment::{MemoryUsage, ModuleOutcome, SecurityHeaders};
    use crate::models::{DiagnosticEntry, LogLevel, NetworkRequest};

    fn sample_report() -> Report {
        let mut aggregator = LogAggregator::new();
        aggregator.add_entry(DiagnosticEntry::new(
            LogLevel::Severe,
            "Cannot read properties of undefined",
            "app.js",
            1_700_000_000_000,
        ));
        aggregator.add_entry(DiagnosticEntry::new(
            LogLevel::Warning,
            "net::ERR_CONNECTION_REFUSED",
            "network",
            1_700_000_000_500,
        ));
        aggregator.add_entry(DiagnosticEntry::new(
            LogLevel::Info,
            "<script>ready</script>",
            "console-api",
            1_700_000_001_000,
        ));

        let page_info = PageInfo {
            url: "https://example.com/".to_string(),
            title: "Example".to_string(),
            load_time_seconds: 1.25,
            login_time_seconds: None,
            total_time_seconds: 3.5,
            page_source_excerpt: "<html></html>".to_string(),
            network_requests: vec![
                NetworkRequest {
                    name: "https://example.com/app.js".to_string(),
                    duration: 120.0,
                    start_time: 10.0,
                    response_end: 130.0,
                    initiator_type: "script".to_string(),
                },
                NetworkRequest {
                    name: "https://example.com/big.png".to_string(),
                    duration: 900.5,
                    start_time: 20.0,
                    response_end: 920.5,
                    initiator_type: "img".to_string(),
                },
            ],
        };

        let advanced = EnrichmentResults {
            memory: ModuleOutcome::Completed(MemoryUsage {
                rss: 42.0,
                vms: 512.0,
                percent: 0.5,
                js_heap_used: None,
                js_heap_total: None,
            }),
            security: ModuleOutcome::Completed(SecurityHeaders::from_response(&[(
                "X-Frame-Options".to_string(),
                "SAMEORIGIN".to_string(),
            )])),
            accessibility: ModuleOutcome::Failed {
                reason: "script timeout".to_string(),
            },
            ..Default::default()
        };

        Report::build(page_info, aggregator.finalize(), advanced)
    }

    #[test]
    fn test_render_sections() {
        let rendered = sample_report().render();

        assert!(rendered.contains("DETAILED ANALYSIS REPORT"));
        assert!(rendered.contains("1.25s"));
        assert!(rendered.contains("3.50s"));
        assert!(rendered.contains("https://example.com/"));
        assert!(rendered.contains("Cannot read properties of undefined"));
        assert!(rendered.contains("Network Requests"));
        assert!(rendered.contains("Memory Usage"));
        assert!(rendered.contains("SAMEORIGIN"));
        assert!(!rendered.contains("Login Time"));
        // absent modules leave no section
        assert!(!rendered.contains("Accessibility"));
        assert!(!rendered.contains("Screenshot"));
        assert!(!rendered.contains("Storage"));

        // slowest request first
        let img = rendered.find("[img]").unwrap();
        let script = rendered.find("[script]").unwrap();
        assert!(img < script);
    }

    #[test]
    fn test_render_is_repeatable() {
        let report = sample_report();
        assert_eq!(report.render(), report.render());
    }

    #[test]
    fn test_json_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = ReportLayout::new(tmp.path());
        layout.ensure().unwrap();
        let mut report = sample_report();
        report.page_info.load_time_seconds = 1.7546217903306627;
        report.page_info.total_time_seconds = 0.1 + 0.2;
        report.page_info.network_requests[0].duration = 37.900000000000006;

        let path = report
            .export(ExportFormat::Json, &layout, Local::now())
            .unwrap()
            .expect("json path");
        assert!(path.starts_with(layout.json_dir()));

        let text = fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert!(value.get("page_info").is_some());
        assert!(value.get("console_logs").is_some());
        assert_eq!(value["advanced_features"]["memory"]["status"], "completed");
        assert_eq!(value["advanced_features"]["screenshots"]["status"], "disabled");
        assert_eq!(value["console_logs"]["category_counts"]["JavaScript"], 1);

        let parsed: Report = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.page_info.load_time_seconds, 1.7546217903306627);
        assert_eq!(parsed.page_info.total_time_seconds, 0.1 + 0.2);
        assert!(parsed.equivalent(&report));
    }

    #[test]
    fn test_html_export_escapes() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = ReportLayout::new(tmp.path());
        layout.ensure().unwrap();

        let path = sample_report()
            .export(ExportFormat::Html, &layout, Local::now())
            .unwrap()
            .expect("html path");
        let html = fs::read_to_string(&path).unwrap();

        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<h2>Console Logs</h2>"));
        assert!(html.contains("&lt;script&gt;ready&lt;/script&gt;"));
        assert!(!html.contains("<script>ready"));
        assert!(html.contains("&quot;url&quot;"));
    }

    #[test]
    fn test_export_none_writes_nothing() {
        let layout = ReportLayout::new("does-not-exist");
        let result = sample_report()
            .export(ExportFormat::None, &layout, Local::now())
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_html_escape() {
        assert_eq!(
            html_escape(r#"<a href="x">'&'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&#x27;&amp;&#x27;&lt;/a&gt;"
        );
    }
}
