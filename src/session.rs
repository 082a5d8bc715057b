// Session orchestrator - one run against one URL, from navigation to report
use crate::aggregator::LogAggregator;
use crate::browser::{BrowserControl, BrowserError};
use crate::config::{AuthMode, Credentials, SessionConfig};
use crate::enrichment::{self, EnrichmentResults};
use crate::headers::HeaderFetcher;
use crate::layout::ReportLayout;
use crate::models::{source_excerpt, DiagnosticEntry, NetworkRequest, PageInfo, RawJsError};
use crate::output::{format_seconds, OutputWriter};
use crate::report::Report;
use chrono::{Local, Utc};
use serde_json::Value;
use std::future::Future;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const STALENESS_POLL: Duration = Duration::from_millis(100);

const INJECT_ERROR_LISTENERS: &str = r#"
    window.jsErrors = [];
    window.addEventListener('error', function (event) {
        window.jsErrors.push({
            type: 'error',
            message: event.message,
            filename: event.filename,
            lineno: event.lineno,
            colno: event.colno,
            error: event.error ? event.error.stack : null,
            timestamp: new Date().toISOString()
        });
    });
    window.addEventListener('unhandledrejection', function (event) {
        window.jsErrors.push({
            type: 'unhandledrejection',
            message: event.reason instanceof Error ? String(event.reason) : event.reason,
            timestamp: new Date().toISOString()
        });
    });
"#;

const READ_JS_ERRORS: &str = "return window.jsErrors || [];";

const READ_RESOURCE_TIMING: &str = r#"
    const performance = window.performance || {};
    const entries = performance.getEntriesByType ? performance.getEntriesByType("resource") : [];
    return entries.map(entry => ({
        name: entry.name,
        duration: entry.duration,
        startTime: entry.startTime,
        responseEnd: entry.responseEnd,
        initiatorType: entry.initiatorType
    }));
"#;

/// Where a session is in its run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Navigating,
    Authenticating,
    Collecting,
    Enriching,
    Reporting,
    Done,
    Failed,
}

/// What a finished session hands back to the caller
#[derive(Debug)]
pub struct SessionOutcome {
    pub state: SessionState,
    pub history: Vec<SessionState>,
    pub report: Option<Report>,
    pub export_path: Option<PathBuf>,
    pub error: Option<String>,
}

impl SessionOutcome {
    pub fn succeeded(&self) -> bool {
        self.state == SessionState::Done
    }

    /// 0 for Done, 1 for Failed
    pub fn exit_code(&self) -> i32 {
        if self.succeeded() {
            0
        } else {
            1
        }
    }
}

/// Page state read back after navigation settles
struct CapturedPage {
    url: String,
    title: String,
    source_excerpt: String,
    network_requests: Vec<NetworkRequest>,
}

pub struct Session<'a, H: HeaderFetcher> {
    config: SessionConfig,
    headers: &'a H,
    out: OutputWriter,
    layout: ReportLayout,
    state: SessionState,
    history: Vec<SessionState>,
}

impl<'a, H: HeaderFetcher> Session<'a, H> {
    pub fn new(config: SessionConfig, headers: &'a H, out: OutputWriter) -> Self {
        let layout = ReportLayout::new(config.reports_dir.clone());
        Self {
            config,
            headers,
            out,
            layout,
            state: SessionState::Idle,
            history: vec![SessionState::Idle],
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug!("Session {:?} -> {:?}", self.state, next);
        self.state = next;
        self.history.push(next);
    }

    fn fail(mut self, err: impl std::fmt::Display) -> SessionOutcome {
        let message = err.to_string();
        error!("Session failed: {}", message);
        self.out.error(&format!("Error: {}", message));
        self.transition(SessionState::Failed);
        SessionOutcome {
            state: self.state,
            history: self.history,
            report: None,
            export_path: None,
            error: Some(message),
        }
    }

    /// Run the whole session. `connect` acquires the browser; it is released
    /// exactly once on every path after a successful connect.
    pub async fn run<B, F, Fut>(mut self, connect: F) -> SessionOutcome
    where
        B: BrowserControl,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<B, BrowserError>>,
    {
        let started = Instant::now();

        if self.config.needs_output_layout() {
            if let Err(e) = self.layout.ensure() {
                warn!("Could not prepare output directories: {:#}", e);
                self.out.warning(&format!("Could not prepare output directories: {:#}", e));
            }
        }

        let browser = match connect().await {
            Ok(browser) => browser,
            Err(e) => return self.fail(e),
        };

        let result = self.drive(&browser, started).await;

        if let Err(e) = browser.shutdown(self.config.keep_open).await {
            warn!("Browser shutdown failed: {}", e);
            self.out.warning(&format!("Browser shutdown failed: {}", e));
        }

        match result {
            Ok((report, export_path)) => {
                self.transition(SessionState::Done);
                SessionOutcome {
                    state: self.state,
                    history: self.history,
                    report: Some(report),
                    export_path,
                    error: None,
                }
            }
            Err(e) => self.fail(e),
        }
    }

    async fn drive<B: BrowserControl>(
        &mut self,
        browser: &B,
        started: Instant,
    ) -> Result<(Report, Option<PathBuf>), BrowserError> {
        self.transition(SessionState::Navigating);
        self.out.info(&format!("Visiting {}...", self.config.url));
        let load_started = Instant::now();
        browser.navigate(&self.config.url).await?;
        let load_time = load_started.elapsed().as_secs_f64();
        info!("Page loaded in {:.2}s", load_time);

        let login_time = match self.config.auth.clone() {
            AuthMode::None => None,
            AuthMode::Scripted {
                credentials,
                username_field,
                password_field,
            } => {
                self.transition(SessionState::Authenticating);
                self.login(browser, &credentials, &username_field, &password_field)
                    .await
            }
            AuthMode::Interactive { wait } => {
                self.transition(SessionState::Authenticating);
                self.out
                    .warning("Interactive mode enabled. Please log in manually if needed.");
                self.out
                    .warning(&format!("Waiting {} seconds after login...", wait.as_secs()));
                tokio::time::sleep(wait).await;
                self.out.success("Proceeding with analysis...");
                None
            }
        };

        self.transition(SessionState::Collecting);
        self.out.info("Running analysis...");
        let mut aggregator = LogAggregator::new();
        let page = self.collect(browser, &mut aggregator).await;
        debug!(
            "Aggregated {} entries, {} significant",
            aggregator.entries().len(),
            aggregator.category_counts().total()
        );

        self.transition(SessionState::Enriching);
        let enrichment = self.enrich(browser, aggregator.significant_count()).await;

        self.transition(SessionState::Reporting);
        let page_info = PageInfo {
            url: page.url,
            title: page.title,
            load_time_seconds: load_time,
            login_time_seconds: login_time,
            total_time_seconds: started.elapsed().as_secs_f64(),
            page_source_excerpt: page.source_excerpt,
            network_requests: page.network_requests,
        };
        let report = Report::build(page_info, aggregator.finalize(), enrichment);
        self.out.raw(&report.render());

        let export_path = match report.export(self.config.export, &self.layout, Local::now()) {
            Ok(Some(path)) => {
                info!("Report exported to {}", path.display());
                self.out
                    .success(&format!("Report exported to: {}", path.display()));
                Some(path)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Export failed: {:#}", e);
                self.out.warning(&format!("Failed to export results: {:#}", e));
                None
            }
        };

        Ok((report, export_path))
    }

    /// Fill and submit the login form, then wait for the username field to go
    /// stale. Returns the login duration, or None when login did not settle.
    async fn login<B: BrowserControl>(
        &self,
        browser: &B,
        credentials: &Credentials,
        username_field: &str,
        password_field: &str,
    ) -> Option<f64> {
        let timeout = self.config.login_timeout;
        let started = Instant::now();
        info!("Attempting login as {}", credentials.username);

        let submitted = async {
            let username = browser.wait_for_field(username_field, timeout).await?;
            let password = browser.wait_for_field(password_field, timeout).await?;
            browser.type_into(&username, &credentials.username).await?;
            browser.type_into(&password, &credentials.password).await?;
            browser.submit(&password).await?;
            Ok::<_, BrowserError>(username)
        };

        let username = match submitted.await {
            Ok(element) => element,
            Err(e) => {
                warn!("Login form not usable: {}", e);
                self.out
                    .warning(&format!("Login skipped: {}. Continuing without authentication.", e));
                return None;
            }
        };

        let went_stale = tokio::time::timeout(timeout, async {
            loop {
                match browser.is_stale(&username).await {
                    Ok(true) => return Ok(()),
                    Ok(false) => tokio::time::sleep(STALENESS_POLL).await,
                    Err(e) => return Err(e),
                }
            }
        })
        .await;

        match went_stale {
            Ok(Ok(())) => {
                let elapsed = started.elapsed().as_secs_f64();
                info!("Login completed in {:.2}s", elapsed);
                self.out
                    .success(&format!("Login completed in {}", format_seconds(elapsed)));
                Some(elapsed)
            }
            Ok(Err(e)) => {
                warn!("Could not confirm login: {}", e);
                self.out
                    .warning(&format!("Could not confirm login: {}. Continuing.", e));
                None
            }
            Err(_) => {
                warn!("Page did not reload within {:?} after login", timeout);
                self.out.warning(&format!(
                    "Login did not complete within {}s. Continuing without authentication.",
                    timeout.as_secs_f64()
                ));
                None
            }
        }
    }

    /// Inject listeners, read page state, and feed every log into the aggregator
    async fn collect<B: BrowserControl>(
        &self,
        browser: &B,
        aggregator: &mut LogAggregator,
    ) -> CapturedPage {
        if let Err(e) = browser.execute(INJECT_ERROR_LISTENERS, vec![]).await {
            self.recoverable("inject error listeners", &e);
        } else if !self.config.page_settle.is_zero() {
            tokio::time::sleep(self.config.page_settle).await;
        }

        let url = match browser.current_url().await {
            Ok(url) => url,
            Err(e) => {
                self.recoverable("read current URL", &e);
                self.config.url.clone()
            }
        };
        let title = browser.title().await.unwrap_or_else(|e| {
            self.recoverable("read page title", &e);
            String::new()
        });
        let source = browser.page_source().await.unwrap_or_else(|e| {
            self.recoverable("read page source", &e);
            String::new()
        });

        let network_requests = match browser.execute(READ_RESOURCE_TIMING, vec![]).await {
            Ok(value) => parse_list::<NetworkRequest>(value, "resource timing"),
            Err(e) => {
                self.recoverable("read resource timing", &e);
                Vec::new()
            }
        };

        match browser.browser_logs().await {
            Ok(logs) => {
                debug!("Collected {} browser log entries", logs.len());
                aggregator.extend(logs.into_iter().map(DiagnosticEntry::from));
            }
            Err(e) => self.recoverable("read browser console log", &e),
        }

        match browser.execute(READ_JS_ERRORS, vec![]).await {
            Ok(value) => {
                let collected_at = Utc::now().timestamp_millis();
                let errors = parse_list::<RawJsError>(value, "injected JS errors");
                debug!("Collected {} injected JS errors", errors.len());
                aggregator.extend(errors.into_iter().map(|e| e.into_entry(collected_at)));
            }
            Err(e) => self.recoverable("read injected JS errors", &e),
        }

        CapturedPage {
            url,
            title,
            source_excerpt: source_excerpt(&source),
            network_requests,
        }
    }

    async fn enrich<B: BrowserControl>(
        &self,
        browser: &B,
        error_count: usize,
    ) -> EnrichmentResults {
        if !self.config.features.any() {
            debug!("No enrichment modules enabled");
        }
        enrichment::run_enabled(
            browser,
            self.headers,
            &self.layout,
            &self.config.features,
            error_count,
            &self.out,
        )
        .await
    }

    fn recoverable(&self, what: &str, err: &BrowserError) {
        warn!("Could not {}: {}", what, err);
        self.out.warning(&format!("Could not {}: {}", what, err));
    }
}

/// Parse a script result array, skipping entries of the wrong shape
fn parse_list<T: serde::de::DeserializeOwned>(value: Value, what: &str) -> Vec<T> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match serde_json::from_value(item) {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    debug!("Skipping malformed {} entry: {}", what, e);
                    None
                }
            })
            .collect(),
        Value::Null => Vec::new(),
        other => {
            debug!("Unexpected {} payload: {}", what, other);
            Vec::new()
        }
    }
}
