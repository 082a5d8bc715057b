// In-memory browser and header-fetch doubles that count collaborator calls
use crate::browser::{BrowserControl, BrowserError, StoredCookie};
use crate::headers::{HeaderFetchError, HeaderFetcher};
use crate::models::RawBrowserLog;
use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What happens to the username field after the login form is submitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginBehavior {
    /// Page navigates away; the field goes stale
    Navigates,
    /// Page stays put; the field never goes stale
    Stays,
}

pub struct ScriptedBrowser {
    pub url: String,
    pub title: String,
    pub source: String,
    logs: Vec<RawBrowserLog>,
    js_errors: Value,
    network: Value,
    js_heap: Value,
    local_storage: Value,
    axe_result: Value,
    cookies: Vec<StoredCookie>,
    fields: Vec<String>,
    login: LoginBehavior,
    fail_navigation: bool,
    fail_screenshots: bool,
    submitted: AtomicBool,
    typed: Mutex<Vec<(String, String)>>,
    calls: AtomicUsize,
    shutdowns: Arc<AtomicUsize>,
    kept_open: Arc<AtomicBool>,
}

impl ScriptedBrowser {
    pub fn new() -> Self {
        Self {
            url: "https://example.com/".to_string(),
            title: "Example Domain".to_string(),
            source: "<html><head><title>Example Domain</title></head><body></body></html>"
                .to_string(),
            logs: Vec::new(),
            js_errors: Value::Array(vec![]),
            network: Value::Array(vec![]),
            js_heap: Value::Null,
            local_storage: Value::Object(Default::default()),
            axe_result: serde_json::json!({ "violations": [] }),
            cookies: Vec::new(),
            fields: Vec::new(),
            login: LoginBehavior::Navigates,
            fail_navigation: false,
            fail_screenshots: false,
            submitted: AtomicBool::new(false),
            typed: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            shutdowns: Arc::new(AtomicUsize::new(0)),
            kept_open: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_log(mut self, level: &str, message: &str, timestamp: i64) -> Self {
        self.logs.push(RawBrowserLog {
            level: level.to_string(),
            message: message.to_string(),
            source: Some("console-api".to_string()),
            timestamp,
        });
        self
    }

    pub fn with_js_errors(mut self, errors: Value) -> Self {
        self.js_errors = errors;
        self
    }

    pub fn with_network(mut self, entries: Value) -> Self {
        self.network = entries;
        self
    }

    pub fn with_js_heap(mut self, heap: Value) -> Self {
        self.js_heap = heap;
        self
    }

    pub fn with_local_storage(mut self, items: Value) -> Self {
        self.local_storage = items;
        self
    }

    pub fn with_axe_result(mut self, result: Value) -> Self {
        self.axe_result = result;
        self
    }

    pub fn with_cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.push(StoredCookie {
            name: name.to_string(),
            value: value.to_string(),
            domain: Some("example.com".to_string()),
            path: Some("/".to_string()),
            secure: true,
            http_only: false,
        });
        self
    }

    pub fn with_login_form(mut self, behavior: LoginBehavior) -> Self {
        self.fields = vec!["username".to_string(), "password".to_string()];
        self.login = behavior;
        self
    }

    pub fn failing_navigation(mut self) -> Self {
        self.fail_navigation = true;
        self
    }

    pub fn failing_screenshots(mut self) -> Self {
        self.fail_screenshots = true;
        self
    }

    /// Total collaborator calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Shared counter that outlives the browser being moved into `shutdown`
    pub fn shutdown_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.shutdowns)
    }

    pub fn kept_open_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.kept_open)
    }

    pub fn typed(&self) -> Vec<(String, String)> {
        self.typed.lock().unwrap().clone()
    }

    fn tick(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl BrowserControl for ScriptedBrowser {
    type Element = String;

    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        self.tick();
        if self.fail_navigation {
            return Err(BrowserError::NavigationFailed {
                url: url.to_string(),
                reason: "net::ERR_NAME_NOT_RESOLVED".to_string(),
            });
        }
        Ok(())
    }

    async fn browser_logs(&self) -> Result<Vec<RawBrowserLog>, BrowserError> {
        self.tick();
        Ok(self.logs.clone())
    }

    async fn execute(&self, script: &str, _args: Vec<Value>) -> Result<Value, BrowserError> {
        self.tick();
        let value = if script.contains("window.jsErrors ||") {
            self.js_errors.clone()
        } else if script.contains("getEntriesByType") {
            self.network.clone()
        } else if script.contains("performance.memory") {
            self.js_heap.clone()
        } else if script.contains("localStorage") {
            self.local_storage.clone()
        } else {
            Value::Null
        };
        Ok(value)
    }

    async fn execute_async(&self, _script: &str, _args: Vec<Value>) -> Result<Value, BrowserError> {
        self.tick();
        Ok(self.axe_result.clone())
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        self.tick();
        Ok(self.url.clone())
    }

    async fn title(&self) -> Result<String, BrowserError> {
        self.tick();
        Ok(self.title.clone())
    }

    async fn page_source(&self) -> Result<String, BrowserError> {
        self.tick();
        Ok(self.source.clone())
    }

    async fn save_screenshot(&self, path: &Path) -> Result<(), BrowserError> {
        self.tick();
        if self.fail_screenshots {
            return Err(BrowserError::Command("screenshot capture timed out".to_string()));
        }
        std::fs::write(path, b"\x89PNG\r\n\x1a\n")?;
        Ok(())
    }

    async fn cookies(&self) -> Result<Vec<StoredCookie>, BrowserError> {
        self.tick();
        Ok(self.cookies.clone())
    }

    async fn wait_for_field(&self, name: &str, timeout: Duration) -> Result<String, BrowserError> {
        self.tick();
        if self.fields.iter().any(|f| f == name) {
            Ok(name.to_string())
        } else {
            tokio::time::sleep(timeout).await;
            Err(BrowserError::FieldTimeout {
                name: name.to_string(),
                timeout,
            })
        }
    }

    async fn type_into(&self, element: &String, text: &str) -> Result<(), BrowserError> {
        self.tick();
        self.typed.lock().unwrap().push((element.clone(), text.to_string()));
        Ok(())
    }

    async fn submit(&self, _element: &String) -> Result<(), BrowserError> {
        self.tick();
        self.submitted.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn is_stale(&self, _element: &String) -> Result<bool, BrowserError> {
        self.tick();
        Ok(self.login == LoginBehavior::Navigates && self.submitted.load(Ordering::SeqCst))
    }

    async fn shutdown(self, keep_open: bool) -> Result<(), BrowserError> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        self.kept_open.store(keep_open, Ordering::SeqCst);
        Ok(())
    }
}

pub struct ScriptedHeaders {
    headers: Vec<(String, String)>,
    fail: bool,
    requested: Mutex<Vec<String>>,
}

impl ScriptedHeaders {
    pub fn new(headers: Vec<(String, String)>) -> Self {
        Self {
            headers,
            fail: false,
            requested: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(vec![])
        }
    }

    pub fn calls(&self) -> usize {
        self.requested.lock().unwrap().len()
    }

    pub fn requested_urls(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl HeaderFetcher for ScriptedHeaders {
    async fn fetch_headers(&self, url: &str) -> Result<Vec<(String, String)>, HeaderFetchError> {
        self.requested.lock().unwrap().push(url.to_string());
        if self.fail {
            return Err(HeaderFetchError::Request {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(self.headers.clone())
    }
}
