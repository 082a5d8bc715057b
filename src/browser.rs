// Browser control over W3C WebDriver (chromedriver) via fantoccini
use crate::models::RawBrowserLog;
use async_trait::async_trait;
use fantoccini::error::CmdError;
use fantoccini::wd::WebDriverCompatibleCommand;
use fantoccini::{Client, ClientBuilder, Locator};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Errors raised by the browser-control collaborator
#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("could not start a WebDriver session at {url}: {reason}")]
    SessionFailed { url: String, reason: String },
    #[error("navigation to {url} failed: {reason}")]
    NavigationFailed { url: String, reason: String },
    #[error("script execution failed: {0}")]
    Script(String),
    #[error("field '{name}' did not appear within {timeout:?}")]
    FieldTimeout { name: String, timeout: Duration },
    #[error("WebDriver command failed: {0}")]
    Command(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<CmdError> for BrowserError {
    fn from(err: CmdError) -> Self {
        BrowserError::Command(err.to_string())
    }
}

/// Cookie as reported by the browser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub secure: bool,
    pub http_only: bool,
}

/// Operations the session needs from a remote-controlled browser
#[async_trait]
pub trait BrowserControl: Send + Sync {
    /// Handle to a located form field
    type Element: Send + Sync;

    async fn navigate(&self, url: &str) -> Result<(), BrowserError>;

    /// Drain the browser's buffered console log
    async fn browser_logs(&self) -> Result<Vec<RawBrowserLog>, BrowserError>;

    async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value, BrowserError>;

    /// Run a script whose last argument is a completion callback
    async fn execute_async(&self, script: &str, args: Vec<Value>) -> Result<Value, BrowserError>;

    async fn current_url(&self) -> Result<String, BrowserError>;

    async fn title(&self) -> Result<String, BrowserError>;

    async fn page_source(&self) -> Result<String, BrowserError>;

    async fn save_screenshot(&self, path: &Path) -> Result<(), BrowserError>;

    async fn cookies(&self) -> Result<Vec<StoredCookie>, BrowserError>;

    /// Wait until a field with the given `name` attribute is present
    async fn wait_for_field(
        &self,
        name: &str,
        timeout: Duration,
    ) -> Result<Self::Element, BrowserError>;

    async fn type_into(&self, element: &Self::Element, text: &str) -> Result<(), BrowserError>;

    /// Submit the form owning `element`
    async fn submit(&self, element: &Self::Element) -> Result<(), BrowserError>;

    /// True once the element is detached from the current document
    async fn is_stale(&self, element: &Self::Element) -> Result<bool, BrowserError>;

    /// Release the session. With `keep_open` the browser stays up for the user.
    async fn shutdown(self, keep_open: bool) -> Result<(), BrowserError>;
}

/// Connection settings for a WebDriver-backed Chrome session
#[derive(Debug, Clone)]
pub struct WebDriverOptions {
    pub webdriver_url: String,
    pub headless: bool,
}

/// chromedriver's legacy log endpoint: `POST /session/{id}/se/log`
#[derive(Debug)]
struct GetBrowserLog;

impl WebDriverCompatibleCommand for GetBrowserLog {
    fn endpoint(
        &self,
        base_url: &url::Url,
        session_id: Option<&str>,
    ) -> Result<url::Url, url::ParseError> {
        let session = session_id.unwrap_or_default();
        base_url.join(&format!("session/{}/se/log", session))
    }

    fn method_and_body(&self, _request_url: &url::Url) -> (http::Method, Option<String>) {
        (http::Method::POST, Some(json!({ "type": "browser" }).to_string()))
    }
}

const ENTER_KEY: &str = "\u{E007}";

/// A held element that is detached or no longer found counts as stale
fn staleness<T>(lookup: Result<T, CmdError>) -> Result<bool, BrowserError> {
    match lookup {
        Ok(_) => Ok(false),
        Err(e) if e.is_stale_element_reference() || e.is_no_such_element() => Ok(true),
        Err(e) => Err(e.into()),
    }
}

pub struct WebDriverBrowser {
    client: Client,
}

impl WebDriverBrowser {
    /// Start a Chrome session on the given WebDriver endpoint
    pub async fn connect(options: &WebDriverOptions) -> Result<Self, BrowserError> {
        info!("Connecting to WebDriver at {}", options.webdriver_url);

        let mut args = vec![
            "--no-sandbox".to_string(),
            "--disable-dev-shm-usage".to_string(),
        ];
        if options.headless {
            args.push("--headless=new".to_string());
            args.push("--disable-gpu".to_string());
        }

        let mut caps = serde_json::Map::new();
        caps.insert("browserName".to_string(), json!("chrome"));
        caps.insert("goog:chromeOptions".to_string(), json!({ "args": args }));
        caps.insert("goog:loggingPrefs".to_string(), json!({ "browser": "ALL" }));

        debug!("Session capabilities: {:?}", caps);

        let client = ClientBuilder::rustls()
            .capabilities(caps)
            .connect(&options.webdriver_url)
            .await
            .map_err(|e| BrowserError::SessionFailed {
                url: options.webdriver_url.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self { client })
    }
}

#[async_trait]
impl BrowserControl for WebDriverBrowser {
    type Element = fantoccini::elements::Element;

    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        self.client
            .goto(url)
            .await
            .map_err(|e| BrowserError::NavigationFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })
    }

    async fn browser_logs(&self) -> Result<Vec<RawBrowserLog>, BrowserError> {
        let value = self.client.issue_cmd(GetBrowserLog).await?;
        serde_json::from_value(value)
            .map_err(|e| BrowserError::Command(format!("unexpected log payload: {}", e)))
    }

    async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value, BrowserError> {
        self.client
            .execute(script, args)
            .await
            .map_err(|e| BrowserError::Script(e.to_string()))
    }

    async fn execute_async(&self, script: &str, args: Vec<Value>) -> Result<Value, BrowserError> {
        self.client
            .execute_async(script, args)
            .await
            .map_err(|e| BrowserError::Script(e.to_string()))
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        Ok(self.client.current_url().await?.to_string())
    }

    async fn title(&self) -> Result<String, BrowserError> {
        Ok(self.client.title().await?)
    }

    async fn page_source(&self) -> Result<String, BrowserError> {
        Ok(self.client.source().await?)
    }

    async fn save_screenshot(&self, path: &Path) -> Result<(), BrowserError> {
        let png = self.client.screenshot().await?;
        std::fs::write(path, png)?;
        Ok(())
    }

    async fn cookies(&self) -> Result<Vec<StoredCookie>, BrowserError> {
        let cookies = self.client.get_all_cookies().await?;
        Ok(cookies
            .iter()
            .map(|c| StoredCookie {
                name: c.name().to_string(),
                value: c.value().to_string(),
                domain: c.domain().map(str::to_string),
                path: c.path().map(str::to_string),
                secure: c.secure().unwrap_or(false),
                http_only: c.http_only().unwrap_or(false),
            })
            .collect())
    }

    async fn wait_for_field(
        &self,
        name: &str,
        timeout: Duration,
    ) -> Result<Self::Element, BrowserError> {
        let selector = format!("[name=\"{}\"]", name);
        self.client
            .wait()
            .at_most(timeout)
            .for_element(Locator::Css(&selector))
            .await
            .map_err(|_| BrowserError::FieldTimeout {
                name: name.to_string(),
                timeout,
            })
    }

    async fn type_into(&self, element: &Self::Element, text: &str) -> Result<(), BrowserError> {
        element.clear().await?;
        element.send_keys(text).await?;
        Ok(())
    }

    async fn submit(&self, element: &Self::Element) -> Result<(), BrowserError> {
        element.send_keys(ENTER_KEY).await?;
        Ok(())
    }

    async fn is_stale(&self, element: &Self::Element) -> Result<bool, BrowserError> {
        staleness(element.tag_name().await)
    }

    async fn shutdown(self, keep_open: bool) -> Result<(), BrowserError> {
        if keep_open {
            info!("Leaving browser session open");
            self.client.persist().await?;
        } else {
            debug!("Closing WebDriver session");
            self.client.close().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fantoccini::error::{ErrorStatus, WebDriver};

    fn standard(status: ErrorStatus) -> Result<String, CmdError> {
        Err(CmdError::Standard(WebDriver::new(status, "element lookup failed")))
    }

    #[test]
    fn test_staleness_of_live_element() {
        assert!(!staleness(Ok("input".to_string())).unwrap());
    }

    #[test]
    fn test_detached_or_missing_element_is_stale() {
        assert!(staleness(standard(ErrorStatus::StaleElementReference)).unwrap());
        assert!(staleness(standard(ErrorStatus::NoSuchElement)).unwrap());
    }

    #[test]
    fn test_other_errors_propagate() {
        let err = staleness(standard(ErrorStatus::JavascriptError)).unwrap_err();
        assert!(matches!(err, BrowserError::Command(_)));
    }
}
