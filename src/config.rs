// Session configuration - feature flags, export choice and authentication mode
use crate::layout::DEFAULT_REPORTS_DIR;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";
pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_PAGE_SETTLE: Duration = Duration::from_secs(1);

/// Which enrichment modules run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlags {
    pub screenshots: bool,
    pub memory: bool,
    pub accessibility: bool,
    pub security: bool,
    pub storage: bool,
}

impl FeatureFlags {
    pub fn all() -> Self {
        Self {
            screenshots: true,
            memory: true,
            accessibility: true,
            security: true,
            storage: true,
        }
    }

    pub fn any(&self) -> bool {
        self.screenshots || self.memory || self.accessibility || self.security || self.storage
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    #[value(skip)]
    None,
    Json,
    Html,
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// How the session gets past a login wall
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AuthMode {
    #[default]
    None,
    /// Fill and submit a form located by field `name` attributes
    Scripted {
        credentials: Credentials,
        username_field: String,
        password_field: String,
    },
    /// Headed browser; the user logs in by hand during `wait`
    Interactive { wait: Duration },
}

impl AuthMode {
    pub fn scripted(username: impl Into<String>, password: impl Into<String>) -> Self {
        AuthMode::Scripted {
            credentials: Credentials {
                username: username.into(),
                password: password.into(),
            },
            username_field: "username".to_string(),
            password_field: "password".to_string(),
        }
    }

    /// Rename the login form fields; other modes are returned unchanged
    pub fn with_field_names(self, username_field: &str, password_field: &str) -> Self {
        match self {
            AuthMode::Scripted { credentials, .. } => AuthMode::Scripted {
                credentials,
                username_field: username_field.to_string(),
                password_field: password_field.to_string(),
            },
            other => other,
        }
    }

    pub fn is_interactive(&self) -> bool {
        matches!(self, AuthMode::Interactive { .. })
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub url: String,
    pub features: FeatureFlags,
    pub export: ExportFormat,
    pub auth: AuthMode,
    pub headless: bool,
    pub keep_open: bool,
    pub webdriver_url: String,
    pub reports_dir: PathBuf,
    pub login_timeout: Duration,
    pub page_settle: Duration,
}

impl SessionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            features: FeatureFlags::default(),
            export: ExportFormat::None,
            auth: AuthMode::None,
            headless: true,
            keep_open: false,
            webdriver_url: DEFAULT_WEBDRIVER_URL.to_string(),
            reports_dir: PathBuf::from(DEFAULT_REPORTS_DIR),
            login_timeout: DEFAULT_LOGIN_TIMEOUT,
            page_settle: DEFAULT_PAGE_SETTLE,
        }
    }

    pub fn with_features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }

    pub fn with_export(mut self, export: ExportFormat) -> Self {
        self.export = export;
        self
    }

    pub fn with_auth(mut self, auth: AuthMode) -> Self {
        // interactive login needs a visible window
        if auth.is_interactive() {
            self.headless = false;
        }
        self.auth = auth;
        self
    }

    pub fn with_reports_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.reports_dir = dir.into();
        self
    }

    pub fn with_login_timeout(mut self, timeout: Duration) -> Self {
        self.login_timeout = timeout;
        self
    }

    pub fn with_page_settle(mut self, settle: Duration) -> Self {
        self.page_settle = settle;
        self
    }

    /// Anything to write under the reports root
    pub fn needs_output_layout(&self) -> bool {
        self.features.screenshots || self.export != ExportFormat::None
    }
}
