use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{debug, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod aggregator;
mod browser;
mod classifier;
mod config;
mod enrichment;
mod headers;
mod layout;
mod models;
mod output;
mod report;
mod session;
#[cfg(test)]
mod testing;

use browser::{WebDriverBrowser, WebDriverOptions};
use config::{AuthMode, ExportFormat, FeatureFlags, SessionConfig, DEFAULT_WEBDRIVER_URL};
use headers::HttpHeaderFetcher;
use output::{OutputMode, OutputWriter};
use session::Session;

#[derive(Parser)]
#[command(name = "aidoc")]
#[command(about = "Collect and classify browser console errors for a web page", long_about = None)]
#[command(version)]
struct Cli {
    /// Page to analyze
    url: String,

    /// Capture a screenshot when errors are found
    #[arg(long)]
    screenshots: bool,

    /// Measure browser process and JS heap memory
    #[arg(long)]
    memory: bool,

    /// Run an axe-core accessibility audit
    #[arg(long)]
    accessibility: bool,

    /// Check for common security response headers
    #[arg(long)]
    security: bool,

    /// Inspect cookies and localStorage
    #[arg(long)]
    storage: bool,

    /// Enable every analysis module
    #[arg(long)]
    all: bool,

    /// Export the report
    #[arg(long, value_enum)]
    export: Option<ExportFormat>,

    /// Username for form login
    #[arg(short, long, conflicts_with = "interactive", requires = "password")]
    username: Option<String>,

    /// Password for form login
    #[arg(short, long, requires = "username")]
    password: Option<String>,

    /// Name attribute of the username field
    #[arg(long, default_value = "username")]
    username_field: String,

    /// Name attribute of the password field
    #[arg(long, default_value = "password")]
    password_field: String,

    /// Seconds to wait for the login form and the post-login reload
    #[arg(long, default_value = "10")]
    login_timeout: u64,

    /// Open a visible browser and wait for a manual login
    #[arg(long)]
    interactive: bool,

    /// Seconds to wait in interactive mode before collecting
    #[arg(long, default_value = "10")]
    wait_after_login: u64,

    /// Milliseconds to let the page run after error listeners are injected
    #[arg(long, default_value = "1000")]
    settle_ms: u64,

    /// Leave the browser window open when done
    #[arg(long)]
    keep_open: bool,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// WebDriver endpoint (chromedriver)
    #[arg(long, env = "AIDOC_WEBDRIVER_URL", default_value = DEFAULT_WEBDRIVER_URL)]
    webdriver_url: String,

    /// Root directory for screenshots and exported reports
    #[arg(long, env = "AIDOC_REPORTS_DIR", default_value = "reports")]
    reports_dir: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Disable colors and symbols
    #[arg(long)]
    plain: bool,
}

impl Cli {
    fn features(&self) -> FeatureFlags {
        if self.all {
            return FeatureFlags::all();
        }
        FeatureFlags {
            screenshots: self.screenshots,
            memory: self.memory,
            accessibility: self.accessibility,
            security: self.security,
            storage: self.storage,
        }
    }

    fn auth(&self) -> AuthMode {
        if self.interactive {
            return AuthMode::Interactive {
                wait: Duration::from_secs(self.wait_after_login),
            };
        }
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => AuthMode::scripted(username, password)
                .with_field_names(&self.username_field, &self.password_field),
            _ => AuthMode::None,
        }
    }

    fn session_config(&self) -> SessionConfig {
        let mut config = SessionConfig::new(self.url.clone())
            .with_features(self.features())
            .with_export(self.export.unwrap_or_default())
            .with_reports_dir(self.reports_dir.clone())
            .with_login_timeout(Duration::from_secs(self.login_timeout))
            .with_page_settle(Duration::from_millis(self.settle_ms));
        config.webdriver_url = self.webdriver_url.clone();
        config.keep_open = self.keep_open;
        if self.headed {
            config.headless = false;
        }
        config.with_auth(self.auth())
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    let filter = EnvFilter::try_from_env("AIDOC_LOG")
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let out = if cli.plain {
        OutputWriter::new(OutputMode::Plain)
    } else {
        OutputWriter::auto()
    };
    out.banner();

    let config = cli.session_config();
    debug!("Session config: {:?}", config);

    let fetcher = HttpHeaderFetcher::new().context("Failed to build HTTP client")?;
    let options = WebDriverOptions {
        webdriver_url: config.webdriver_url.clone(),
        headless: config.headless,
    };

    let outcome = Session::new(config, &fetcher, out)
        .run(|| WebDriverBrowser::connect(&options))
        .await;

    debug!("Session states: {:?}", outcome.history);
    Ok(ExitCode::from(outcome.exit_code() as u8))
}
