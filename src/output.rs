// Console output - colored status lines for the operator running a session
use colored::Colorize;
use std::io::{self, IsTerminal};

const BANNER: &str = r"
    ___    _ ____
   /   |  (_) __ \____  _____
  / /| | / / / / / __ \/ ___/
 / ___ |/ / /_/ / /_/ / /__
/_/  |_/_/_____/\____/\___/
";

/// Output mode for console messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Colors and symbols
    Human,
    /// No ANSI codes (pipes, log files)
    Plain,
}

impl OutputMode {
    /// Human on a terminal unless NO_COLOR is set
    pub fn auto() -> Self {
        if !io::stdout().is_terminal() || std::env::var_os("NO_COLOR").is_some() {
            Self::Plain
        } else {
            Self::Human
        }
    }
}

/// Status writer shared by the session and the enrichment modules
#[derive(Debug, Clone, Copy)]
pub struct OutputWriter {
    mode: OutputMode,
}

impl OutputWriter {
    pub fn new(mode: OutputMode) -> Self {
        if mode == OutputMode::Plain {
            colored::control::set_override(false);
        }
        Self { mode }
    }

    pub fn auto() -> Self {
        Self::new(OutputMode::auto())
    }

    /// Writer that prints nothing colored; used by tests
    pub fn plain() -> Self {
        Self { mode: OutputMode::Plain }
    }

    pub fn banner(&self) {
        if self.mode == OutputMode::Human {
            println!("{}", BANNER.cyan());
            println!("{}\n", "[ Console Error Detection ]".blue());
        }
    }

    /// Print a section header
    pub fn section(&self, title: &str) {
        match self.mode {
            OutputMode::Human => {
                println!();
                println!("{}", title.cyan().bold());
                println!("{}", "═".repeat(title.chars().count()).cyan());
            }
            OutputMode::Plain => {
                println!();
                println!("{}", title);
                println!("{}", "=".repeat(title.chars().count()));
            }
        }
    }

    pub fn success(&self, message: &str) {
        match self.mode {
            OutputMode::Human => println!("  {} {}", "✓".green(), message.green()),
            OutputMode::Plain => println!("  [OK] {}", message),
        }
    }

    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Human => eprintln!("  {} {}", "✗".red(), message.red()),
            OutputMode::Plain => eprintln!("  [ERROR] {}", message),
        }
    }

    pub fn warning(&self, message: &str) {
        match self.mode {
            OutputMode::Human => println!("  {} {}", "⚠".yellow(), message.yellow()),
            OutputMode::Plain => println!("  [WARN] {}", message),
        }
    }

    pub fn info(&self, message: &str) {
        println!("  {}", message);
    }

    /// Print a block as-is (already formatted text)
    pub fn raw(&self, text: &str) {
        println!("{}", text);
    }
}

/// Seconds with two decimals, e.g. `1.25s`
pub fn format_seconds(seconds: f64) -> String {
    format!("{:.2}s", seconds)
}

/// Megabytes with one decimal
pub fn format_megabytes(mb: f64) -> String {
    format!("{:.1} MB", mb)
}
