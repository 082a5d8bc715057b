// Category classifier - keyword rules mapping a diagnostic message to a bucket
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification bucket for a console diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    Authentication,
    Network,
    JavaScript,
    Resource,
    #[serde(rename = "DOM")]
    Dom,
    Other,
}

impl Category {
    pub fn name(&self) -> &'static str {
        match self {
            Category::Authentication => "Authentication",
            Category::Network => "Network",
            Category::JavaScript => "JavaScript",
            Category::Resource => "Resource",
            Category::Dom => "DOM",
            Category::Other => "Other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordered rules, first match wins. Keywords are lowercase.
const RULES: &[(Category, &[&str])] = &[
    (
        Category::Authentication,
        &["login", "auth", "credential", "permission"],
    ),
    (
        Category::Network,
        &["net::", "failed to load", "network", "fetch"],
    ),
    (
        Category::JavaScript,
        &["undefined", "null", "cannot read property", "is not a function"],
    ),
    (
        Category::Resource,
        &["404", "resource", "not found", "failed to load resource"],
    ),
    (
        Category::Dom,
        &["queryselector", "element", "node", "document"],
    ),
];

/// Classify a message. Case-insensitive, never fails.
pub fn classify(message: &str) -> Category {
    let message = message.to_lowercase();

    RULES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| message.contains(k)))
        .map(|(category, _)| *category)
        .unwrap_or(Category::Other)
}
