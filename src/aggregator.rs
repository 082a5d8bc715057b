// Log aggregator - collects diagnostic entries and keeps per-category counts
use crate::classifier::{classify, Category};
use crate::models::{format_timestamp_millis, DiagnosticEntry, LogLevel};
use colored::Colorize;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

const BORDER_WIDTH: usize = 80;

/// Category counters in first-seen order. Serialized as a JSON object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryCounts(Vec<(Category, usize)>);

impl CategoryCounts {
    pub fn increment(&mut self, category: Category) {
        self.add(category, 1);
    }

    fn add(&mut self, category: Category, n: usize) {
        match self.0.iter_mut().find(|(c, _)| *c == category) {
            Some((_, count)) => *count += n,
            None => self.0.push((category, n)),
        }
    }

    pub fn get(&self, category: Category) -> usize {
        self.0
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, count)| *count)
            .unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, usize)> + '_ {
        self.0.iter().copied()
    }

    pub fn total(&self) -> usize {
        self.0.iter().map(|(_, count)| count).sum()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Same counts regardless of order
    #[cfg(test)]
    pub fn same_counts(&self, other: &CategoryCounts) -> bool {
        self.len() == other.len() && self.iter().all(|(c, n)| other.get(c) == n)
    }
}

impl Serialize for CategoryCounts {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (category, count) in &self.0 {
            map.serialize_entry(category, count)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for CategoryCounts {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CountsVisitor;

        impl<'de> Visitor<'de> for CountsVisitor {
            type Value = CategoryCounts;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of category to count")
            }

            fn visit_map<M: MapAccess<'de>>(self, mut access: M) -> Result<Self::Value, M::Error> {
                let mut counts = CategoryCounts::default();
                while let Some((category, count)) = access.next_entry::<Category, usize>()? {
                    counts.add(category, count);
                }
                Ok(counts)
            }
        }

        deserializer.deserialize_map(CountsVisitor)
    }
}

/// Everything collected during a session. Entries are never edited or removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregationState {
    pub entries: Vec<DiagnosticEntry>,
    pub category_counts: CategoryCounts,
}

impl AggregationState {
    /// Entries at WARNING, ERROR or SEVERE, in insertion order
    pub fn significant_entries(&self) -> impl Iterator<Item = &DiagnosticEntry> {
        self.entries.iter().filter(|e| e.level.is_significant())
    }

    pub fn significant_count(&self) -> usize {
        self.significant_entries().count()
    }

    /// Bordered block per significant entry followed by a per-category summary
    pub fn render_formatted(&self) -> String {
        if self.category_counts.is_empty() {
            return format!("{}", "No significant console logs found.".green());
        }

        let mut lines = Vec::new();
        let border = "=".repeat(BORDER_WIDTH);

        for entry in self.significant_entries() {
            let category = classify(&entry.message);
            let level = match entry.level {
                LogLevel::Severe | LogLevel::Error => entry.level.as_str().red(),
                _ => entry.level.as_str().yellow(),
            };

            lines.push(format!("\n{}", border.yellow()));
            lines.push(format!("{} {}", "LEVEL:".bold(), level));
            lines.push(format!("{} {}", "CATEGORY:".bold(), category.name().cyan()));
            lines.push(format!("{} {}", "SOURCE:".bold(), entry.source.blue()));
            lines.push(format!(
                "{} {}",
                "TIMESTAMP:".bold(),
                format_timestamp_millis(entry.timestamp_millis)
            ));
            lines.push(format!("{} {}", "MESSAGE:".bold(), entry.message));
            lines.push(format!("{}", border.yellow()));
        }

        lines.push(format!("\n{}", "Error Summary by Category:".bold()));
        for (category, count) in self.category_counts.iter() {
            lines.push(format!("{} {} error(s)", format!("{}:", category).cyan(), count));
        }

        lines.join("\n")
    }
}

/// Owns the aggregation state for one session
#[derive(Debug, Default)]
pub struct LogAggregator {
    state: AggregationState,
}

impl LogAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entry(&mut self, entry: DiagnosticEntry) {
        if entry.level.is_significant() {
            self.state.category_counts.increment(classify(&entry.message));
        }
        self.state.entries.push(entry);
    }

    pub fn extend<I: IntoIterator<Item = DiagnosticEntry>>(&mut self, entries: I) {
        for entry in entries {
            self.add_entry(entry);
        }
    }

    pub fn category_counts(&self) -> CategoryCounts {
        self.state.category_counts.clone()
    }

    pub fn entries(&self) -> &[DiagnosticEntry] {
        &self.state.entries
    }

    pub fn significant_count(&self) -> usize {
        self.state.significant_count()
    }

    /// Read-only view handed to the report
    pub fn finalize(self) -> AggregationState {
        self.state
    }
}
