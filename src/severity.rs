use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use crate::env::ConfigError;

/// Translation table from internal level names to the severity tokens a
/// log collector expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeverityMap {
    entries: BTreeMap<String, String>,
}

impl SeverityMap {
    /// Lower-case tokens recognized by the kubernetes fluentd pipeline.
    pub fn fluentd() -> Self {
        [
            ("panic", "fatal"),
            ("fatal", "fatal"),
            ("warning", "warn"),
            ("debug", "debug"),
            ("error", "error"),
            ("trace", "trace"),
            ("info", "info"),
        ]
        .into_iter()
        .collect()
    }

    /// Cloud logging `LogSeverity` names.
    pub fn stackdriver() -> Self {
        [
            ("panic", "CRITICAL"),
            ("fatal", "CRITICAL"),
            ("warning", "WARNING"),
            ("debug", "DEBUG"),
            ("error", "ERROR"),
            ("trace", "DEBUG"),
            ("info", "INFO"),
        ]
        .into_iter()
        .collect()
    }

    /// Upper-cased level names, as emitted by the first fluentd formatter.
    pub fn legacy_uppercase() -> Self {
        [
            ("panic", "PANIC"),
            ("fatal", "FATAL"),
            ("warning", "WARNING"),
            ("debug", "DEBUG"),
            ("error", "ERROR"),
            ("trace", "TRACE"),
            ("info", "INFO"),
        ]
        .into_iter()
        .collect()
    }

    pub fn insert(&mut self, level: impl Into<String>, severity: impl Into<String>) {
        self.entries.insert(level.into(), severity.into());
    }

    pub fn get(&self, level: &str) -> Option<&str> {
        self.entries.get(level).map(String::as_str)
    }

    /// Severity token for `level`.
    ///
    /// Levels missing from the table fall back to the `debug` entry. A
    /// table without a `debug` entry yields the level name itself.
    pub fn resolve<'a>(&'a self, level: &'a str) -> &'a str {
        self.get(level)
            .or_else(|| self.get("debug"))
            .unwrap_or(level)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for SeverityMap {
    fn default() -> Self {
        SeverityMap::fluentd()
    }
}

impl<K, V> FromIterator<(K, V)> for SeverityMap
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        SeverityMap {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Built-in severity tables, selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeverityTable {
    #[default]
    Fluentd,
    Stackdriver,
    Legacy,
}

impl SeverityTable {
    pub fn to_map(self) -> SeverityMap {
        match self {
            SeverityTable::Fluentd => SeverityMap::fluentd(),
            SeverityTable::Stackdriver => SeverityMap::stackdriver(),
            SeverityTable::Legacy => SeverityMap::legacy_uppercase(),
        }
    }
}

impl FromStr for SeverityTable {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fluentd" => Ok(SeverityTable::Fluentd),
            "stackdriver" | "gcp" => Ok(SeverityTable::Stackdriver),
            "legacy" => Ok(SeverityTable::Legacy),
            _ => Err(ConfigError::UnknownSeverityTable(s.to_string())),
        }
    }
}

/// Shared, switchable reference to the active [`SeverityMap`].
///
/// Readers take an immutable snapshot; [`SeverityHandle::switch`] swaps in
/// a whole new table. Clones observe the same table, so a formatter that
/// was moved into a global subscriber can still be switched from outside.
#[derive(Debug, Clone)]
pub struct SeverityHandle {
    active: Arc<RwLock<Arc<SeverityMap>>>,
}

impl SeverityHandle {
    pub fn new(map: SeverityMap) -> Self {
        SeverityHandle {
            active: Arc::new(RwLock::new(Arc::new(map))),
        }
    }

    /// Current table. Stays valid even if a switch happens afterwards.
    pub fn snapshot(&self) -> Arc<SeverityMap> {
        let guard = self.active.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Replace the active table wholesale.
    pub fn switch(&self, map: SeverityMap) {
        tracing::debug!(entries = map.len(), "switching severity table");
        let mut guard = self.active.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(map);
    }
}

impl Default for SeverityHandle {
    fn default() -> Self {
        SeverityHandle::new(SeverityMap::default())
    }
}
