//! The name to dataset map of a session.
//!
//! Names are unique across both kinds of dataset and compared without regard
//! to ASCII case, since the store resolves table names that way.

use std::collections::BTreeMap;

use log::warn;
use serde::Serialize;
use strata_common::identifier::{sanitize_identifier, Identifier, MAX_IDENTIFIER_LENGTH};

use crate::error::{SessionError, SessionResult};

/// Leaves room for a derivation suffix and a counter in generated names.
const MAX_STEM_LENGTH: usize = MAX_IDENTIFIER_LENGTH - 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    Persistent,
    Transient,
}

#[derive(Debug, Clone)]
pub enum DatasetEntry<P> {
    /// A table in the store.
    Persistent { table: Identifier },
    /// A lazy plan that lives only as long as the session.
    Transient { plan: P },
}

impl<P> DatasetEntry<P> {
    pub fn kind(&self) -> DatasetKind {
        match self {
            DatasetEntry::Persistent { .. } => DatasetKind::Persistent,
            DatasetEntry::Transient { .. } => DatasetKind::Transient,
        }
    }
}

/// How a derived dataset was produced from its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Derivation {
    Sorted,
    Filtered,
    Grouped,
    Calculated,
    Copied,
}

impl Derivation {
    fn suffix(&self) -> &'static str {
        match self {
            Derivation::Sorted => "sorted",
            Derivation::Filtered => "filtered",
            Derivation::Grouped => "grouped",
            Derivation::Calculated => "calc",
            Derivation::Copied => "copy",
        }
    }
}

#[derive(Debug)]
pub struct DatasetRegistry<P> {
    entries: BTreeMap<String, DatasetEntry<P>>,
    counter: u64,
}

impl<P> Default for DatasetRegistry<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> DatasetRegistry<P> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            counter: 0,
        }
    }

    /// Looks up a dataset, returning its registered name and entry.
    pub fn get(&self, name: &str) -> Option<(&str, &DatasetEntry<P>)> {
        if let Some((key, entry)) = self.entries.get_key_value(name) {
            return Some((key.as_str(), entry));
        }
        self.entries
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(key, entry)| (key.as_str(), entry))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Persistent names followed by transient names, each in sorted order.
    pub fn names(&self) -> Vec<String> {
        let mut names = self.names_of(DatasetKind::Persistent);
        names.extend(self.names_of(DatasetKind::Transient));
        names
    }

    pub fn names_of(&self, kind: DatasetKind) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.kind() == kind)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn insert(&mut self, name: impl Into<String>, entry: DatasetEntry<P>) -> SessionResult<()> {
        let name = name.into();
        if self.contains(&name) {
            return Err(SessionError::already_exists(format!("dataset {name}")));
        }
        self.entries.insert(name, entry);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<DatasetEntry<P>> {
        let key = self.get(name).map(|(key, _)| key.to_string())?;
        self.entries.remove(&key)
    }

    /// Removes every entry. The name counter keeps counting.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Makes the persistent entries match the table names in the store catalog.
    /// Transient entries are kept.
    pub fn sync_tables(&mut self, tables: &[String]) {
        self.entries.retain(|name, entry| match entry {
            DatasetEntry::Persistent { .. } => tables.iter().any(|t| t == name),
            DatasetEntry::Transient { .. } => true,
        });
        for table in tables {
            if self.entries.contains_key(table) {
                continue;
            }
            if self.contains(table) {
                warn!("table {table} is shadowed by a dataset with the same name");
                continue;
            }
            match Identifier::try_new(table.as_str()) {
                Ok(identifier) => {
                    self.entries.insert(
                        table.clone(),
                        DatasetEntry::Persistent { table: identifier },
                    );
                }
                Err(e) => warn!("ignoring table {table}: {e}"),
            }
        }
    }

    /// Returns `<stem>_<n>` for the next counter value `n` that gives an unused name.
    pub fn unique_name(&mut self, stem: &str) -> String {
        let stem: String = sanitize_identifier(stem).chars().take(MAX_STEM_LENGTH).collect();
        loop {
            self.counter += 1;
            let name = format!("{stem}_{}", self.counter);
            if !self.contains(&name) {
                return name;
            }
        }
    }

    pub fn derived_name(&mut self, source: &str, derivation: Derivation) -> String {
        self.unique_name(&format!("{source}_{}", derivation.suffix()))
    }
}
