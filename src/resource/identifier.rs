//! Dotted table identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WaitError};

/// Marker separating a table name from a partition suffix (`table$20240101`).
pub const PARTITION_DECORATOR: char = '$';

/// A parsed `dataset.table` or `project.dataset.table` path.
///
/// Every component is non-empty. The project is optional; when it is absent
/// the lookup client resolves a default project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceIdentifier {
    project: Option<String>,
    dataset: String,
    table: String,
}

impl ResourceIdentifier {
    /// Parse a dotted resource specification.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError::InvalidInput`] unless the input has exactly two
    /// or three non-empty components.
    pub fn parse(spec: &str) -> Result<Self> {
        let parts: Vec<&str> = spec.split('.').collect();
        if parts.iter().any(|p| p.trim().is_empty()) {
            return Err(invalid(spec));
        }

        match parts.as_slice() {
            [dataset, table] => Ok(Self {
                project: None,
                dataset: dataset.to_string(),
                table: table.to_string(),
            }),
            [project, dataset, table] => Ok(Self {
                project: Some(project.to_string()),
                dataset: dataset.to_string(),
                table: table.to_string(),
            }),
            _ => Err(invalid(spec)),
        }
    }

    /// Explicit project, if the spec had three components.
    pub fn project(&self) -> Option<&str> {
        self.project.as_deref()
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    /// Table name, including any partition decorator.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Components in the order they were written.
    pub fn components(&self) -> Vec<&str> {
        let mut parts = Vec::with_capacity(3);
        if let Some(project) = &self.project {
            parts.push(project.as_str());
        }
        parts.push(self.dataset.as_str());
        parts.push(self.table.as_str());
        parts
    }

    /// Whether the table name addresses a single partition.
    pub fn is_partition_qualified(&self) -> bool {
        self.table.contains(PARTITION_DECORATOR)
    }
}

fn invalid(spec: &str) -> WaitError {
    WaitError::invalid_input(format!("Invalid table specification: {}", spec))
}

impl FromStr for ResourceIdentifier {
    type Err = WaitError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ResourceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.components().join("."))
    }
}
