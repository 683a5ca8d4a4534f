use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::error::{Error, Result};

/// A known insured entity with a stable internal identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub id: String,
    #[serde(alias = "canonicalName", alias = "name")]
    pub canonical_name: String,
}

impl RegistryEntry {
    #[must_use]
    pub fn new(id: impl Into<String>, canonical_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            canonical_name: canonical_name.into(),
        }
    }
}

/// Parse a registry from a JSON array of entries, preserving order.
pub fn parse_registry(json: &str) -> Result<Vec<RegistryEntry>> {
    let entries: Vec<RegistryEntry> = serde_json::from_str(json)?;
    validate_registry(&entries)?;
    Ok(entries)
}

pub async fn load_registry(path: &Path) -> Result<Vec<RegistryEntry>> {
    let json = tokio::fs::read_to_string(path).await?;
    let entries = parse_registry(&json)?;

    tracing::debug!(
        path = %path.display(),
        entries = entries.len(),
        "Loaded insured registry"
    );

    Ok(entries)
}

pub fn validate_registry(entries: &[RegistryEntry]) -> Result<()> {
    let mut seen = HashSet::with_capacity(entries.len());

    for entry in entries {
        if entry.id.trim().is_empty() {
            return Err(Error::InvalidRegistryEntry(format!(
                "empty id for '{}'",
                entry.canonical_name
            )));
        }
        if !seen.insert(entry.id.as_str()) {
            return Err(Error::DuplicateRegistryId(entry.id.clone()));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_registry_keeps_order() {
        let json = r#"[
            {"id": "A1B2", "canonical_name": "Riley HealthCare LLC"},
            {"id": "C3D4", "canonicalName": "Evergreen Farms Ltd"},
            {"id": "E5F6", "name": "Northwind Logistics Inc"}
        ]"#;

        let entries = parse_registry(json).unwrap();

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].id, "A1B2");
        assert_eq!(entries[1].canonical_name, "Evergreen Farms Ltd");
        assert_eq!(entries[2].canonical_name, "Northwind Logistics Inc");
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let entries = vec![
            RegistryEntry::new("A1", "Acme"),
            RegistryEntry::new("A1", "Acme Two"),
        ];

        assert!(matches!(
            validate_registry(&entries),
            Err(Error::DuplicateRegistryId(id)) if id == "A1"
        ));
    }

    #[test]
    fn test_empty_id_rejected() {
        let entries = vec![RegistryEntry::new("  ", "Acme")];

        assert!(matches!(
            validate_registry(&entries),
            Err(Error::InvalidRegistryEntry(_))
        ));
    }

    #[tokio::test]
    async fn test_load_registry_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        std::fs::write(&path, r#"[{"id": "A1B2", "canonical_name": "Riley HealthCare LLC"}]"#)
            .unwrap();

        let entries = load_registry(&path).await.unwrap();

        assert_eq!(entries, vec![RegistryEntry::new("A1B2", "Riley HealthCare LLC")]);
    }
}
