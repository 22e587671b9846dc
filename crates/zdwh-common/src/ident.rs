//! Warehouse object names
//!
//! Table and procedure names come from configuration and end up spliced into
//! SQL text, so every part is checked against a strict identifier pattern once
//! at load time and always emitted double-quoted.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

use crate::error::{Result, ZdwhError};

static IDENTIFIER: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").ok());

/// An optionally schema-qualified identifier such as `dbo.StageZDBrands`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedName {
    pub schema: Option<String>,
    pub name: String,
}

impl QualifiedName {
    /// Parse `name` or `schema.name`.
    pub fn parse(raw: &str) -> Result<Self> {
        let pattern = IDENTIFIER
            .as_ref()
            .ok_or_else(|| ZdwhError::Config("identifier pattern failed to compile".to_string()))?;

        let parts: Vec<&str> = raw.split('.').collect();
        if parts.is_empty() || parts.len() > 2 || parts.iter().any(|p| !pattern.is_match(p)) {
            return Err(ZdwhError::InvalidIdentifier(raw.to_string()));
        }

        Ok(match parts.as_slice() {
            [schema, name] => Self {
                schema: Some((*schema).to_string()),
                name: (*name).to_string(),
            },
            [name] => Self {
                schema: None,
                name: (*name).to_string(),
            },
            _ => return Err(ZdwhError::InvalidIdentifier(raw.to_string())),
        })
    }

    /// Build `schema.name`, validating both parts.
    pub fn qualified(schema: &str, name: &str) -> Result<Self> {
        Self::parse(&format!("{}.{}", schema, name))
    }

    /// SQL rendering with each part double-quoted.
    pub fn quoted(&self) -> String {
        match &self.schema {
            Some(schema) => format!("\"{}\".\"{}\"", schema, self.name),
            None => format!("\"{}\"", self.name),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_qualified() {
        let name = QualifiedName::parse("dbo.StageZDBrands").unwrap();
        assert_eq!(name.schema.as_deref(), Some("dbo"));
        assert_eq!(name.name, "StageZDBrands");
        assert_eq!(name.quoted(), "\"dbo\".\"StageZDBrands\"");
        assert_eq!(name.to_string(), "dbo.StageZDBrands");
    }

    #[test]
    fn test_parse_bare() {
        let name = QualifiedName::parse("usp_LoadZDUsersTable").unwrap();
        assert_eq!(name.schema, None);
        assert_eq!(name.quoted(), "\"usp_LoadZDUsersTable\"");
    }

    #[test]
    fn test_rejects_injection() {
        assert!(QualifiedName::parse("dbo.Stage; DROP TABLE x").is_err());
        assert!(QualifiedName::parse("a.b.c").is_err());
        assert!(QualifiedName::parse("").is_err());
        assert!(QualifiedName::parse("1abc").is_err());
        assert!(QualifiedName::qualified("db\"o", "T").is_err());
    }

    #[test]
    fn test_shared_pattern_reused_across_parses() {
        assert!(IDENTIFIER.is_some());
        let first = IDENTIFIER.as_ref().unwrap() as *const Regex;
        for i in 0..50 {
            QualifiedName::qualified("dbo", &format!("StageZD{}", i)).unwrap();
        }
        assert_eq!(IDENTIFIER.as_ref().unwrap() as *const Regex, first);
    }
}
