use serde::{Deserialize, Serialize};
use std::fmt;

/// Collection an operation targets (`report`, `witness`, `suspect`, `hearing`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKind(String);

impl EntityKind {
    pub const REPORT: &'static str = "report";
    pub const WITNESS: &'static str = "witness";
    pub const SUSPECT: &'static str = "suspect";
    pub const HEARING: &'static str = "hearing";

    pub fn new(value: String) -> Result<Self, String> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::validate(&normalized)?;
        Ok(Self(normalized))
    }

    pub fn report() -> Self {
        Self(Self::REPORT.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(value: &str) -> Result<(), String> {
        if value.is_empty() {
            return Err("Entity kind cannot be empty".to_string());
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(format!("Entity kind contains invalid characters: {value}"));
        }
        Ok(())
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<EntityKind> for String {
    fn from(value: EntityKind) -> Self {
        value.0
    }
}
