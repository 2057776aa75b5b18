//! Backend selectors.
//!
//! The active backend is named either directly (`openai`) or through a
//! family with a sub-kind (`local_ai#ollama`). A bare family name is not a
//! complete selector.

/// Family grouping the locally hosted servers.
pub const LOCAL_AI_FAMILY: &str = "local_ai";

/// Adapter kinds that belong to [`LOCAL_AI_FAMILY`].
pub const LOCAL_AI_KINDS: &[&str] = &["ollama", "lmstudio"];

/// A parsed selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// A configured backend name, optionally qualified by its family
    Backend {
        family: Option<String>,
        name: String,
    },
    /// A family without its sub-kind
    Family(String),
}

impl Selector {
    /// Parse `name`, `family#name`, or a bare family.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.split_once('#') {
            Some((family, name)) => Self::Backend {
                family: Some(family.trim().to_string()),
                name: name.trim().to_string(),
            },
            None if raw == LOCAL_AI_FAMILY => Self::Family(raw.to_string()),
            None => Self::Backend {
                family: None,
                name: raw.to_string(),
            },
        }
    }

    /// The configured backend name this selector points at.
    pub fn backend_name(&self) -> Option<&str> {
        match self {
            Self::Backend { name, .. } => Some(name),
            Self::Family(_) => None,
        }
    }
}

/// Canonical selector string for a backend of the given kind.
pub fn canonical(name: &str, kind: &str) -> String {
    if LOCAL_AI_KINDS.contains(&kind) {
        format!("{LOCAL_AI_FAMILY}#{name}")
    } else {
        name.to_string()
    }
}

/// Help text returned when only the family was given.
pub fn family_help(family: &str) -> String {
    format!(
        "{family} platform has {}. you can type `!ai switch {family}#{{type}}`. Example: {family}#{}",
        LOCAL_AI_KINDS.join(" and "),
        LOCAL_AI_KINDS[0]
    )
}
