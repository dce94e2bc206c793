//! Configuration for the contextual ego network.

use serde::{Deserialize, Serialize};

use crate::error::{CenError, CenResult};

/// Behavioral configuration of a [`ContextualEgoNetwork`](crate::ContextualEgoNetwork).
///
/// The configuration is supplied at construction; there is no process-global
/// state. The `development` flag is the escalation policy switch: when on,
/// argument and invariant violations are returned to the caller as errors;
/// when off they are logged as warnings and the operation yields its neutral
/// default (the production behavior).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Escalate argument/invariant violations as errors instead of logging.
    #[serde(default)]
    pub development: bool,

    /// File name of the write-ahead recovery journal, relative to the
    /// storage root.
    #[serde(default = "default_journal_file")]
    pub journal_file: String,
}

fn default_journal_file() -> String {
    "recovery.log".to_string()
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            development: false,
            journal_file: default_journal_file(),
        }
    }
}

impl NetworkConfig {
    /// A configuration with `development` escalation enabled.
    pub fn development() -> Self {
        Self {
            development: true,
            ..Self::default()
        }
    }

    /// Checks the configuration for internally inconsistent values.
    pub fn validate(&self) -> CenResult<()> {
        if self.journal_file.is_empty() {
            return Err(CenError::InvalidArgument(
                "journal_file cannot be empty".to_string(),
            ));
        }
        if self.journal_file.contains(std::path::is_separator) {
            return Err(CenError::InvalidArgument(
                "journal_file must be a plain file name".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_production_mode() {
        let config = NetworkConfig::default();
        assert!(!config.development);
        assert_eq!(config.journal_file, "recovery.log");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn journal_file_must_be_plain() {
        let config = NetworkConfig {
            journal_file: "logs/recovery.log".to_string(),
            ..NetworkConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
