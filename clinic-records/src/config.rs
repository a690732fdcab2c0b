use clinic_core::ClinicConfigSnapshot;

use crate::CodeFormat;

/// Configuration for the record layer, resolved once at startup
#[derive(Debug, Clone)]
pub struct RecordsConfig {
    /// Constant prefix of every sequential code
    pub code_prefix: String,

    /// Zero-padding width of the numeric part
    pub code_width: usize,

    /// Bound on re-check-before-insert retries
    pub max_allocation_attempts: u32,

    /// Folder used when a clinic name sanitises to nothing
    pub default_folder: String,
}

impl Default for RecordsConfig {
    fn default() -> Self {
        Self {
            code_prefix: "HN".to_string(),
            code_width: 4,
            max_allocation_attempts: 5,
            default_folder: "unnamed_clinic".to_string(),
        }
    }
}

impl RecordsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve from `records.*` keys, falling back to defaults.
    pub fn from_snapshot(snapshot: &ClinicConfigSnapshot) -> Self {
        let defaults = Self::default();
        Self {
            code_prefix: snapshot
                .get_string("records.code_prefix")
                .unwrap_or(defaults.code_prefix),
            code_width: snapshot
                .get_usize("records.code_width")
                .filter(|w| *w > 0)
                .unwrap_or(defaults.code_width),
            max_allocation_attempts: snapshot
                .get_u32("records.max_allocation_attempts")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_allocation_attempts),
            default_folder: snapshot
                .get_string("records.default_folder")
                .filter(|f| !f.trim().is_empty())
                .unwrap_or(defaults.default_folder),
        }
    }

    pub fn with_code_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.code_prefix = prefix.into();
        self
    }

    pub fn with_code_width(mut self, width: usize) -> Self {
        self.code_width = width.max(1);
        self
    }

    pub fn with_max_allocation_attempts(mut self, attempts: u32) -> Self {
        self.max_allocation_attempts = attempts.max(1);
        self
    }

    pub fn code_format(&self) -> CodeFormat {
        CodeFormat::new(self.code_prefix.clone(), self.code_width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinic_core::ClinicConfig;

    #[test]
    fn snapshot_values_override_defaults() {
        let mut config = ClinicConfig::new();
        config.set("records.code_prefix", "PT");
        config.set("records.code_width", "6");
        config.set("records.default_folder", "  ");

        let records = RecordsConfig::from_snapshot(&config.snapshot());
        assert_eq!(records.code_prefix, "PT");
        assert_eq!(records.code_width, 6);
        assert_eq!(records.max_allocation_attempts, 5);
        assert_eq!(records.default_folder, "unnamed_clinic");
    }
}
