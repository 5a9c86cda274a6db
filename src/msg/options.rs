use crate::ole::codepage::DEFAULT_CODEPAGE;
use serde::{Deserialize, Serialize};

/// Settings applied while resolving an entity's properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityOptions {
    /// Code page for narrow strings when the entity declares none
    pub default_codepage: u32,
    /// Log a warning when a percentage lies outside `0.0..=1.0`. The value is
    /// returned unchanged either way.
    pub warn_out_of_range_percent: bool,
}

impl Default for EntityOptions {
    fn default() -> Self {
        Self {
            default_codepage: DEFAULT_CODEPAGE,
            warn_out_of_range_percent: true,
        }
    }
}

impl EntityOptions {
    pub fn with_default_codepage(mut self, codepage: u32) -> Self {
        self.default_codepage = codepage;
        self
    }

    pub fn with_percent_warnings(mut self, enabled: bool) -> Self {
        self.warn_out_of_range_percent = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = EntityOptions::default();
        assert_eq!(options.default_codepage, 1252);
        assert!(options.warn_out_of_range_percent);
    }

    #[test]
    fn test_builder_methods() {
        let options = EntityOptions::default().with_default_codepage(1251).with_percent_warnings(false);
        assert_eq!(options.default_codepage, 1251);
        assert!(!options.warn_out_of_range_percent);
    }
}
