//! Classification of load-path records that point at OS-provided libraries.

/// Decides whether a load-path record needs no resolution.
pub trait SystemLibraryFilter {
    /// True if `install_name` is an expected OS-provided dependency.
    fn is_known_system_path(&self, install_name: &str) -> bool;
}

/// Prefixes macOS serves from the dyld shared cache.
pub const DEFAULT_SYSTEM_PREFIXES: &[&str] = &["/usr/lib/", "/System/"];

/// Prefix-based system library filter.
#[derive(Debug, Clone)]
pub struct SystemPrefixes {
    prefixes: Vec<String>,
}

impl SystemPrefixes {
    /// Filter matching only the given prefixes.
    pub fn new(prefixes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    /// Add extra prefixes on top of the current set.
    pub fn extend(mut self, extra: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.prefixes.extend(extra.into_iter().map(Into::into));
        self
    }

    /// The configured prefixes.
    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }
}

impl Default for SystemPrefixes {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_PREFIXES.iter().copied())
    }
}

impl SystemLibraryFilter for SystemPrefixes {
    fn is_known_system_path(&self, install_name: &str) -> bool {
        self.prefixes
            .iter()
            .any(|prefix| install_name.starts_with(prefix.as_str()))
    }
}
