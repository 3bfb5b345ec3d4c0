//! Route configuration loading and validation.
//!
//! The route config is read once at startup ([`sources::load_file`]);
//! there is no reload. Submodules provide the data model, `${VAR}`
//! interpolation, validation, and the file reader.

pub mod env;
pub mod model;
pub mod sources;
pub mod validation;

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigVersion {
    Hash(String),
}

impl ConfigVersion {
    /// First 8 hex characters, for display.
    #[must_use]
    pub fn short(&self) -> &str {
        match self {
            Self::Hash(h) => h.get(..8).unwrap_or(h),
        }
    }
}

/// Environment lookup used by the running process.
#[must_use]
pub fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}
