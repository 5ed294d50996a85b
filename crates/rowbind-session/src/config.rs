//! Engine configuration.

use rowbind_query::{Dialect, UnknownFieldPolicy};

/// Environment variable selecting the unknown-predicate-field policy.
pub const ENV_UNKNOWN_FIELDS: &str = "ROWBIND_UNKNOWN_FIELDS";
/// Environment variable setting the N+1 warning threshold.
pub const ENV_N1_THRESHOLD: &str = "ROWBIND_N1_THRESHOLD";

/// Configuration shared by every model of a [`Database`](crate::Database).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Placeholder syntax for generated statements.
    pub dialect: Dialect,
    /// What the where-clause builder does with undeclared fields.
    pub unknown_fields: UnknownFieldPolicy,
    /// Single-row lookups per model before an N+1 warning.
    pub n1_threshold: usize,
    /// Default attempt bound for `modify_retrying`.
    pub retry_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::Postgres,
            unknown_fields: UnknownFieldPolicy::Skip,
            n1_threshold: 3,
            retry_attempts: 5,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `ROWBIND_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for the `ROWBIND_*` keys.
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(raw) = lookup(ENV_UNKNOWN_FIELDS) {
            match UnknownFieldPolicy::parse(&raw) {
                Some(policy) => config.unknown_fields = policy,
                None => tracing::warn!(key = ENV_UNKNOWN_FIELDS, value = %raw, "ignoring invalid setting"),
            }
        }
        if let Some(raw) = lookup(ENV_N1_THRESHOLD) {
            match raw.trim().parse() {
                Ok(threshold) => config.n1_threshold = threshold,
                Err(_) => tracing::warn!(key = ENV_N1_THRESHOLD, value = %raw, "ignoring invalid setting"),
            }
        }
        config
    }

    /// Set the dialect.
    #[must_use]
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Set the unknown-field policy.
    #[must_use]
    pub fn unknown_fields(mut self, policy: UnknownFieldPolicy) -> Self {
        self.unknown_fields = policy;
        self
    }

    /// Set the N+1 threshold.
    #[must_use]
    pub fn n1_threshold(mut self, threshold: usize) -> Self {
        self.n1_threshold = threshold;
        self
    }

    /// Set the default retry bound.
    #[must_use]
    pub fn retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }
}
