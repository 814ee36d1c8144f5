//! Backend server models.

use std::fmt;

/// Represents a single upstream backend server.
///
/// Backends are immutable values; a new backend set always produces a new
/// table rather than mutating an existing one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Backend {
    /// The unique identifier of the backend (usually its address)
    pub id: String,
    /// Label grouping backends that are expected to fail together
    pub failure_domain: String,
}

impl Backend {
    /// Create a backend whose failure domain is undetermined.
    ///
    /// The identifier doubles as the failure domain, so the backend is
    /// isolated from every other backend.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            failure_domain: id.clone(),
            id,
        }
    }

    /// Create a backend that belongs to an explicit failure domain.
    pub fn with_failure_domain(id: impl Into<String>, failure_domain: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            failure_domain: failure_domain.into(),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Joins backend identifiers with commas, the form used in logs and headers.
pub fn join_ids<'a, I>(backends: I) -> String
where
    I: IntoIterator<Item = &'a Backend>,
{
    backends
        .into_iter()
        .map(|b| b.id.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undetermined_domain_equals_id() {
        let backend = Backend::new("10.0.0.1");
        assert_eq!(backend.failure_domain, "10.0.0.1");
    }

    #[test]
    fn test_join_ids() {
        let backends = vec![
            Backend::new("a"),
            Backend::with_failure_domain("b", "rack-1"),
        ];
        assert_eq!(join_ids(&backends), "a,b");
        assert_eq!(join_ids(&[] as &[Backend]), "");
    }
}
