//! In-run negative cache of (source, domain) pairs that already failed.
//!
//! Several companies often share a domain (subsidiaries, duplicated rows), so a
//! lookup that failed once is not repeated for the rest of the run. The cache is
//! best-effort: two workers racing on the same domain may both hit the network,
//! which only costs a request.

use std::collections::HashSet;
use std::sync::RwLock;

use crate::domain_utils::Domain;

#[derive(Debug, Default)]
pub struct FailedDomainCache {
    entries: RwLock<HashSet<(String, String)>>,
}

impl FailedDomainCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, source: &str, domain: &Domain) -> bool {
        match self.entries.read() {
            Ok(entries) => entries.contains(&(source.to_string(), domain.as_str().to_string())),
            Err(_) => false,
        }
    }

    pub fn record(&self, source: &str, domain: &Domain) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert((source.to_string(), domain.as_str().to_string()));
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_utils::normalize_domain;

    #[test]
    fn test_record_is_per_source() {
        let cache = FailedDomainCache::new();
        let domain = normalize_domain("acme.com").unwrap();
        assert!(cache.is_empty());

        cache.record("clearbit", &domain);
        assert!(cache.contains("clearbit", &domain));
        assert!(!cache.contains("duckduckgo", &domain));
        assert_eq!(cache.len(), 1);

        cache.record("clearbit", &domain);
        assert_eq!(cache.len(), 1);
    }
}
