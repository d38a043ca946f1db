//! Concurrent weighted routing table.
//!
//! Maps fully-qualified domains to weighted candidate sets:
//! - `domain. -> { candidate -> weight }` is the authoritative entry
//! - `domain. -> WeightedSampler` is derived from the entry and rebuilt on
//!   every mutation, under the same write lock
//!
//! A candidate is either a literal address or another domain name; the
//! table does not care which.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

use crate::error::DnsError;
use crate::metrics;
use crate::sampler::WeightedSampler;

/// Candidate set for one domain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingEntry {
    /// candidate -> weight. Ordered, so sampler indices are deterministic.
    pub resolvers: BTreeMap<String, u32>,
}

impl RoutingEntry {
    fn sampler(&self) -> Result<WeightedSampler, DnsError> {
        WeightedSampler::build(self.resolvers.iter().map(|(c, w)| (c.as_str(), *w)))
    }
}

/// Deep copy of the whole table, keyed by normalized domain.
pub type Snapshot = BTreeMap<String, RoutingEntry>;

/// Thread-safe routing table.
///
/// Cloning is cheap and yields a handle to the same table.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    inner: Arc<RwLock<RoutingTableInner>>,
}

#[derive(Debug, Default)]
struct RoutingTableInner {
    /// domain -> RoutingEntry
    entries: HashMap<String, RoutingEntry>,

    /// domain -> sampler built from the entry's current weights.
    /// Always has exactly the key set of `entries`.
    samplers: HashMap<String, WeightedSampler>,
}

/// Normalize a domain to its table key: lowercase, trailing dot.
pub fn normalize_domain(domain: &str) -> String {
    let mut domain = domain.to_ascii_lowercase();
    if !domain.ends_with('.') {
        domain.push('.');
    }
    domain
}

impl RoutingTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick one candidate for `domain` according to the configured weights.
    /// Returns `None` if the domain is not in the table.
    pub fn lookup(&self, domain: &str) -> Option<String> {
        let domain = normalize_domain(domain);
        let inner = self.inner.read();
        inner
            .samplers
            .get(&domain)
            .map(|sampler| sampler.sample().to_string())
    }

    #[cfg(test)]
    fn has_domain(&self, domain: &str) -> bool {
        self.inner
            .read()
            .entries
            .contains_key(&normalize_domain(domain))
    }

    /// Deep copy of every entry.
    pub fn snapshot(&self) -> Snapshot {
        let inner = self.inner.read();
        inner
            .entries
            .iter()
            .map(|(domain, entry)| (domain.clone(), entry.clone()))
            .collect()
    }

    /// Point `domain` at `candidate` with the given weight, creating the
    /// entry if needed. An empty domain is ignored; a zero weight is rejected.
    pub fn set(&self, domain: &str, candidate: &str, weight: u32) -> Result<(), DnsError> {
        if domain.is_empty() {
            return Ok(());
        }
        if weight == 0 {
            return Err(DnsError::InvalidWeight);
        }
        let domain = normalize_domain(domain);

        let mut inner = self.inner.write();
        let mut entry = inner.entries.get(&domain).cloned().unwrap_or_default();
        entry.resolvers.insert(candidate.to_string(), weight);
        let sampler = entry.sampler()?;

        debug!(%domain, candidate, weight, candidates = entry.resolvers.len(), "set candidate");
        inner.samplers.insert(domain.clone(), sampler);
        inner.entries.insert(domain, entry);
        Ok(())
    }

    /// Remove `candidate` from `domain`. Deletes the entry when its last
    /// candidate goes. No-op if either is absent.
    pub fn unset(&self, domain: &str, candidate: &str) {
        let domain = normalize_domain(domain);

        let mut inner = self.inner.write();
        let Some(entry) = inner.entries.get_mut(&domain) else {
            return;
        };
        if entry.resolvers.remove(candidate).is_none() {
            return;
        }

        // Weights are all positive, so only an emptied entry has no sampler.
        match entry.sampler() {
            Ok(sampler) => {
                debug!(%domain, candidate, candidates = entry.resolvers.len(), "unset candidate");
                inner.samplers.insert(domain, sampler);
            }
            Err(_) => {
                inner.entries.remove(&domain);
                inner.samplers.remove(&domain);
                debug!(%domain, candidate, "removed last candidate, dropped domain");
            }
        }
    }

    /// Atomically replace the whole table.
    ///
    /// Every entry is validated and its sampler built before the swap; on
    /// error the current table is left untouched.
    pub fn replace_all(&self, snapshot: Snapshot) -> Result<(), DnsError> {
        let mut replacement = RoutingTableInner::default();

        for (domain, entry) in snapshot {
            if domain.is_empty() {
                continue;
            }
            if entry.resolvers.values().any(|&w| w == 0) {
                return Err(DnsError::InvalidWeight);
            }
            let domain = normalize_domain(&domain);
            let sampler = entry.sampler()?;
            replacement.samplers.insert(domain.clone(), sampler);
            replacement.entries.insert(domain, entry);
        }

        let domains = replacement.entries.len();
        *self.inner.write() = replacement;
        debug!(domains, "replaced routing table");
        Ok(())
    }

    /// Number of domains in the table.
    pub fn domains_count(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// Number of (domain, candidate) pairs in the table.
    pub fn candidates_count(&self) -> usize {
        self.inner
            .read()
            .entries
            .values()
            .map(|e| e.resolvers.len())
            .sum()
    }

    /// Emit current table metrics.
    pub fn emit_metrics(&self) {
        let inner = self.inner.read();
        let candidates = inner.entries.values().map(|e| e.resolvers.len()).sum();
        metrics::record_table_counts(inner.entries.len(), candidates);
    }
}
