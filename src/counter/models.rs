//! Persisted counter document

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Schema version written by this build
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// Root persisted document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Store {
    pub schema_version: u32,
    #[serde(default)]
    pub domains: BTreeMap<String, DomainRecord>,
}

impl Default for Store {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            domains: BTreeMap::new(),
        }
    }
}

impl Store {
    pub fn domain(&self, domain: &str) -> Option<&DomainRecord> {
        self.domains.get(domain)
    }

    /// Get-or-create the record for a domain
    pub fn domain_mut(&mut self, domain: &str) -> &mut DomainRecord {
        self.domains.entry(domain.to_string()).or_default()
    }
}

/// Per-domain counters
///
/// `total` counts every hit to the domain, including the ones tagged with a
/// project, so it is never below any single project's total.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomainRecord {
    pub total: u64,
    pub last: i64,
    #[serde(default)]
    pub ips: BTreeMap<String, IpRecord>,
    #[serde(default)]
    pub projects: BTreeMap<String, ProjectRecord>,
}

impl DomainRecord {
    pub fn project(&self, project: &str) -> Option<&ProjectRecord> {
        self.projects.get(project)
    }

    /// Get-or-create the nested record for a project
    pub fn project_mut(&mut self, project: &str) -> &mut ProjectRecord {
        self.projects.entry(project.to_string()).or_default()
    }
}

/// Per-project counters, nested under a domain
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub total: u64,
    pub last: i64,
    #[serde(default)]
    pub ips: BTreeMap<String, IpRecord>,
}

/// Hits observed from one client address
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IpRecord {
    pub count: u64,
    pub first: i64,
    pub last: i64,
}

/// Shared counter surface of domain and project records
///
/// The aggregator applies the exact same increment to both levels through
/// this trait.
pub trait Counted {
    fn total(&self) -> u64;
    fn last(&self) -> i64;
    fn ips(&self) -> &BTreeMap<String, IpRecord>;
    fn counters_mut(&mut self) -> (&mut u64, &mut i64, &mut BTreeMap<String, IpRecord>);
}

impl Counted for DomainRecord {
    fn total(&self) -> u64 {
        self.total
    }

    fn last(&self) -> i64 {
        self.last
    }

    fn ips(&self) -> &BTreeMap<String, IpRecord> {
        &self.ips
    }

    fn counters_mut(&mut self) -> (&mut u64, &mut i64, &mut BTreeMap<String, IpRecord>) {
        (&mut self.total, &mut self.last, &mut self.ips)
    }
}

impl Counted for ProjectRecord {
    fn total(&self) -> u64 {
        self.total
    }

    fn last(&self) -> i64 {
        self.last
    }

    fn ips(&self) -> &BTreeMap<String, IpRecord> {
        &self.ips
    }

    fn counters_mut(&mut self) -> (&mut u64, &mut i64, &mut BTreeMap<String, IpRecord>) {
        (&mut self.total, &mut self.last, &mut self.ips)
    }
}
