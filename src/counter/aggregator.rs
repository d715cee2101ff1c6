//! Increment and query rules for the counter document
//!
//! These functions operate on an already-loaded [`Store`]. They never touch
//! storage themselves: increments run inside a write serializer job, queries
//! run against whatever document the caller loaded.
//!
//! A hit tagged with a project is counted twice in the hierarchy, once on the
//! project and once on its domain, so the domain total always covers every
//! hit the domain received.

use serde::Serialize;
use std::collections::BTreeMap;

use super::models::{Counted, IpRecord, Store};

/// Outcome of an accepted hit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HitReceipt {
    pub domain: String,
    pub project: Option<String>,
    pub ts: i64,
}

/// Which optional sections a stats query wants
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsOptions {
    pub include_ips: bool,
    pub include_projects: bool,
}

/// Read-only counters returned by a stats query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub domain: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    pub total: u64,
    pub last: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ips: Option<BTreeMap<String, IpRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projects: Option<BTreeMap<String, ProjectOverview>>,
}

/// Lightweight per-project entry of a domain overview; never carries `ips`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProjectOverview {
    pub total: u64,
    pub last: i64,
}

/// Apply one hit to the document
///
/// `domain` and `project` must already be normalized and allowed. An empty
/// `address` counts the hit without visitor bookkeeping.
pub fn record_hit(
    store: &mut Store,
    domain: &str,
    project: Option<&str>,
    address: &str,
    now: i64,
) -> HitReceipt {
    let record = store.domain_mut(domain);
    bump(record, address, now);

    if let Some(project) = project {
        bump(record.project_mut(project), address, now);
    }

    HitReceipt {
        domain: domain.to_string(),
        project: project.map(str::to_string),
        ts: now,
    }
}

fn bump<C: Counted>(record: &mut C, address: &str, now: i64) {
    let (total, last, ips) = record.counters_mut();
    *total = total.saturating_add(1);
    *last = (*last).max(now);

    if address.is_empty() {
        return;
    }

    let visitor = ips.entry(address.to_string()).or_insert_with(|| IpRecord {
        count: 0,
        first: now,
        last: now,
    });
    visitor.count = visitor.count.saturating_add(1);
    visitor.last = visitor.last.max(now);
}

/// Build the stats snapshot for a domain or one of its projects
///
/// Unknown domains and projects are not errors; they report zero counters.
/// With a project, `include_projects` is ignored. The project overview never
/// includes per-project `ips`, whatever `include_ips` says; those are only
/// available by querying the project itself.
pub fn snapshot(
    store: &Store,
    domain: &str,
    project: Option<&str>,
    options: StatsOptions,
) -> StatsSnapshot {
    let record = store.domain(domain);

    if let Some(project) = project {
        let counted = record.and_then(|r| r.project(project));
        return StatsSnapshot {
            domain: domain.to_string(),
            project: Some(project.to_string()),
            total: counted.map(Counted::total).unwrap_or(0),
            last: counted.map(Counted::last).unwrap_or(0),
            ips: options
                .include_ips
                .then(|| counted.map(|c| c.ips().clone()).unwrap_or_default()),
            projects: None,
        };
    }

    StatsSnapshot {
        domain: domain.to_string(),
        project: None,
        total: record.map(Counted::total).unwrap_or(0),
        last: record.map(Counted::last).unwrap_or(0),
        ips: options
            .include_ips
            .then(|| record.map(|r| r.ips.clone()).unwrap_or_default()),
        projects: options.include_projects.then(|| {
            record
                .map(|r| {
                    r.projects
                        .iter()
                        .map(|(key, p)| {
                            (
                                key.clone(),
                                ProjectOverview {
                                    total: p.total,
                                    last: p.last,
                                },
                            )
                        })
                        .collect()
                })
                .unwrap_or_default()
        }),
    }
}
