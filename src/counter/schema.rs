//! Migration and repair of persisted counter documents
//!
//! Every load goes through [`repair`]. It accepts any JSON value and always
//! produces a well-typed [`Store`]: old layouts are lifted, missing or
//! malformed fields become zero / empty. Nothing is ever rejected.
//!
//! Known layouts:
//! - v1: flat `{ "<domain>": { "total": n, "last": ts } }`, no envelope
//! - v2: `{ "schemaVersion": 2, "domains": { ... } }` with nested `ips` and
//!   `projects`

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::models::{DomainRecord, IpRecord, ProjectRecord, Store, CURRENT_SCHEMA_VERSION};

/// What the repair pass had to change
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    /// Version found in the document (1 for the envelope-less layout)
    pub source_version: u32,
    /// Number of fields that were missing or malformed
    pub fixed_fields: usize,
}

impl RepairReport {
    pub fn is_clean(&self) -> bool {
        self.fixed_fields == 0 && self.source_version == CURRENT_SCHEMA_VERSION
    }
}

/// Turn an arbitrary JSON document into a repaired [`Store`]
pub fn repair(document: Value) -> (Store, RepairReport) {
    let mut report = RepairReport {
        source_version: CURRENT_SCHEMA_VERSION,
        fixed_fields: 0,
    };

    let Value::Object(root) = document else {
        report.fixed_fields += 1;
        return (Store::default(), report);
    };

    let is_envelope = root.contains_key("domains") || root.contains_key("schemaVersion");

    let (version, domains) = if is_envelope {
        let version = root
            .get("schemaVersion")
            .and_then(Value::as_u64)
            .map(|v| u32::try_from(v).unwrap_or(u32::MAX))
            .unwrap_or(1);
        let domains = match root.get("domains") {
            Some(Value::Object(map)) => map.clone(),
            _ => {
                report.fixed_fields += 1;
                Map::new()
            }
        };
        (version, domains)
    } else {
        (1, root)
    };

    report.source_version = version;

    let domains = domains
        .into_iter()
        .map(|(name, value)| (name, repair_domain(&value, &mut report)))
        .collect();

    let store = Store {
        schema_version: version.max(CURRENT_SCHEMA_VERSION),
        domains,
    };

    (store, report)
}

fn repair_domain(value: &Value, report: &mut RepairReport) -> DomainRecord {
    let Some(obj) = as_record(value, report) else {
        return DomainRecord::default();
    };

    DomainRecord {
        total: count_field(obj, "total", report),
        last: timestamp_field(obj, "last", report),
        ips: ips_field(obj, report),
        projects: map_field(obj, "projects", report)
            .into_iter()
            .map(|(key, value)| (key.clone(), repair_project(value, report)))
            .collect(),
    }
}

fn repair_project(value: &Value, report: &mut RepairReport) -> ProjectRecord {
    let Some(obj) = as_record(value, report) else {
        return ProjectRecord::default();
    };

    ProjectRecord {
        total: count_field(obj, "total", report),
        last: timestamp_field(obj, "last", report),
        ips: ips_field(obj, report),
    }
}

fn repair_ip(value: &Value, report: &mut RepairReport) -> IpRecord {
    let Some(obj) = as_record(value, report) else {
        return IpRecord::default();
    };

    IpRecord {
        count: count_field(obj, "count", report),
        first: timestamp_field(obj, "first", report),
        last: timestamp_field(obj, "last", report),
    }
}

fn as_record<'a>(value: &'a Value, report: &mut RepairReport) -> Option<&'a Map<String, Value>> {
    let obj = value.as_object();
    if obj.is_none() {
        report.fixed_fields += 1;
    }
    obj
}

fn ips_field(obj: &Map<String, Value>, report: &mut RepairReport) -> BTreeMap<String, IpRecord> {
    map_field(obj, "ips", report)
        .into_iter()
        .map(|(addr, value)| (addr.clone(), repair_ip(value, report)))
        .collect()
}

fn map_field<'a>(
    obj: &'a Map<String, Value>,
    key: &str,
    report: &mut RepairReport,
) -> Vec<(&'a String, &'a Value)> {
    match obj.get(key) {
        Some(Value::Object(map)) => map.iter().collect(),
        _ => {
            report.fixed_fields += 1;
            Vec::new()
        }
    }
}

fn count_field(obj: &Map<String, Value>, key: &str, report: &mut RepairReport) -> u64 {
    let value = obj.get(key).and_then(coerce_number);
    match value {
        Some(n) => u64::try_from(n).unwrap_or_else(|_| {
            report.fixed_fields += 1;
            0
        }),
        None => {
            report.fixed_fields += 1;
            0
        }
    }
}

fn timestamp_field(obj: &Map<String, Value>, key: &str, report: &mut RepairReport) -> i64 {
    match obj.get(key).and_then(coerce_number) {
        Some(n) if n >= 0 => n,
        _ => {
            report.fixed_fields += 1;
            0
        }
    }
}

/// Integers pass through; finite floats are truncated
fn coerce_number(value: &Value) -> Option<i64> {
    if let Some(n) = value.as_i64() {
        return Some(n);
    }
    if let Some(n) = value.as_u64() {
        return Some(i64::try_from(n).unwrap_or(i64::MAX));
    }
    value
        .as_f64()
        .filter(|f| f.is_finite())
        .map(|f| f.trunc() as i64)
}
