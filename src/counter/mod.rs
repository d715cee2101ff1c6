//! Hit counting core
//!
//! Validation, client address handling, the persisted document model and the
//! aggregation rules, plus [`CounterService`] which ties them to a store.

pub mod aggregator;
pub mod error;
pub mod ip;
pub mod models;
pub mod schema;
pub mod service;
pub mod validate;

pub use aggregator::{HitReceipt, ProjectOverview, StatsOptions, StatsSnapshot};
pub use error::CounterError;
pub use models::{DomainRecord, IpRecord, ProjectRecord, Store};
pub use service::CounterService;
