use std::sync::Arc;
use tracing::debug;

use crate::config::{CounterPolicy, PolicySource};
use crate::storage::{CounterStore, WriteSerializer};

use super::aggregator::{record_hit, snapshot, HitReceipt, StatsOptions, StatsSnapshot};
use super::error::CounterError;
use super::ip::anonymize;
use super::validate::{is_allowed_domain, normalize_domain, normalize_project, ProjectParam};

/// Hit and stats operations over a counter store
///
/// Hits are funnelled through the [`WriteSerializer`]; stats read the store
/// directly and may observe the state just before or just after an in-flight
/// hit, never anything in between.
pub struct CounterService {
    store: Arc<dyn CounterStore>,
    writer: WriteSerializer,
    policy: PolicySource,
}

impl CounterService {
    pub fn new(store: Arc<dyn CounterStore>, policy: PolicySource, queue_capacity: usize) -> Self {
        let writer = WriteSerializer::new(Arc::clone(&store), queue_capacity);
        Self {
            store,
            writer,
            policy,
        }
    }

    /// Record one hit at the current wall-clock time
    pub async fn hit(
        &self,
        domain: &str,
        project: Option<&str>,
        client_address: &str,
    ) -> Result<HitReceipt, CounterError> {
        let now = chrono::Utc::now().timestamp_millis();
        self.hit_at(domain, project, client_address, now).await
    }

    /// Record one hit with an explicit timestamp (Unix epoch milliseconds)
    pub async fn hit_at(
        &self,
        domain: &str,
        project: Option<&str>,
        client_address: &str,
        now: i64,
    ) -> Result<HitReceipt, CounterError> {
        let policy = self.policy.current().await;
        let (domain, project) = resolve_target(&policy, domain, project)?;

        // Resolved once so domain and project bookkeeping agree.
        let address = if policy.anonymize_ip {
            anonymize(client_address)
        } else {
            client_address.to_string()
        };

        let receipt = self
            .writer
            .enqueue(move |store| record_hit(store, &domain, project.as_deref(), &address, now))
            .await?;

        debug!(
            domain = %receipt.domain,
            project = receipt.project.as_deref().unwrap_or("-"),
            "hit recorded"
        );

        Ok(receipt)
    }

    /// Snapshot of a domain's (or one project's) counters
    pub async fn stats(
        &self,
        domain: &str,
        project: Option<&str>,
        options: StatsOptions,
    ) -> Result<StatsSnapshot, CounterError> {
        let policy = self.policy.current().await;
        let (domain, project) = resolve_target(&policy, domain, project)?;

        let store = self.store.load().await?;
        Ok(snapshot(&store, &domain, project.as_deref(), options))
    }

    /// Let queued hits finish, then stop accepting new ones
    pub async fn shutdown(&self) {
        self.writer.shutdown().await;
    }
}

/// Validation shared by hit and stats, in reporting order:
/// malformed domain, then allow-list, then malformed project
fn resolve_target(
    policy: &CounterPolicy,
    domain: &str,
    project: Option<&str>,
) -> Result<(String, Option<String>), CounterError> {
    let domain = normalize_domain(domain).ok_or(CounterError::InvalidDomain)?;

    if !is_allowed_domain(&domain, policy) {
        return Err(CounterError::DomainNotAllowed);
    }

    let project = match normalize_project(project) {
        ProjectParam::Absent => None,
        ProjectParam::Valid(p) => Some(p),
        ProjectParam::Invalid => return Err(CounterError::InvalidProject),
    };

    Ok((domain, project))
}
