//! Serialized load-mutate-save cycles
//!
//! One actor task owns the write path. Mutations arrive over a bounded mpsc
//! channel and run strictly one at a time, in submission order, each against
//! the document persisted by the previous one. Reads do not go through here.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use crate::counter::models::Store;
use crate::storage::{CounterStore, StorageError, StorageResult};

type Mutation = Box<dyn FnOnce(&mut Store) + Send>;

/// Message types for the WriterActor
enum ActorMessage {
    /// Run one load-mutate-save cycle
    Apply {
        mutation: Mutation,
        done: oneshot::Sender<StorageResult<()>>,
    },
    /// Stop after everything queued ahead of this message
    Shutdown { done: oneshot::Sender<()> },
}

struct WriterActor {
    receiver: mpsc::Receiver<ActorMessage>,
    store: Arc<dyn CounterStore>,
}

impl WriterActor {
    async fn run(mut self) {
        while let Some(msg) = self.receiver.recv().await {
            match msg {
                ActorMessage::Apply { mutation, done } => {
                    let result = self.apply(mutation).await;
                    if let Err(e) = &result {
                        error!(store = %self.store.describe(), error = %e, "counter write failed, change dropped");
                    }
                    // The caller may have gone away; the write stands either way.
                    let _ = done.send(result);
                }
                ActorMessage::Shutdown { done } => {
                    info!("Write serializer received shutdown signal");
                    let _ = done.send(());
                    break;
                }
            }
        }
        debug!("Write serializer stopped");
    }

    async fn apply(&self, mutation: Mutation) -> StorageResult<()> {
        let mut store = self.store.load().await?;

        let mutated = std::panic::catch_unwind(AssertUnwindSafe(move || {
            mutation(&mut store);
            store
        }))
        .map_err(|_| StorageError::MutationPanicked)?;

        self.store.save(&mutated).await
    }
}

/// Handle to the write actor; cheap to clone
#[derive(Clone)]
pub struct WriteSerializer {
    actor_tx: mpsc::Sender<ActorMessage>,
}

impl WriteSerializer {
    /// Spawn the actor on the current tokio runtime
    pub fn new(store: Arc<dyn CounterStore>, queue_capacity: usize) -> Self {
        let (actor_tx, receiver) = mpsc::channel(queue_capacity.max(1));

        let actor = WriterActor { receiver, store };
        tokio::spawn(async move {
            actor.run().await;
        });

        Self { actor_tx }
    }

    /// Run `mutation` with exclusive access to the persisted document
    ///
    /// Resolves once the mutated document is durably saved. On any failure
    /// the mutation's changes are discarded and the next queued job starts
    /// from the last saved document.
    pub async fn enqueue<F, T>(&self, apply: F) -> StorageResult<T>
    where
        F: FnOnce(&mut Store) -> T + Send + 'static,
        T: Send + 'static,
    {
        let (value_tx, value_rx) = oneshot::channel();
        let mutation: Mutation = Box::new(move |store| {
            let _ = value_tx.send(apply(store));
        });

        let (done, done_rx) = oneshot::channel();
        self.actor_tx
            .send(ActorMessage::Apply { mutation, done })
            .await
            .map_err(|_| StorageError::QueueClosed)?;

        done_rx.await.map_err(|_| StorageError::QueueClosed)??;
        value_rx.await.map_err(|_| StorageError::QueueClosed)
    }

    /// Drain queued mutations, then stop the actor
    pub async fn shutdown(&self) {
        let (done, done_rx) = oneshot::channel();
        if self
            .actor_tx
            .send(ActorMessage::Shutdown { done })
            .await
            .is_ok()
        {
            let _ = done_rx.await;
        }
    }
}
