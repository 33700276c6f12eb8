//! Command handling infrastructure.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use event_store::{EventMetadata, EventRecord, EventStore, NewEvent, SequenceNumber, StreamId};

use crate::aggregate::{Aggregate, DomainEvent};
use crate::error::DomainError;
use crate::listener::EventListener;
use crate::replay::{self, Replayed};

/// Result of command execution.
#[derive(Debug)]
pub struct CommandOutcome<A: Aggregate> {
    /// The aggregate after applying the new events.
    pub state: A,

    /// The records that were appended, empty for a no-op.
    pub records: Vec<EventRecord>,

    /// The stream's highest sequence number after the command.
    pub new_version: SequenceNumber,
}

impl<A: Aggregate> CommandOutcome<A> {
    /// Returns true if the decision produced no events.
    pub fn is_noop(&self) -> bool {
        self.records.is_empty()
    }
}

/// Trait for commands that can be executed against an aggregate.
///
/// Commands represent an intention to perform an action. They may be rejected
/// if the aggregate's current state doesn't allow the action.
pub trait Command: Send + Sync {
    /// The type of aggregate this command targets.
    type Aggregate: Aggregate;

    /// Returns the stream this command targets.
    fn stream_id(&self) -> StreamId;
}

/// How often a command is re-run after losing an append race.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,

    /// Base delay; attempt `n` waits `n * backoff` before retrying.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(10),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// A policy that surfaces the first conflict.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff * attempt
    }
}

/// Handler for executing commands against aggregates.
///
/// Each attempt reads the stream, replays it, runs the decision against the
/// replayed state, and appends the resulting events with the replayed version
/// as the expected version. A lost race re-runs the whole cycle, up to the
/// retry policy's attempt budget. Registered listeners see every successful
/// append.
pub struct CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    store: S,
    listeners: Vec<Arc<dyn EventListener>>,
    retry: RetryPolicy,
    _phantom: PhantomData<A>,
}

impl<S, A> CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    /// Creates a new command handler with the given event store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            listeners: Vec::new(),
            retry: RetryPolicy::default(),
            _phantom: PhantomData,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Registers a listener notified after every successful append.
    pub fn with_listener(mut self, listener: Arc<dyn EventListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Returns a reference to the underlying event store.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Replays a stream into its current state.
    ///
    /// A stream that was never written replays to the initial state.
    pub async fn load(&self, stream_id: StreamId) -> Result<Replayed<A>, DomainError> {
        Ok(replay::load(&self.store, stream_id).await?)
    }

    /// Loads an aggregate, returning None if it doesn't exist.
    pub async fn load_existing(&self, stream_id: StreamId) -> Result<Option<A>, DomainError> {
        let replayed = self.load(stream_id).await?;
        Ok(replayed.exists().then_some(replayed.state))
    }

    /// Executes a command whose decision is a pure function of the state.
    pub async fn execute<F>(
        &self,
        stream_id: StreamId,
        metadata: EventMetadata,
        decide: F,
    ) -> Result<CommandOutcome<A>, DomainError>
    where
        F: Fn(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        self.execute_with(stream_id, metadata, |state| {
            std::future::ready(decide(&state).map_err(DomainError::from))
        })
        .await
    }

    /// Executes a command whose decision needs I/O, such as an availability
    /// lookup.
    ///
    /// `decide` runs once per attempt against freshly replayed state.
    pub async fn execute_with<F, Fut>(
        &self,
        stream_id: StreamId,
        metadata: EventMetadata,
        decide: F,
    ) -> Result<CommandOutcome<A>, DomainError>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<Vec<A::Event>, DomainError>>,
    {
        let aggregate = A::aggregate_type();
        let mut attempt = 1;

        loop {
            let replayed = self.load(stream_id).await?;
            let version = replayed.version;

            let events = match decide(replayed.state.clone()).await {
                Ok(events) => events,
                Err(e) => {
                    metrics::counter!("commands_rejected", "aggregate" => aggregate).increment(1);
                    tracing::debug!(%stream_id, error = %e, "command rejected");
                    return Err(e);
                }
            };

            if events.is_empty() {
                return Ok(CommandOutcome {
                    state: replayed.state,
                    records: vec![],
                    new_version: version,
                });
            }

            let new_events = build_new_events(&events, &metadata)?;

            match self.store.append(stream_id, version, new_events).await {
                Ok(records) => {
                    let new_version = records.last().map_or(version, |r| r.sequence_number);
                    let state = replayed.state.apply_all(&events);

                    metrics::counter!("commands_executed", "aggregate" => aggregate).increment(1);
                    self.notify(&records).await;

                    return Ok(CommandOutcome {
                        state,
                        records,
                        new_version,
                    });
                }
                Err(e) if e.is_conflict() && attempt < self.retry.max_attempts => {
                    tracing::warn!(%stream_id, expected = %version, attempt, "append conflict, retrying");
                    metrics::counter!("command_retries", "aggregate" => aggregate).increment(1);
                    tokio::time::sleep(self.retry.delay_for(attempt)).await;
                    attempt += 1;
                }
                Err(e) if e.is_conflict() => {
                    tracing::error!(%stream_id, attempts = attempt, "retry budget exhausted");
                    metrics::counter!("commands_rejected", "aggregate" => aggregate).increment(1);
                    return Err(DomainError::ConcurrencyConflict {
                        stream_id,
                        attempts: attempt,
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn notify(&self, records: &[EventRecord]) {
        for listener in &self.listeners {
            tracing::trace!(listener = listener.name(), count = records.len(), "notifying");
            listener.on_appended(records).await;
        }
    }
}

fn build_new_events<E: DomainEvent>(
    events: &[E],
    metadata: &EventMetadata,
) -> Result<Vec<NewEvent>, DomainError> {
    events
        .iter()
        .map(|event| {
            Ok(NewEvent::new(event.event_type(), event.to_payload()?)
                .with_metadata(metadata.clone()))
        })
        .collect()
}
