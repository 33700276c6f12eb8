//! Append-only event store for the booking engine.
//!
//! Streams are keyed by [`StreamId`]. Every append is conditional on the
//! stream's current sequence number, which is the only atomic point of the
//! write path. Two backends implement [`EventStore`]:
//! - [`InMemoryEventStore`] for tests and single-process runs
//! - [`PostgresEventStore`] backed by sqlx

pub mod error;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod store;

pub use common::StreamId;
pub use error::{EventStoreError, Result};
pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use record::{EventId, EventMetadata, EventRecord, GlobalPosition, NewEvent, SequenceNumber};
pub use store::{EventStore, EventStoreExt, EventStream};
