//! Read models and projections for the CQRS query side.
//!
//! This crate provides the query side of the booking engine:
//! - [`BookingView`] read models behind the [`ReadModelStore`] trait, with
//!   in-memory and PostgreSQL implementations
//! - [`ProjectionEngine`] applying appended records idempotently, rebuilding
//!   streams on gaps and catching up from a checkpoint
//! - [`BookingQueries`] serving eventual reads from read models and strong
//!   reads by replay

pub mod engine;
pub mod error;
pub mod postgres;
pub mod query;
pub mod read_model;

pub use engine::{ApplyOutcome, BOOKINGS_PROJECTION, CatchUpReport, ProjectionEngine};
pub use error::{ProjectionError, Result};
pub use postgres::PostgresReadModelStore;
pub use query::{BookingQueries, Consistency};
pub use read_model::{
    BookingFilter, BookingPage, BookingView, DEFAULT_PAGE_LIMIT, InMemoryReadModelStore,
    MAX_PAGE_LIMIT, Page, ReadModelStore,
};
