//! Identifier types shared by every crate in the booking engine.

mod types;

pub use types::{ParseStreamIdError, StreamId};
