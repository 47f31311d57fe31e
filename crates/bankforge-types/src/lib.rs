//! Shared data types for the bankforge generation pipeline.
//!
//! Pure data only: run and stage identifiers, lifecycle statuses, the
//! stage-scoped progress cursor, checkpoint records and generated rows.
//! Both the state crate and the engine depend on these so neither has to
//! depend on the other.

#![warn(clippy::pedantic)]

pub mod checkpoint;
pub mod cursor;
pub mod row;
pub mod state;
