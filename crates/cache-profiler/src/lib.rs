//! Event-to-primary-key access pattern profiling for the indexing row cache.
//!
//! Sampled reads are fed to a [`Profiler`], which searches the triggering
//! event's payload for field paths (optionally transformed, optionally
//! joined from more than one field) that reconstruct the row's primary key.
//! Once a pattern's observed frequency clears a threshold, the cache can use
//! it to prefetch rows ahead of the read that would otherwise miss (spec
//! §4.4-§4.5).

pub mod event_walk;
pub mod pattern;
pub mod profiler;

pub use event_walk::{EventWalk, JsonEventWalk};
pub use pattern::{ColumnPattern, ProfilePattern, Transform};
pub use profiler::Profiler;
