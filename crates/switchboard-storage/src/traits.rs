//! Storage traits for Switchboard.

use std::future::Future;

use switchboard_core::Flag;

use crate::error::StorageResult;

/// The authoritative source of the flag corpus.
///
/// `load_all` returns the complete set of flags with their segments,
/// constraints, distributions, and variants, read under a single
/// transaction so callers never observe torn updates. The corpus must be
/// internally consistent; the snapshot compiler treats violations as
/// grounds for rejecting the whole load.
pub trait CorpusStore: Send + Sync {
    /// Loads the complete corpus.
    fn load_all(&self) -> impl Future<Output = StorageResult<Vec<Flag>>> + Send;
}
