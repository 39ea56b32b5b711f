//! Hierarchy-move engine for lineage-embedding document stores.
//!
//! Moves contacts to a new parent, finds every document that embeds the
//! moved contacts' ancestry, rewrites those embedded chains, and stages the
//! results for a later upload (`move_contacts`).

pub mod constraints;
pub mod index;
pub mod pipeline;
pub(crate) mod reads;
pub mod resolver;
pub mod rewriter;
pub mod staging;

#[cfg(test)]
mod test_support;

pub use index::{LineageIndex, ViewIndex};
pub use pipeline::{MoveResult, ProgressReporter, SilentProgress, move_contacts};
pub use resolver::{MoveRequest, ParentTarget, Resolution, Resolver};
pub use staging::{DirectorySink, MemorySink, StagedBatch, StagingSink, StagingWriter};
