//! Remote DOM mirror tree
//!
//! Client-held replica of a remote page's document tree, kept consistent
//! with protocol-pushed mutation events by the `inspector` crate.
//!
//! ## Core design
//!
//! - **Ids, not pointers**: the registry map owns every node; parent,
//!   sibling and child links are plain protocol ids. No reference cycles,
//!   teardown is one deregistration pass.
//! - **Lazy subtrees**: `children` is `None` until fetched, distinct from
//!   loaded-but-empty; the declared child count can exceed the loaded
//!   length.
//! - **Exact sibling links**: every structural mutation ends in a full
//!   renumber pass, so index/sibling pointers are always consistent with the
//!   sequence.
//! - **Aggregated metadata**: user-attached properties maintain per-key
//!   descendant counters on every ancestor, updated incrementally on attach,
//!   detach and subtree removal.

pub mod document;
pub mod error;
pub mod node;
pub mod registry;
pub mod types;

pub use document::{DocumentInfo, MirrorDocument};
pub use error::{MirrorError, Result};
pub use node::{DoctypeInfo, MirrorNode, NodeDetail};
pub use registry::NodeRegistry;
pub use types::*;
