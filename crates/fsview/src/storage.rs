//! Arena storage for the view graph.
//!
//! Records live in slabs and refer to each other by compact indices, so
//! parent/child and recency links are plain integers. Removing a record can
//! never leave a dangling pointer behind, only an index that no longer
//! resolves.

mod index_types;
mod slab;

pub use index_types::{OptionSlabIndex, SlabIndex};
pub use slab::{Slab, SlabIter};
