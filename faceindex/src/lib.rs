//! Similarity index over enrolled face embeddings.
//!
//! Every enrollment is kept as its own entry: a person may be enrolled many
//! times (poses, lighting) and identical vectors are never merged. Entries
//! get sequential ids in enrollment order, and query results with equal
//! distance are ordered by id, so the first-enrolled match always wins.
//!
//! Two implementations share the [`FaceIndex`] trait:
//!
//! - [`FlatIndex`]: exact linear scan.
//! - [`HnswIndex`]: Hierarchical Navigable Small World graph, sub-linear
//!   queries with a small recall loss. Exact-match queries always return
//!   the stored vector.
//!
//! Indices persist through [`save`] / [`load`] as the full list of
//! (label, embedding) pairs tagged with the embedding model id; either
//! backend can be rebuilt from the same file.

mod error;
mod flat;
mod hnsw;
mod index;
mod persist;

pub use error::IndexError;
pub use flat::FlatIndex;
pub use hnsw::{HnswConfig, HnswIndex};
pub use index::{Backend, Entry, FaceIndex, IndexConfig, MAX_STRING_LEN, Neighbor};
pub use persist::{Snapshot, load, load_file, save, save_file};
