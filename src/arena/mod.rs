// Arena-based storage for reactive node metadata
//
// - node_arena: NodeMetadata (version, state, graph edges) plus the
//   listener side-map
// - tracking: thread-local frames recording which nodes a computation reads
//
// NodeId is a lightweight newtype indexing into the global slab.

pub mod node_arena;
pub mod tracking;

pub(crate) use node_arena::{
    Listener, NodeId, NodeMetadata, ReactiveState, RefreshHook, add_listener, listeners,
    node_insert, node_remove, remove_listener,
};
pub(crate) use tracking::TrackingFrame;
pub use tracking::untracked;
