//! sigflow: a real-time dataflow runtime core.
//!
//! Processing blocks own typed stream ports; a [`Graph`] connects them
//! through lock-free single-producer/single-consumer ring buffers and
//! drives them through a uniform polymorphic handle. Chains of pointwise
//! blocks can additionally be fused at compile time, so the per-sample path
//! of the chain runs as one function call with no intermediate buffers.
//!
//! # Building a pipeline
//!
//! ```
//! use sigflow::blocks::{CollectSink, CountingSource, Passthrough};
//! use sigflow::pointwise::PointwiseBlock;
//! use sigflow::properties::property;
//! use sigflow::{Graph, SimpleScheduler};
//!
//! let mut graph = Graph::new();
//! let source = graph.emplace_block::<CountingSource>(property("count", 64)).unwrap();
//! let stage = graph
//!     .emplace_block::<PointwiseBlock<Passthrough<u32>>>(Default::default())
//!     .unwrap();
//! let sink = graph.emplace_block::<CollectSink<u32>>(Default::default()).unwrap();
//!
//! // intents are recorded now, buffers materialise in perform_connections
//! assert!(graph.connect::<0, _>(source).to::<0, _>(stage).is_success());
//! assert!(graph.connect::<0, _>(stage).to::<0, _>(sink).is_success());
//! assert!(graph.perform_connections());
//!
//! SimpleScheduler::new().run(&mut graph).unwrap();
//! assert_eq!(graph.block(sink).unwrap().samples().len(), 64);
//! ```
//!
//! # Fusing pointwise kernels
//!
//! ```
//! use sigflow::blocks::{Adder, Scale};
//! use sigflow::fused::merge_by_index;
//! use sigflow::pointwise::Pointwise;
//!
//! // adder feeding a scale-by-2, collapsed into one kernel
//! let mut fused = merge_by_index::<0, 0, _, _>(Adder::<i32>::new(), Scale::new(2));
//! assert_eq!(fused.process_one(0, (3, 4)), (14,));
//! ```

pub mod block;
pub mod blocks;
pub mod buffer;
pub mod error;
pub mod fused;
pub mod graph;
pub mod handle;
pub mod lifecycle;
pub mod meta;
pub mod pointwise;
pub mod port;
pub mod properties;
pub mod scheduler;
pub mod thread_pool;

pub use block::{
    Block, BlockCore, InputPortAt, OutputPortAt, PortDecl, ProgressSequence, WorkResult,
    WorkStatus,
};
pub use error::{FlowError, Result};
pub use fused::{merge_by_index, FusedBlock};
pub use graph::{Edge, Graph, MessageSourceConnector, NamedSourceConnector, SourceConnector};
pub use handle::{BlockAdapter, BlockId, BlockRef, DynBlock};
pub use lifecycle::{LifecycleState, TransitionError};
pub use pointwise::{FromSettings, Pointwise, PointwiseBlock, SampleTuple};
pub use port::{
    ConnectionResult, DynamicPort, DynamicPortEntry, PortAccessError, PortDirection, PortDomain,
    PortIndex, StreamInput, StreamOutput, MESSAGE_PORT_INDEX,
};
pub use properties::{Message, PropertyMap, SettingsMap};
pub use scheduler::SimpleScheduler;
pub use thread_pool::IoThreadPool;

/// Common imports for building and running flow graphs.
pub mod prelude {
    pub use crate::block::{Block, BlockCore, PortDecl, WorkResult, WorkStatus};
    pub use crate::error::{FlowError, Result};
    pub use crate::fused::merge_by_index;
    pub use crate::graph::Graph;
    pub use crate::handle::{BlockRef, DynBlock};
    pub use crate::lifecycle::LifecycleState;
    pub use crate::pointwise::{Pointwise, PointwiseBlock};
    pub use crate::port::{ConnectionResult, PortIndex, StreamInput, StreamOutput};
    pub use crate::properties::{property, PropertyMap, SettingsMap};
    pub use crate::scheduler::SimpleScheduler;
}
