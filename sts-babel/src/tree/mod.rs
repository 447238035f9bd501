//! Document tree: vocabulary, nodes, the streaming builder and partitions.

pub mod builder;
pub mod node;
pub mod partition;
pub mod tag;
pub mod text;

pub use builder::{BuilderOptions, TreeBuilder, ROOT_PARTITION};
pub use node::{DocumentPart, Node, NodeId};
pub use partition::{replay, Discard, Partition, PartitionSink, PartitionWriter, TreeHeader};
pub use tag::Tag;
