//! Task Graph (C3): build the dependency graph from loaded tasks,
//! detect cycles, compute the ready set, topologically sort, and
//! validate the steel-thread subgraph.

mod builder;

pub use builder::TaskGraph;
