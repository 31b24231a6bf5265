//! Offline cluster-DAG construction
//!
//! Takes a normalised triangle mesh and produces the cluster DAG the
//! runtime consumes: iterative grouping of clusters via graph
//! partitioning, per-group quadric simplification, reassembly into
//! coarser layers, and enforcement of the monotonic error and bounding
//! invariants. The partitioner and simplifier sit behind trait seams
//! with one deterministic implementation of each in this crate.

pub mod builder;
pub mod cache;
pub mod partition;
pub mod simplify;

pub use builder::{BuildConfig, BuildStats, DagBuilder, LayerStats};
pub use cache::{load_dag, save_dag, CacheError, ModelPaths};
pub use partition::{GreedyGrowPartitioner, Partitioner};
pub use simplify::{QuadricSimplifier, SimplifiedMesh, Simplifier};
