//! Shared data model for the cluster-LOD pipeline
//!
//! This crate holds everything both the offline builder and the runtime
//! selector agree on: the triangle mesh container and OBJ ingestion, the
//! dual graphs used for partitioning, bounding spheres, the RMS error
//! metric, and the cluster DAG itself.

pub mod bounds;
pub mod dag;
pub mod dual_graph;
pub mod error_metric;
pub mod kd;
pub mod mesh;
pub mod obj;

pub use bounds::BoundingSphere;
pub use dag::ClusterDag;
pub use mesh::TriangleMesh;
