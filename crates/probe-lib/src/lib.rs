//! Library for capturing and rendering runtime profiles across clusters
//!
//! This crate provides the core functionality for:
//! - Authenticated API clients for a fleet of clusters
//! - Concurrent capture of raw profiles through the pod proxy or by address
//! - Rendering flame graphs and call graphs with external tools
//! - Artifact storage and listing
//! - Health checks and observability

pub mod capture;
pub mod cluster;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod render;
pub mod storage;

pub use capture::{HttpFetcher, ProfileFetcher, ProfileService, ProfileServiceBuilder, RequestKey};
pub use cluster::{ClusterManager, ClusterRegistry};
pub use error::{ProbeError, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ProbeMetrics, StructuredLogger};
pub use render::{ExternalTools, RenderTool, Renderer};
pub use storage::{ArtifactStore, FilesystemStore, MemoryStore};
