//! Terraform Provider for SailPoint Identity Security Cloud
//!
//! Exposes read-only managed cluster data sources over the Terraform plugin
//! protocol.

pub mod client;
pub mod data_sources;
pub mod managed_cluster;
pub mod provider;
pub mod schema;

pub use provider::SailPointProvider;
