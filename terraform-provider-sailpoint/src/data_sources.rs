//! Terraform Data Sources for SailPoint
//!
//! Read-only lookups of managed clusters.

use crate::client::SailPointClient;
use crate::managed_cluster::{cluster_state, cluster_value, managed_cluster_block};
use crate::schema::{Diagnostic, ResourceSchema, SchemaAttribute, SchemaBlock};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Result type for data source operations
pub type ResourceResult<T> = Result<T, Vec<Diagnostic>>;

/// Data source configuration or state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceState {
    pub values: HashMap<String, Value>,
}

impl ResourceState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON object; anything else yields an empty state
    pub fn from_value(value: Option<&Value>) -> Self {
        let values = value
            .and_then(|v| v.as_object())
            .map(|obj| obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.values.get(key).and_then(|v| v.as_str()).map(String::from)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.values.get(key).and_then(|v| v.as_i64())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.values.get(key).and_then(|v| v.as_bool())
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }
}

/// Data source trait
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Data source type name
    fn type_name(&self) -> &str;

    /// Get the schema for this data source
    fn schema(&self) -> ResourceSchema;

    /// Check a configuration before any API call is made
    fn validate(&self, config: &ResourceState) -> Vec<Diagnostic> {
        let _ = config;
        Vec::new()
    }

    /// Fetch the remote object(s) and return the state to record
    async fn read(
        &self,
        client: &SailPointClient,
        config: &ResourceState,
    ) -> ResourceResult<ResourceState>;
}

// ============================================================================
// Managed Cluster Data Source
// ============================================================================

#[derive(Debug, Default)]
pub struct ManagedClusterDataSource;

impl ManagedClusterDataSource {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DataSource for ManagedClusterDataSource {
    fn type_name(&self) -> &str {
        "sailpoint_managed_cluster"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(
            0,
            managed_cluster_block(true).with_description("Look up a single managed cluster by ID"),
        )
    }

    fn validate(&self, config: &ResourceState) -> Vec<Diagnostic> {
        match config.get_string("id") {
            Some(id) if id.is_empty() => vec![Diagnostic::attribute_error(
                "id",
                "Invalid Managed Cluster ID",
                "ID cannot be empty",
            )],
            _ => Vec::new(),
        }
    }

    async fn read(
        &self,
        client: &SailPointClient,
        config: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        tracing::info!("Reading Managed Cluster");

        let id = config.get_string("id").unwrap_or_default();
        if id.is_empty() {
            return Err(vec![Diagnostic::error("Unable to Read Managed Cluster")
                .with_detail("ID cannot be empty")]);
        }
        tracing::debug!(id = %id, "Reading Managed Cluster");

        match client.get_managed_cluster(&id).await {
            Ok(cluster) => {
                // The configured id is authoritative; the body may omit it.
                let mut state = cluster_state(&cluster);
                state.set("id", Value::String(id));
                Ok(state)
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    response_body = e.response_body().unwrap_or_default(),
                    "Error reading managed cluster"
                );
                Err(vec![Diagnostic::error("Unable to Read Managed Cluster")
                    .with_detail(&e.to_string())])
            }
        }
    }
}

// ============================================================================
// Managed Clusters Data Source
// ============================================================================

#[derive(Debug, Default)]
pub struct ManagedClustersDataSource;

impl ManagedClustersDataSource {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DataSource for ManagedClustersDataSource {
    fn type_name(&self) -> &str {
        "sailpoint_managed_clusters"
    }

    fn schema(&self) -> ResourceSchema {
        let cluster = managed_cluster_block(false).object_type();
        let block = SchemaBlock::new()
            .with_attribute(
                "filters",
                SchemaAttribute::string()
                    .with_description(
                        "Filter results using the standard syntax described in V3 API Standard Collection Parameters",
                    )
                    .optional(),
            )
            .with_attribute(
                "managed_clusters",
                SchemaAttribute::list(cluster).computed(),
            )
            .with_description("List managed clusters, optionally filtered");

        ResourceSchema::new(0, block)
    }

    async fn read(
        &self,
        client: &SailPointClient,
        config: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        tracing::info!("Reading Managed Clusters");

        let filters = config.get_string("filters");
        tracing::debug!(filters = filters.as_deref().unwrap_or_default(), "Reading Managed Clusters filters");

        let clusters = match client.list_managed_clusters(filters.as_deref()).await {
            Ok(clusters) => clusters,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    response_body = e.response_body().unwrap_or_default(),
                    "Error reading managed clusters"
                );
                return Err(vec![Diagnostic::error("Unable to Read Managed Clusters")
                    .with_detail(&e.to_string())]);
            }
        };

        let managed_clusters: Vec<Value> = clusters
            .iter()
            .map(|cluster| {
                tracing::debug!(id = cluster.id.as_deref().unwrap_or_default(), "Iterating through the clusters");
                cluster_value(cluster)
            })
            .collect();

        let mut state = ResourceState::new();
        state.set(
            "filters",
            config.get("filters").cloned().unwrap_or(Value::Null),
        );
        state.set("managed_clusters", Value::Array(managed_clusters));
        Ok(state)
    }
}

/// Get all available data sources
pub fn get_all_data_sources() -> Vec<Box<dyn DataSource>> {
    vec![
        Box::new(ManagedClusterDataSource::new()),
        Box::new(ManagedClustersDataSource::new()),
    ]
}
