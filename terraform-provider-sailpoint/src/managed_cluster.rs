//! Managed Cluster schema and state mapping
//!
//! Both managed cluster data sources share the attribute set built here and
//! translate API responses into Terraform state with [`cluster_state`].

use crate::client::ManagedCluster;
use crate::data_sources::ResourceState;
use crate::schema::{AttributeType, SchemaAttribute, SchemaBlock};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};

pub fn key_pair_type() -> AttributeType {
    AttributeType::object([
        ("public_key", AttributeType::String),
        ("public_key_thumbprint", AttributeType::String),
        ("public_key_certificate", AttributeType::String),
    ])
}

pub fn attributes_type() -> AttributeType {
    AttributeType::object([
        (
            "queue",
            AttributeType::object([
                ("name", AttributeType::String),
                ("region", AttributeType::String),
            ]),
        ),
        ("key_store", AttributeType::String),
    ])
}

pub fn redis_type() -> AttributeType {
    AttributeType::object([
        ("redis_host", AttributeType::String),
        ("redis_port", AttributeType::Number),
    ])
}

pub fn encryption_configuration_type() -> AttributeType {
    AttributeType::object([("format", AttributeType::String)])
}

/// Attributes describing one managed cluster.
///
/// `id` is the lookup key for the single-cluster data source and is only
/// computed when the block is nested in a listing.
pub fn managed_cluster_block(id_required: bool) -> SchemaBlock {
    let id = if id_required {
        SchemaAttribute::string().required()
    } else {
        SchemaAttribute::string().computed()
    };

    SchemaBlock::new()
        .with_attribute("id", id.with_description("Managed cluster ID"))
        .with_attribute("name", SchemaAttribute::string().computed())
        .with_attribute("pod", SchemaAttribute::string().computed())
        .with_attribute("org", SchemaAttribute::string().computed())
        .with_attribute(
            "type",
            SchemaAttribute::string()
                .with_description("Cluster type (idn or iai)")
                .computed(),
        )
        .with_attribute(
            "configuration",
            SchemaAttribute::map(AttributeType::String).computed(),
        )
        .with_attribute(
            "key_pair",
            SchemaAttribute::object(key_pair_type()).optional(),
        )
        .with_attribute(
            "attributes",
            SchemaAttribute::object(attributes_type()).computed(),
        )
        .with_attribute("redis", SchemaAttribute::object(redis_type()).computed())
        .with_attribute("description", SchemaAttribute::string().computed())
        .with_attribute("client_type", SchemaAttribute::string().computed())
        .with_attribute("ccg_version", SchemaAttribute::string().computed())
        .with_attribute("pinned_config", SchemaAttribute::bool().computed())
        .with_attribute("operational", SchemaAttribute::bool().computed())
        .with_attribute("status", SchemaAttribute::string().computed())
        .with_attribute("public_key_certificate", SchemaAttribute::string().computed())
        .with_attribute("public_key_thumbprint", SchemaAttribute::string().computed())
        .with_attribute("public_key", SchemaAttribute::string().computed())
        .with_attribute("alert_key", SchemaAttribute::string().computed())
        .with_attribute(
            "client_ids",
            SchemaAttribute::list(AttributeType::String).computed(),
        )
        .with_attribute("service_count", SchemaAttribute::number().computed())
        .with_attribute("cc_id", SchemaAttribute::string().computed())
        .with_attribute("created_at", SchemaAttribute::string().computed())
        .with_attribute("updated_at", SchemaAttribute::string().optional().computed())
        .with_attribute(
            "encryption_configuration",
            SchemaAttribute::object(encryption_configuration_type()).computed(),
        )
}

fn timestamp(field: &str, value: Option<&DateTime<Utc>>) -> String {
    match value {
        Some(date) => {
            let rendered = date.to_rfc3339_opts(SecondsFormat::Millis, true);
            tracing::trace!(field, date = %rendered, "Reading cluster timestamp");
            rendered
        }
        None => {
            tracing::trace!(field, "Cluster timestamp absent");
            String::new()
        }
    }
}

/// Translate an API cluster into Terraform state
pub fn cluster_state(cluster: &ManagedCluster) -> ResourceState {
    let text = |value: &Option<String>| json!(value.clone().unwrap_or_default());

    tracing::trace!(configuration = ?cluster.configuration, "Reading cluster configuration property");

    let key_pair = cluster.key_pair.clone().unwrap_or_default();
    let attributes = cluster.attributes.clone().unwrap_or_default();
    let queue = attributes.queue.unwrap_or_default();
    let redis = cluster.redis.clone().unwrap_or_default();
    let encryption = cluster.encryption_configuration.clone().unwrap_or_default();

    let mut state = ResourceState::new();
    state.set("id", text(&cluster.id));
    state.set("name", text(&cluster.name));
    state.set("pod", text(&cluster.pod));
    state.set("org", text(&cluster.org));
    state.set("type", text(&cluster.cluster_type));
    state.set("configuration", json!(cluster.configuration));
    state.set(
        "key_pair",
        json!({
            "public_key": key_pair.public_key,
            "public_key_thumbprint": key_pair.public_key_thumbprint,
            "public_key_certificate": key_pair.public_key_certificate,
        }),
    );
    state.set(
        "attributes",
        json!({
            "queue": {
                "name": queue.name.unwrap_or_default(),
                "region": queue.region.unwrap_or_default(),
            },
            "key_store": attributes.keystore,
        }),
    );
    state.set(
        "redis",
        json!({
            "redis_host": redis.redis_host,
            "redis_port": redis.redis_port,
        }),
    );
    state.set("description", text(&cluster.description));
    state.set("client_type", text(&cluster.client_type));
    state.set("ccg_version", text(&cluster.ccg_version));
    state.set("pinned_config", json!(cluster.pinned_config.unwrap_or(false)));
    state.set("operational", json!(cluster.operational.unwrap_or(false)));
    state.set("status", text(&cluster.status));
    state.set("public_key_certificate", text(&cluster.public_key_certificate));
    state.set("public_key_thumbprint", text(&cluster.public_key_thumbprint));
    state.set("public_key", text(&cluster.public_key));
    state.set("alert_key", text(&cluster.alert_key));
    state.set("client_ids", json!(cluster.client_ids));
    state.set("service_count", json!(cluster.service_count.unwrap_or(0)));
    state.set("cc_id", text(&cluster.cc_id));
    state.set(
        "created_at",
        json!(timestamp("created_at", cluster.created_at.as_ref())),
    );
    state.set(
        "updated_at",
        json!(timestamp("updated_at", cluster.updated_at.as_ref())),
    );
    state.set(
        "encryption_configuration",
        json!({ "format": encryption.format }),
    );

    state
}

/// State of one cluster as a JSON object, for nesting inside a listing
pub fn cluster_value(cluster: &ManagedCluster) -> Value {
    Value::Object(cluster_state(cluster).values.into_iter().collect())
}
