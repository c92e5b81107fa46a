//! Terraform Provider Implementation
//!
//! Implements the Terraform Plugin Protocol for SailPoint Identity Security Cloud.

use crate::client::{ClientConfig, ClientError, SailPointClient};
use crate::data_sources::{get_all_data_sources, DataSource, ResourceState};
use crate::schema::{
    Diagnostic, ProviderSchema, RpcRequest, RpcResponse, SchemaAttribute, SchemaBlock, TfValue,
};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::runtime::Runtime;

/// Provider type name, the prefix of every data source
pub const TYPE_NAME: &str = "sailpoint";

/// Provider version reported to Terraform
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Provider configuration as written in the `provider "sailpoint"` block
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub base_url: TfValue<String>,
    #[serde(default)]
    pub client_id: TfValue<String>,
    #[serde(default)]
    pub client_secret: TfValue<String>,
    #[serde(default)]
    pub experimental: TfValue<bool>,
}

/// Resolve the provider block against environment defaults.
///
/// `env` looks up `SAIL_*` variables; configured values win over them.
pub fn resolve_config<F>(config: &ProviderConfig, env: F) -> Result<ClientConfig, Vec<Diagnostic>>
where
    F: Fn(&str) -> Option<String>,
{
    let mut diagnostics = Vec::new();

    if config.base_url.is_unknown() {
        diagnostics.push(Diagnostic::attribute_error(
            "base_url",
            "Unknown SailPoint API Base URL",
            "The provider cannot create the SailPoint API client as there is an unknown configuration value for the SailPoint API base URL. \
             Either target apply the source of the value first, set the value statically in the configuration, or use the SAIL_BASE_URL environment variable.",
        ));
    }

    if config.client_id.is_unknown() {
        diagnostics.push(Diagnostic::attribute_error(
            "client_id",
            "Unknown SailPoint PAT client_id",
            "The provider cannot create the SailPoint API client as there is an unknown configuration value for the SailPoint API Client ID. \
             Either target apply the source of the value first, set the value statically in the configuration, or use the SAIL_CLIENT_ID environment variable.",
        ));
    }

    if config.client_secret.is_unknown() {
        diagnostics.push(Diagnostic::attribute_error(
            "client_secret",
            "Unknown SailPoint PAT client_secret",
            "The provider cannot create the SailPoint API client as there is an unknown configuration value for the SailPoint API Client secret. \
             Either target apply the source of the value first, set the value statically in the configuration, or use the SAIL_CLIENT_SECRET environment variable.",
        ));
    }

    if !diagnostics.is_empty() {
        return Err(diagnostics);
    }

    let resolve = |value: &TfValue<String>, var: &str| {
        value
            .known()
            .cloned()
            .unwrap_or_else(|| env(var).unwrap_or_default())
    };

    let base_url = resolve(&config.base_url, "SAIL_BASE_URL");
    let client_id = resolve(&config.client_id, "SAIL_CLIENT_ID");
    let client_secret = resolve(&config.client_secret, "SAIL_CLIENT_SECRET");
    let experimental = match config.experimental {
        TfValue::Known(value) => value,
        TfValue::Unknown => false,
        TfValue::Null => env("SAIL_EXPERIMENTAL").as_deref() == Some("true"),
    };

    if base_url.is_empty() {
        diagnostics.push(Diagnostic::attribute_error(
            "base_url",
            "Missing SailPoint API base_url",
            "The provider cannot create the SailPoint API client as there is a missing or empty value for the SailPoint API Base URL. \
             Set the base_url value in the configuration or use the SAIL_BASE_URL environment variable. \
             If either is already set, ensure the value is not empty.",
        ));
    }

    if client_id.is_empty() {
        diagnostics.push(Diagnostic::attribute_error(
            "client_id",
            "Missing SailPoint PAT client_id",
            "The provider cannot create the SailPoint API client as there is a missing or empty value for the SailPoint PAT Client ID. \
             Set the client_id value in the configuration or use the SAIL_CLIENT_ID environment variable. \
             If either is already set, ensure the value is not empty.",
        ));
    }

    if client_secret.is_empty() {
        diagnostics.push(Diagnostic::attribute_error(
            "client_secret",
            "Missing SailPoint PAT client_secret",
            "The provider cannot create the SailPoint API client as there is a missing or empty value for the SailPoint PAT Client secret. \
             Set the client_secret value in the configuration or use the SAIL_CLIENT_SECRET environment variable. \
             If either is already set, ensure the value is not empty.",
        ));
    }

    if !diagnostics.is_empty() {
        return Err(diagnostics);
    }

    Ok(ClientConfig {
        base_url,
        client_id,
        client_secret,
        experimental,
    })
}

/// SailPoint Terraform Provider
pub struct SailPointProvider {
    client: Arc<RwLock<Option<SailPointClient>>>,
    data_sources: HashMap<String, Box<dyn DataSource>>,
    runtime: Runtime,
}

impl SailPointProvider {
    /// Create a new provider
    pub fn new() -> std::io::Result<Self> {
        let data_sources: HashMap<String, Box<dyn DataSource>> = get_all_data_sources()
            .into_iter()
            .map(|d| (d.type_name().to_string(), d))
            .collect();

        Ok(Self {
            client: Arc::new(RwLock::new(None)),
            data_sources,
            runtime: Runtime::new()?,
        })
    }

    /// Get provider schema
    pub fn get_schema(&self) -> ProviderSchema {
        let provider_block = SchemaBlock::new()
            .with_attribute(
                "base_url",
                SchemaAttribute::string()
                    .with_description(
                        "The API URL used to access your Identity Security Cloud tenant (ex. https://tenant.api.identitynow.com)",
                    )
                    .required(),
            )
            .with_attribute(
                "client_id",
                SchemaAttribute::string()
                    .with_description("The personal access token client ID")
                    .required(),
            )
            .with_attribute(
                "client_secret",
                SchemaAttribute::string()
                    .with_description("The personal access token client secret")
                    .required()
                    .sensitive(),
            )
            .with_attribute(
                "experimental",
                SchemaAttribute::bool()
                    .with_description("Whether it's allowed to use experimental resources")
                    .optional(),
            )
            .with_description("SailPoint Identity Security Cloud provider");

        let mut schema = ProviderSchema::new(provider_block);

        for (name, data_source) in &self.data_sources {
            schema = schema.with_data_source(name, data_source.schema());
        }

        schema
    }

    /// Configure the provider
    fn configure(&self, config: ProviderConfig) -> Vec<Diagnostic> {
        tracing::info!("Configuring SailPoint provider");

        let client_config = match resolve_config(&config, |var| std::env::var(var).ok()) {
            Ok(c) => c,
            Err(diagnostics) => return diagnostics,
        };

        tracing::debug!(
            sailpoint_base_url = %client_config.base_url,
            sailpoint_client_id = %client_config.client_id,
            sailpoint_client_secret = "***",
            "Creating SailPoint API client"
        );

        let client = match SailPointClient::new(client_config) {
            Ok(c) => c,
            Err(ClientError::InvalidConfig(detail)) => {
                return vec![Diagnostic::attribute_error(
                    "base_url",
                    "Invalid SailPoint API base_url",
                    &detail,
                )];
            }
            Err(e) => {
                return vec![Diagnostic::error("Unable to Create SailPoint API Client")
                    .with_detail(&e.to_string())];
            }
        };

        if client.experimental() {
            tracing::debug!("Allowing the client to use experimental resources");
        }

        match self.client.write() {
            Ok(mut slot) => *slot = Some(client),
            Err(_) => return vec![Diagnostic::error("Provider state lock poisoned")],
        }

        Vec::new()
    }

    /// Get the configured client
    fn get_client(&self) -> Result<SailPointClient, Diagnostic> {
        self.client
            .read()
            .map_err(|_| Diagnostic::error("Provider state lock poisoned"))?
            .clone()
            .ok_or_else(|| Diagnostic::error("Provider not configured"))
    }

    fn get_data_source(&self, params: &Value) -> Result<&dyn DataSource, Diagnostic> {
        let type_name = params
            .get("type_name")
            .and_then(|v| v.as_str())
            .unwrap_or("");

        self.data_sources
            .get(type_name)
            .map(|d| d.as_ref())
            .ok_or_else(|| Diagnostic::error(&format!("Unknown data source type: {}", type_name)))
    }

    /// Handle an RPC request
    pub fn handle_request(&self, input: &str) -> String {
        let request: RpcRequest = match serde_json::from_str(input) {
            Ok(r) => r,
            Err(e) => {
                return serde_json::to_string(&RpcResponse::error(
                    0,
                    -32700,
                    &format!("Parse error: {}", e),
                ))
                .unwrap_or_default();
            }
        };

        tracing::debug!(method = %request.method, id = request.id, "Handling RPC request");

        let response = match request.method.as_str() {
            "GetMetadata" => self.handle_get_metadata(request.id),
            "GetProviderSchema" => self.handle_get_schema(request.id),
            "ValidateProviderConfig" => {
                self.handle_validate_provider(request.id, &request.params)
            }
            "ConfigureProvider" => self.handle_configure(request.id, &request.params),
            "ValidateDataResourceConfig" => {
                self.handle_validate_data_source(request.id, &request.params)
            }
            "ReadDataSource" => self.handle_read_data_source(request.id, &request.params),
            "StopProvider" => RpcResponse::success(request.id, serde_json::json!({})),
            _ => RpcResponse::error(
                request.id,
                -32601,
                &format!("Method not found: {}", request.method),
            ),
        };

        serde_json::to_string(&response).unwrap_or_else(|e| {
            serde_json::to_string(&RpcResponse::error(
                request.id,
                -32603,
                &format!("Serialization error: {}", e),
            ))
            .unwrap_or_default()
        })
    }

    /// Handle GetMetadata
    fn handle_get_metadata(&self, id: i64) -> RpcResponse {
        let mut names: Vec<&String> = self.data_sources.keys().collect();
        names.sort();

        let data_sources: Vec<Value> = names
            .into_iter()
            .map(|name| serde_json::json!({ "type_name": name }))
            .collect();

        RpcResponse::success(
            id,
            serde_json::json!({
                "provider": { "type_name": TYPE_NAME, "version": VERSION },
                "data_sources": data_sources,
                "resources": [],
                "diagnostics": []
            }),
        )
    }

    /// Handle GetProviderSchema
    fn handle_get_schema(&self, id: i64) -> RpcResponse {
        match serde_json::to_value(self.get_schema()) {
            Ok(schema) => RpcResponse::success(id, schema),
            Err(e) => RpcResponse::error(id, -32603, &format!("Serialization error: {}", e)),
        }
    }

    fn parse_provider_config(params: &Value) -> Result<ProviderConfig, Diagnostic> {
        match params.get("config") {
            None | Some(Value::Null) => Ok(ProviderConfig::default()),
            Some(config) => serde_json::from_value(config.clone()).map_err(|e| {
                Diagnostic::error("Invalid provider configuration").with_detail(&e.to_string())
            }),
        }
    }

    /// Handle ValidateProviderConfig
    fn handle_validate_provider(&self, id: i64, params: &Value) -> RpcResponse {
        let diagnostics = match Self::parse_provider_config(params) {
            Ok(_) => Vec::new(),
            Err(diag) => vec![diag],
        };
        RpcResponse::diagnostics(id, &diagnostics)
    }

    /// Handle ConfigureProvider
    fn handle_configure(&self, id: i64, params: &Value) -> RpcResponse {
        let diagnostics = match Self::parse_provider_config(params) {
            Ok(config) => self.configure(config),
            Err(diag) => vec![diag],
        };
        RpcResponse::diagnostics(id, &diagnostics)
    }

    /// Handle ValidateDataResourceConfig
    fn handle_validate_data_source(&self, id: i64, params: &Value) -> RpcResponse {
        let data_source = match self.get_data_source(params) {
            Ok(d) => d,
            Err(diag) => return RpcResponse::diagnostics(id, &[diag]),
        };

        let config = ResourceState::from_value(params.get("config"));
        RpcResponse::diagnostics(id, &data_source.validate(&config))
    }

    /// Handle ReadDataSource
    fn handle_read_data_source(&self, id: i64, params: &Value) -> RpcResponse {
        let data_source = match self.get_data_source(params) {
            Ok(d) => d,
            Err(diag) => return RpcResponse::diagnostics(id, &[diag]),
        };

        let client = match self.get_client() {
            Ok(c) => c,
            Err(diag) => return RpcResponse::diagnostics(id, &[diag]),
        };

        let config = ResourceState::from_value(params.get("config"));

        let result = self
            .runtime
            .block_on(async { data_source.read(&client, &config).await });

        match result {
            Ok(state) => RpcResponse::success(
                id,
                serde_json::json!({
                    "state": state.values,
                    "diagnostics": []
                }),
            ),
            Err(diagnostics) => RpcResponse::diagnostics(id, &diagnostics),
        }
    }
}
