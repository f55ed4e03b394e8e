//! Stream discovery.
//!
//! Each configured table becomes one stream whose schema is inferred from a
//! fresh sample of its newest files. Nothing from a previous discovery is
//! reused.

use std::collections::HashSet;

use ferry_core::Session;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use snafu::ResultExt;
use tracing::{info, warn};

use crate::catalog::get_files;
use crate::config::{Config, TableSpec};
use crate::decode::{DecodeOptions, SDC_SOURCE_FILE, SDC_SOURCE_LINENO};
use crate::error::{ConnectSnafu, DiscoveryCatalogSnafu, DiscoveryConfigSnafu, DiscoveryError};
use crate::schema::sampling::sample_files;
use crate::schema::{generate_schema, table_schema};

pub const INCLUSION_AUTOMATIC: &str = "automatic";
pub const INCLUSION_AVAILABLE: &str = "available";
pub const REPLICATION_INCREMENTAL: &str = "INCREMENTAL";

/// Selection metadata for the stream (`breadcrumb` empty) or one property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub breadcrumb: Vec<String>,
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredStream {
    pub table_name: String,
    pub key_properties: Vec<String>,
    pub schema: Value,
    #[serde(default)]
    pub metadata: Vec<MetadataEntry>,
}

impl DiscoveredStream {
    /// Property names of the schema; empty for the empty schema.
    pub fn property_names(&self) -> HashSet<String> {
        self.schema
            .get("properties")
            .and_then(Value::as_object)
            .map(|p| p.keys().cloned().collect())
            .unwrap_or_default()
    }
}

/// Output of a discovery run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamCatalog {
    pub streams: Vec<DiscoveredStream>,
}

impl StreamCatalog {
    /// Load a catalog previously written by `ferry discover`.
    pub fn from_json(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(contents)
    }
}

/// Build the metadata entries for a stream.
pub fn build_metadata(schema: &Value, key_properties: &[String]) -> Vec<MetadataEntry> {
    let mut table = Map::new();
    table.insert("table-key-properties".to_string(), json!(key_properties));
    table.insert(
        "forced-replication-method".to_string(),
        json!(REPLICATION_INCREMENTAL),
    );

    let mut entries = vec![MetadataEntry {
        breadcrumb: Vec::new(),
        metadata: table,
    }];

    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return entries;
    };

    for name in properties.keys() {
        let automatic = key_properties.contains(name) || name == SDC_SOURCE_FILE || name == SDC_SOURCE_LINENO;
        let mut metadata = Map::new();
        metadata.insert(
            "inclusion".to_string(),
            json!(if automatic { INCLUSION_AUTOMATIC } else { INCLUSION_AVAILABLE }),
        );
        entries.push(MetadataEntry {
            breadcrumb: vec!["properties".to_string(), name.clone()],
            metadata,
        });
    }
    entries
}

/// Discover one table over an already-constructed session.
pub async fn discover_table(
    session: &mut Session,
    config: &Config,
    table: &TableSpec,
) -> Result<DiscoveredStream, DiscoveryError> {
    let options = DecodeOptions::for_table(table, config.encoding_for(table)).context(DiscoveryConfigSnafu {
        table: table.table_name.clone(),
    })?;

    let files = get_files(session, table, None)
        .await
        .context(DiscoveryCatalogSnafu {
            table: table.table_name.clone(),
        })?;

    let schema = if files.is_empty() {
        warn!(table = %table.table_name, "No files matched; the discovered schema is empty");
        json!({})
    } else {
        let samples = sample_files(session, &table.table_name, &files, &options, &config.sampling).await?;
        let properties = generate_schema(&samples, &table.date_overrides);
        if properties.is_empty() {
            json!({})
        } else {
            table_schema(properties)
        }
    };

    let metadata = build_metadata(&schema, &table.key_properties);
    Ok(DiscoveredStream {
        table_name: table.table_name.clone(),
        key_properties: table.key_properties.clone(),
        schema,
        metadata,
    })
}

/// Discover every configured table, one session per table.
pub async fn discover_streams(config: &Config) -> Result<StreamCatalog, DiscoveryError> {
    let mut streams = Vec::with_capacity(config.tables.len());

    for table in &config.tables {
        let mut session = config.session_for(table).context(ConnectSnafu)?;
        if let Err(source) = session.ensure_connected().await {
            return Err(DiscoveryError::Connect { source });
        }

        let result = discover_table(&mut session, config, table).await;
        session.close().await;

        let stream = result?;
        info!(
            table = %stream.table_name,
            properties = stream.property_names().len(),
            "Discovered stream"
        );
        streams.push(stream);
    }

    if streams.is_empty() {
        return Err(DiscoveryError::NoStreams);
    }
    Ok(StreamCatalog { streams })
}
