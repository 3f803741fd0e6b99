// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Read access to the ledger over its JSON-RPC interface

use crate::error::LedgerError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicU64, Ordering},
};
use tracing::debug;
use url::Url;

// JSON-RPC method names
const GET_LATEST_SYSTEM_STATE_METHOD: &str = "suix_getLatestSuiSystemState";
const GET_OBJECT_METHOD: &str = "sui_getObject";

// Object error codes that mean the object is gone for good
const OBJECT_NOT_EXISTS_CODE: &str = "notExists";
const OBJECT_DELETED_CODE: &str = "deleted";

const MOVE_OBJECT_DATA_TYPE: &str = "moveObject";

/// The ledger reads needed by the login flow and the state poller
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Returns the ledger's current epoch
    async fn current_epoch(&self) -> Result<u64, LedgerError>;

    /// Fetches an object with its content. Missing or deleted objects yield
    /// `LedgerError::NotFound`.
    async fn get_object(&self, object_id: &str) -> Result<ObjectMetadata, LedgerError>;
}

/// A fetched ledger object
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMetadata {
    pub object_id: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub digest: Option<String>,
    #[serde(default)]
    pub content: Option<ObjectContent>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectContent {
    pub data_type: String,
    #[serde(rename = "type", default)]
    pub object_type: Option<String>,
    #[serde(default)]
    pub fields: Value,
}

impl ObjectMetadata {
    /// Flattens the site metadata `VecMap<String, String>` stored under
    /// `content.fields.value.fields.metadata` into a map. Objects that are
    /// not Move objects, or carry no metadata, yield an empty map.
    pub fn metadata_map(&self) -> BTreeMap<String, String> {
        let Some(content) = self
            .content
            .as_ref()
            .filter(|content| content.data_type == MOVE_OBJECT_DATA_TYPE)
        else {
            return BTreeMap::new();
        };

        content
            .fields
            .pointer("/value/fields/metadata/fields/contents")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| {
                        let fields = entry.get("fields")?;
                        let key = fields.get("key")?.as_str()?;
                        let value = fields.get("value")?.as_str()?;
                        Some((key.to_owned(), value.to_owned()))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns a single metadata value
    pub fn metadata_value(&self, key: &str) -> Option<String> {
        self.metadata_map().remove(key)
    }
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: Value,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct SystemStateSummary {
    epoch: String,
}

#[derive(Debug, Deserialize)]
struct ObjectResponse {
    #[serde(default)]
    data: Option<ObjectMetadata>,
    #[serde(default)]
    error: Option<ObjectResponseError>,
}

#[derive(Debug, Deserialize)]
struct ObjectResponseError {
    code: String,
    #[serde(default)]
    error: Option<String>,
}

/// A `LedgerClient` talking to a full node's JSON-RPC endpoint
#[derive(Debug)]
pub struct SuiJsonRpcClient {
    client: Client,
    rpc_url: Url,
    next_request_id: AtomicU64,
}

impl SuiJsonRpcClient {
    pub fn new(client: Client, rpc_url: Url) -> Self {
        Self {
            client,
            rpc_url,
            next_request_id: AtomicU64::new(1),
        }
    }

    pub fn rpc_url(&self) -> &Url {
        &self.rpc_url
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, LedgerError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.next_request_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        debug!(method = method, id = request.id, "Sending JSON-RPC request");

        let response = self
            .client
            .post(self.rpc_url.clone())
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LedgerError::Transport(format!(
                "{} responded with status {}",
                method, status
            )));
        }

        let response: JsonRpcResponse = response.json().await?;
        if let Some(error) = response.error {
            let code = match error.code {
                Value::String(code) => code,
                code => code.to_string(),
            };
            return Err(LedgerError::Rpc {
                code,
                message: error.message,
            });
        }
        response
            .result
            .ok_or_else(|| LedgerError::Decode(format!("{} returned no result", method)))
    }
}

#[async_trait]
impl LedgerClient for SuiJsonRpcClient {
    async fn current_epoch(&self) -> Result<u64, LedgerError> {
        let result = self
            .call(GET_LATEST_SYSTEM_STATE_METHOD, json!([]))
            .await?;
        let summary: SystemStateSummary = serde_json::from_value(result)
            .map_err(|error| LedgerError::Decode(error.to_string()))?;
        summary.epoch.parse().map_err(|error| {
            LedgerError::Decode(format!("invalid epoch '{}': {}", summary.epoch, error))
        })
    }

    async fn get_object(&self, object_id: &str) -> Result<ObjectMetadata, LedgerError> {
        let result = self
            .call(GET_OBJECT_METHOD, json!([object_id, { "showContent": true }]))
            .await?;
        let response: ObjectResponse = serde_json::from_value(result)
            .map_err(|error| LedgerError::Decode(error.to_string()))?;

        match (response.data, response.error) {
            (Some(data), _) => Ok(data),
            (None, Some(error))
                if error.code == OBJECT_NOT_EXISTS_CODE || error.code == OBJECT_DELETED_CODE =>
            {
                Err(LedgerError::NotFound(object_id.to_owned()))
            },
            (None, Some(error)) => Err(LedgerError::Rpc {
                code: error.code,
                message: error.error.unwrap_or_default(),
            }),
            (None, None) => Err(LedgerError::Decode(format!(
                "object {} response carries neither data nor error",
                object_id
            ))),
        }
    }
}
