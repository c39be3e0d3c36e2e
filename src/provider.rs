// src/provider.rs
use crate::error::ConnectError;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Vec<Value>,
}

/// JSON-RPC client bound to the configured fullnode. Published together with
/// the winning signer.
#[derive(Debug, Clone)]
pub struct NetworkProvider {
    endpoint: String,
    client: Client,
    request_id: Arc<AtomicU64>,
}

impl PartialEq for NetworkProvider {
    fn eq(&self, other: &Self) -> bool {
        self.endpoint == other.endpoint
    }
}

impl NetworkProvider {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: Client::new(),
            request_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Raw JSON-RPC call, returning the `result` member.
    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, ConnectError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.request_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ConnectError::Rpc(format!("{} returned {}", method, response.status())));
        }

        let mut json: Value = response.json().await?;
        extract_result(method, &mut json)
    }

    pub async fn chain_identifier(&self) -> Result<String, ConnectError> {
        let result = self.call("sui_getChainIdentifier", vec![]).await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ConnectError::Rpc(format!("Invalid chain identifier response: {}", result)))
    }

    pub async fn reference_gas_price(&self) -> Result<u64, ConnectError> {
        let result = self.call("suix_getReferenceGasPrice", vec![]).await?;
        // fullnodes return u64 values as strings
        match &result {
            Value::String(s) => s.parse().map_err(|e| ConnectError::Rpc(format!("Invalid gas price {}: {}", s, e))),
            Value::Number(n) => n
                .as_u64()
                .ok_or_else(|| ConnectError::Rpc(format!("Invalid gas price {}", n))),
            other => Err(ConnectError::Rpc(format!("Invalid gas price response: {}", other))),
        }
    }
}

fn extract_result(method: &str, json: &mut Value) -> Result<Value, ConnectError> {
    if let Some(error) = json.get("error") {
        return Err(ConnectError::Rpc(format!("{} failed: {}", method, error)));
    }
    match json.get_mut("result") {
        Some(result) => Ok(result.take()),
        None => Err(ConnectError::Rpc(format!("{} returned no result: {}", method, json))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_result() {
        let mut ok = json!({ "jsonrpc": "2.0", "id": 1, "result": "35834a8a" });
        assert_eq!(extract_result("sui_getChainIdentifier", &mut ok).unwrap(), json!("35834a8a"));

        let mut failed = json!({ "jsonrpc": "2.0", "id": 1, "error": { "code": -32601, "message": "nope" } });
        assert!(matches!(extract_result("x", &mut failed), Err(ConnectError::Rpc(_))));

        let mut empty = json!({ "jsonrpc": "2.0", "id": 1 });
        assert!(extract_result("x", &mut empty).is_err());
    }

    #[test]
    fn test_provider_equality_by_endpoint() {
        let a = NetworkProvider::new("https://fullnode.devnet.sui.io/");
        let b = NetworkProvider::new("https://fullnode.devnet.sui.io/");
        assert_eq!(a, b);
        assert_eq!(a.endpoint(), "https://fullnode.devnet.sui.io/");
    }
}
