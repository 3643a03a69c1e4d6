//! Astra DB Data API vector search.
//!
//! Issues a `find` command sorted by `$vector` against a collection and maps
//! each returned document onto an [`IndexMatch`]. Astra reports
//! `$similarity` already normalized to `[0, 1]` for cosine collections.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::config::VectorStoreConfig;
use crate::error::AdapterError;

use super::{IndexMatch, VectorIndex};

pub struct AstraIndex {
    endpoint: String,
    token: String,
    client: reqwest::Client,
}

impl AstraIndex {
    pub fn new(config: &VectorStoreConfig, db_id: &str, token: &str) -> Result<Self> {
        let endpoint = format!(
            "https://{}-{}.apps.astra.datastax.com/api/json/v1/{}/{}",
            db_id, config.region, config.keyspace, config.collection
        );
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            endpoint,
            token: token.to_string(),
            client,
        })
    }
}

#[async_trait]
impl VectorIndex for AstraIndex {
    fn name(&self) -> &str {
        "astra"
    }

    fn is_live(&self) -> bool {
        true
    }

    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<IndexMatch>, AdapterError> {
        let body = serde_json::json!({
            "find": {
                "sort": { "$vector": vector },
                "projection": { "$vector": 0 },
                "options": { "limit": top_k, "includeSimilarity": true }
            }
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("Token", &self.token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(AdapterError::from_status("Astra", status.as_u16(), &body_text));
        }

        let json: Value = response.json().await?;
        parse_find_response(&json, top_k)
    }
}

fn parse_find_response(json: &Value, top_k: usize) -> Result<Vec<IndexMatch>, AdapterError> {
    if let Some(errors) = json.get("errors").and_then(|e| e.as_array()) {
        if let Some(first) = errors.first() {
            let message = first
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown error");
            return Err(AdapterError::Rejected(format!("Astra: {}", message)));
        }
    }

    let documents = json
        .pointer("/data/documents")
        .and_then(|d| d.as_array())
        .ok_or_else(|| AdapterError::Malformed("Astra response missing data.documents".into()))?;

    let mut matches = Vec::with_capacity(documents.len().min(top_k));
    for doc in documents.iter().take(top_k) {
        let chunk_id = match doc.get("_id") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => return Err(AdapterError::Malformed("Astra document missing _id".into())),
        };
        let text = ["content", "text", "page_content", "body_blob"]
            .iter()
            .find_map(|k| doc.get(*k).and_then(|v| v.as_str()))
            .unwrap_or_default()
            .to_string();
        let metadata = doc.get("metadata");
        let url = metadata
            .and_then(|m| m.get("source").or_else(|| m.get("url")))
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let document_id = metadata
            .and_then(|m| m.get("document_id"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| url.clone())
            .unwrap_or_else(|| chunk_id.clone());
        let score = doc
            .get("$similarity")
            .and_then(|s| s.as_f64())
            .unwrap_or(0.0);

        matches.push(IndexMatch {
            chunk_id,
            document_id,
            score,
            text,
            url,
        });
    }
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_find_response() {
        let json = serde_json::json!({
            "data": { "documents": [
                { "_id": "a1", "$similarity": 0.91, "content": "memory types",
                  "metadata": { "source": "https://example.com/agent" } },
                { "_id": 7, "$similarity": 0.5, "text": "planning" }
            ]}
        });
        let matches = parse_find_response(&json, 5).unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].chunk_id, "a1");
        assert_eq!(matches[0].url.as_deref(), Some("https://example.com/agent"));
        assert_eq!(matches[0].document_id, "https://example.com/agent");
        assert_eq!(matches[1].chunk_id, "7");
        assert_eq!(matches[1].text, "planning");
    }

    #[test]
    fn test_parse_find_truncates() {
        let json = serde_json::json!({
            "data": { "documents": [
                { "_id": "a", "$similarity": 0.9 },
                { "_id": "b", "$similarity": 0.8 },
                { "_id": "c", "$similarity": 0.7 }
            ]}
        });
        assert_eq!(parse_find_response(&json, 2).unwrap().len(), 2);
    }

    #[test]
    fn test_parse_find_errors() {
        let json = serde_json::json!({ "errors": [{ "message": "collection not found" }] });
        assert!(matches!(
            parse_find_response(&json, 5),
            Err(AdapterError::Rejected(_))
        ));
        let malformed = serde_json::json!({ "status": {} });
        assert!(matches!(
            parse_find_response(&malformed, 5),
            Err(AdapterError::Malformed(_))
        ));
    }

    #[test]
    fn test_endpoint_shape() {
        let index = AstraIndex::new(
            &VectorStoreConfig::default(),
            "8f1b2c3d-4e5f-4a6b-8c7d-9e0f1a2b3c4d",
            "AstraCS:x",
        )
        .unwrap();
        assert_eq!(
            index.endpoint,
            "https://8f1b2c3d-4e5f-4a6b-8c7d-9e0f1a2b3c4d-us-east1.apps.astra.datastax.com\
             /api/json/v1/default_keyspace/intelligent_knowledge_base"
        );
    }
}
