//! Common test utilities

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use docchat_agents::testing::{HashingEmbedder, MemoryIndex, ScriptedModel};
use docchat_agents::{ChainConfig, ConversationalChain, VectorIndex, DEFAULT_NAMESPACE};
use docchat_core::chunk::content_hash;
use docchat_core::{EmbeddingRecord, PassageMetadata};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

/// Router over an in-memory index seeded with `passages`
pub async fn test_app(llm: ScriptedModel, passages: &[&str]) -> Router {
    let embedder = Arc::new(HashingEmbedder::default());
    let index = Arc::new(MemoryIndex::new());

    let records = passages
        .iter()
        .enumerate()
        .map(|(i, text)| EmbeddingRecord {
            namespace: DEFAULT_NAMESPACE.to_string(),
            vector: embedder.vector(text),
            text: text.to_string(),
            metadata: PassageMetadata {
                source: "facts.pdf".into(),
                document_id: "doc-1".into(),
                chunk_index: i,
                start_offset: 0,
                end_offset: text.chars().count(),
                content_hash: content_hash(text),
            },
        })
        .collect();
    index
        .upsert(DEFAULT_NAMESPACE, records)
        .await
        .expect("seed index");

    let chain = ConversationalChain::new(embedder, index, Arc::new(llm), ChainConfig::default());
    docchat_server::router(Arc::new(chain))
}

/// Router whose vector index fails every call with `message`
pub fn failing_index_app(llm: ScriptedModel, message: &str) -> Router {
    let chain = ConversationalChain::new(
        Arc::new(HashingEmbedder::default()),
        Arc::new(MemoryIndex::failing(message)),
        Arc::new(llm),
        ChainConfig::default(),
    );
    docchat_server::router(Arc::new(chain))
}

/// Send a request and decode the JSON body (Null when empty)
pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.expect("request failed");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, body)
}

pub fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("build request")
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build request")
}
