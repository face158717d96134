//! Wire-level tests for the OpenAI-compatible provider against a mock HTTP
//! server.

use futures::StreamExt;
use httpmock::prelude::*;
use plan_rag::{ChatMessage, ChatModel, Embedder, OpenAiProvider, ProviderConfig, RetrievalError};
use serde_json::json;

fn provider_for(server: &MockServer) -> OpenAiProvider {
    OpenAiProvider::new(
        ProviderConfig::new(server.url("/v1"), "test-key")
            .with_embedding_model("test-embed")
            .with_chat_model("test-chat"),
    )
    .unwrap()
}

#[tokio::test]
async fn embed_posts_model_and_input_and_parses_vector() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/embeddings")
                .header("authorization", "Bearer test-key")
                .json_body(json!({ "model": "test-embed", "input": "hello world" }));
            then.status(200)
                .json_body(json!({ "data": [{ "embedding": [0.1, 0.2, 0.3] }] }));
        })
        .await;

    let provider = provider_for(&server);
    let vector = provider.embed("hello world").await.unwrap();

    mock.assert_async().await;
    assert_eq!(vector, vec![0.1, 0.2, 0.3]);
    assert_eq!(provider.model_id(), "test-embed");
}

#[tokio::test]
async fn embed_batch_preserves_input_order() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/embeddings")
                .json_body_partial(r#"{ "input": "alpha" }"#);
            then.status(200).json_body(json!({ "data": [{ "embedding": [1.0, 0.0] }] }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/embeddings")
                .json_body_partial(r#"{ "input": "beta" }"#);
            then.status(200).json_body(json!({ "data": [{ "embedding": [0.0, 1.0] }] }));
        })
        .await;

    let provider = provider_for(&server);
    let matrix =
        provider.embed_batch(&["alpha".to_string(), "beta".to_string()]).await.unwrap();

    assert_eq!(matrix.rows(), 2);
    assert_eq!(matrix.dim(), 2);
    assert_eq!(matrix.row(0), &[1.0, 0.0]);
    assert_eq!(matrix.row(1), &[0.0, 1.0]);
}

#[tokio::test]
async fn embed_surfaces_api_error_message() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/embeddings");
            then.status(500)
                .json_body(json!({ "error": { "message": "model overloaded" } }));
        })
        .await;

    let provider = provider_for(&server);
    let err = provider.embed("hello").await.unwrap_err();

    match err {
        RetrievalError::Provider { message, .. } => {
            assert!(message.contains("500"));
            assert!(message.contains("model overloaded"));
        }
        other => panic!("expected provider error, got {other:?}"),
    }
}

#[tokio::test]
async fn embed_rejects_empty_data_array() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/embeddings");
            then.status(200).json_body(json!({ "data": [] }));
        })
        .await;

    let provider = provider_for(&server);
    assert!(provider.embed("hello").await.is_err());
}

#[tokio::test]
async fn generate_text_returns_first_choice_content() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .header("authorization", "Bearer test-key")
                .json_body_partial(r#"{ "model": "test-chat", "stream": false }"#);
            then.status(200).json_body(json!({
                "choices": [
                    { "message": { "role": "assistant", "content": "审核通过" } }
                ]
            }));
        })
        .await;

    let provider = provider_for(&server);
    let messages =
        vec![ChatMessage::system("你是审核助手"), ChatMessage::user("请审核该方案")];
    let reply = provider.generate_text(&messages, 0.3).await.unwrap();

    mock.assert_async().await;
    assert_eq!(reply, "审核通过");
}

#[tokio::test]
async fn stream_yields_tokens_until_done_sentinel() {
    let server = MockServer::start_async().await;
    let body = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"施工\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"方案\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{}}]}\n\n",
        "data: [DONE]\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
    );
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .json_body_partial(r#"{ "stream": true }"#);
            then.status(200).header("content-type", "text/event-stream").body(body);
        })
        .await;

    let provider = provider_for(&server);
    let stream = provider.generate_text_stream(&[ChatMessage::user("审核")], 0.3).await;
    let tokens: Vec<String> = stream.collect().await;

    assert_eq!(tokens, vec!["施工".to_string(), "方案".to_string()]);
}

#[tokio::test]
async fn stream_failure_becomes_single_terminal_token() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(500)
                .json_body(json!({ "error": { "message": "backend unavailable" } }));
        })
        .await;

    let provider = provider_for(&server);
    let stream = provider.generate_text_stream(&[ChatMessage::user("审核")], 0.3).await;
    let tokens: Vec<String> = stream.collect().await;

    assert_eq!(tokens.len(), 1);
    assert!(tokens[0].starts_with("模型调用失败"));
    assert!(tokens[0].contains("backend unavailable"));
}

#[tokio::test]
async fn stream_request_to_unreachable_server_yields_terminal_token() {
    // Port 1 is never bound; the connection is refused immediately.
    let provider =
        OpenAiProvider::new(ProviderConfig::new("http://127.0.0.1:1/v1", "test-key")).unwrap();
    let stream = provider.generate_text_stream(&[ChatMessage::user("审核")], 0.3).await;
    let tokens: Vec<String> = stream.collect().await;

    assert_eq!(tokens.len(), 1);
    assert!(tokens[0].starts_with("模型调用失败"));
}
