//! Integration tests for the wired system: the OpenAI-compatible provider
//! against a mock HTTP endpoint, and full turns against an on-disk store.

use chatloom::{
    ChatApp, ChatSession, CompletionProvider, LoggingConfig, Message, MessageStore, OpenAiProvider,
    ProviderConfig, ProviderError, Role, RunMetadata, Settings, SqliteMessageStore, StorageConfig,
    StreamEvent, SystemConfig, TurnError,
};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn settings_for(api_base: String) -> Settings {
    Settings {
        provider: ProviderConfig {
            model: "gpt-3.5-turbo".to_string(),
            max_tokens: 500,
            temperature: 0.7,
            api_base,
        },
        storage: StorageConfig {
            database_path: ":memory:".to_string(),
        },
        system: SystemConfig {
            channel_buffer_size: 100,
        },
        logging: LoggingConfig {
            level: "info".to_string(),
        },
    }
}

fn meta() -> RunMetadata {
    RunMetadata {
        thread_id: "test-thread".to_string(),
    }
}

#[tokio::test]
async fn provider_completes_against_mock_endpoint() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({"model": "gpt-3.5-turbo", "stream": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "Hi there"}}]
        })))
        .mount(&server)
        .await;

    let provider = OpenAiProvider::new("test-key".to_string(), settings_for(server.uri()));
    let reply = provider
        .complete(&[Message::user("Hello")], &meta())
        .await
        .unwrap();

    assert_eq!(reply.role, Role::Assistant);
    assert_eq!(reply.content, "Hi there");
}

#[tokio::test]
async fn provider_surfaces_api_errors() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&server)
        .await;

    let provider = OpenAiProvider::new("test-key".to_string(), settings_for(server.uri()));
    let err = provider
        .complete(&[Message::user("Hello")], &meta())
        .await
        .unwrap_err();

    match err {
        ProviderError::Api { status, body } => {
            assert_eq!(status, 429);
            assert_eq!(body, "rate limited");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn provider_streams_fragments_in_order() {
    let server = MockServer::start().await;

    let sse_body = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hi \"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"there\"}}]}\n\n",
        "data: [DONE]\n\n",
    );

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse_body, "text/event-stream"))
        .mount(&server)
        .await;

    let provider = OpenAiProvider::new("test-key".to_string(), settings_for(server.uri()));
    let mut stream = provider
        .stream(&[Message::user("Hello")], &meta())
        .await
        .unwrap();

    let mut fragments = Vec::new();
    loop {
        match stream.next().await {
            Some(StreamEvent::Fragment(f)) => fragments.push(f),
            Some(StreamEvent::Done) => break,
            Some(StreamEvent::Failed(e)) => panic!("stream failed: {e}"),
            None => panic!("stream closed without terminal event"),
        }
    }

    assert_eq!(fragments, vec!["Hi ", "there"]);
}

#[tokio::test]
async fn stream_without_done_marker_is_interrupted() {
    let server = MockServer::start().await;

    // Body ends mid-conversation: no [DONE] sentinel.
    let sse_body = "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n";

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse_body, "text/event-stream"))
        .mount(&server)
        .await;

    let provider = OpenAiProvider::new("test-key".to_string(), settings_for(server.uri()));
    let mut stream = provider
        .stream(&[Message::user("Hello")], &meta())
        .await
        .unwrap();

    let mut saw_interrupted = false;
    loop {
        match stream.next().await {
            Some(StreamEvent::Fragment(_)) => {}
            Some(StreamEvent::Failed(ProviderError::Interrupted)) => {
                saw_interrupted = true;
                break;
            }
            Some(other) => panic!("unexpected event: {other:?}"),
            None => break,
        }
    }
    assert!(saw_interrupted);
}

#[tokio::test]
async fn full_turn_persists_to_disk() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("chat.db");

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "Hi there"}}]
        })))
        .mount(&server)
        .await;

    let mut settings = settings_for(server.uri());
    settings.storage.database_path = db_path.to_string_lossy().to_string();

    let thread_id = {
        let app = ChatApp::from_settings(&settings, "test-key".to_string()).unwrap();
        let mut session = app.new_thread();
        let reply = app.send(&mut session, "Hello").await.unwrap();
        assert_eq!(reply.content, "Hi there");
        session.thread_id().to_string()
    };

    // Fresh store instance: the turn must have been durably committed.
    let store = Arc::new(SqliteMessageStore::open(&db_path).unwrap());
    let session = ChatSession::load(store.clone(), thread_id.clone()).await.unwrap();
    assert_eq!(
        session.history(),
        &[Message::user("Hello"), Message::assistant("Hi there")]
    );

    let threads = store.list_threads().await.unwrap();
    assert_eq!(threads, vec![thread_id]);
}

#[tokio::test]
async fn failed_turn_leaves_user_message_only() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("chat.db");

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let mut settings = settings_for(server.uri());
    settings.storage.database_path = db_path.to_string_lossy().to_string();

    let app = ChatApp::from_settings(&settings, "test-key".to_string()).unwrap();
    let mut session = app.new_thread();

    let err = app.send(&mut session, "Hello").await.unwrap_err();
    assert!(matches!(err, TurnError::Provider(_)));

    // The thread survives with the user message and no reply; a later
    // resume sees the same.
    let resumed = app.resume(session.thread_id().to_string()).await.unwrap();
    assert_eq!(resumed.history(), &[Message::user("Hello")]);
}

#[tokio::test]
async fn streamed_turn_round_trips_through_facade() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("chat.db");

    let sse_body = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hi \"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"there\"}}]}\n\n",
        "data: [DONE]\n\n",
    );

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse_body, "text/event-stream"))
        .mount(&server)
        .await;

    let mut settings = settings_for(server.uri());
    settings.storage.database_path = db_path.to_string_lossy().to_string();

    let app = ChatApp::from_settings(&settings, "test-key".to_string()).unwrap();
    let mut session = app.new_thread();

    let mut streamed = String::new();
    let reply = app
        .send_streaming(&mut session, "Hello", |f| streamed.push_str(f))
        .await
        .unwrap();

    assert_eq!(streamed, "Hi there");
    assert_eq!(reply.content, "Hi there");

    let resumed = app.resume(session.thread_id().to_string()).await.unwrap();
    assert_eq!(
        resumed.history(),
        &[Message::user("Hello"), Message::assistant("Hi there")]
    );
}
