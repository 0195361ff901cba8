//! Provider integration tests: real API calls.
//!
//! These tests are skipped when the corresponding API key env var is not set.
//! Run with: `cargo test -p callrelay-providers --test integration`

use callrelay_core::types::Message;
use callrelay_providers::openai::OpenAiProvider;
use callrelay_providers::{CompletionRequest, Credentials, LlmProvider};

fn openai_key() -> Option<String> {
    std::env::var("OPENAI_API_KEY")
        .ok()
        .filter(|k| !k.is_empty())
}

#[tokio::test]
async fn test_openai_completion() {
    let Some(api_key) = openai_key() else {
        eprintln!("Skipping: OPENAI_API_KEY not set");
        return;
    };

    let provider = OpenAiProvider::openai(None);
    let credentials = Credentials::ApiKey { api_key };
    let request = CompletionRequest {
        model: "gpt-4o-mini".into(),
        messages: vec![
            Message::system("You are a helpful assistant. Follow instructions exactly."),
            Message::user("Reply with exactly the word 'hello'."),
        ],
        max_tokens: 20,
        temperature: Some(0.0),
    };

    let completion = provider.complete(&request, &credentials).await;
    assert!(completion.is_ok(), "Completion failed: {:?}", completion.err());
    let text = completion.unwrap().text;
    assert!(
        text.to_lowercase().contains("hello"),
        "Expected 'hello' in response, got: {text}"
    );
}

#[tokio::test]
async fn test_openai_model_list() {
    let Some(api_key) = openai_key() else {
        eprintln!("Skipping: OPENAI_API_KEY not set");
        return;
    };

    let provider = OpenAiProvider::openai(None);
    let credentials = Credentials::ApiKey { api_key };

    let models = provider.list_models(&credentials).await;
    assert!(models.is_ok(), "Model list failed: {:?}", models.err());
    assert!(!models.unwrap().is_empty(), "No models returned");
}
