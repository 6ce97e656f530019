//! The public `POST /chat` surface.
//!
//! Maps the request/response shape onto `DialogueRuntime::handle_message`.
//! The engine guarantees an answer for every accepted message; the only
//! client-visible failure is an empty `user_message`.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use guichet_agent::DialogueRuntime;
use guichet_core::errors::ApplicationError;
use guichet_core::UsageStats;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct ChatState {
    runtime: Arc<DialogueRuntime>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub user_message: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub assistant_message: String,
    pub conversation_id: String,
    pub usage: UsageStats,
}

#[derive(Debug, Serialize)]
pub struct ChatErrorResponse {
    pub error: String,
    pub correlation_id: String,
}

pub fn router(runtime: Arc<DialogueRuntime>) -> Router {
    Router::new().route("/chat", post(chat)).with_state(ChatState { runtime })
}

pub async fn spawn(
    bind_address: &str,
    port: u16,
    runtime: Arc<DialogueRuntime>,
) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.chat.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "chat endpoint started"
    );

    let app = router(runtime);
    tokio::spawn(async move {
        if let Err(listen_error) = axum::serve(listener, app).await {
            error!(
                event_name = "system.chat.terminated",
                error = %listen_error,
                "chat endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn chat(
    State(state): State<ChatState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, Json<ChatErrorResponse>)> {
    let correlation_id = Uuid::new_v4().to_string();
    let _ = request.metadata;

    match state
        .runtime
        .handle_message(&request.session_id, &request.user_message, request.conversation_id.as_deref())
        .await
    {
        Ok(outcome) => {
            info!(
                event_name = "interface.chat.answered",
                correlation_id = %correlation_id,
                conversation_id = %outcome.conversation_id.as_str(),
                total_tokens = outcome.usage.total_tokens,
                "chat request answered"
            );
            Ok(Json(ChatResponse {
                assistant_message: outcome.answer,
                conversation_id: outcome.conversation_id.as_str().to_string(),
                usage: outcome.usage,
            }))
        }
        Err(domain_error) => {
            warn!(
                event_name = "interface.chat.rejected",
                correlation_id = %correlation_id,
                error = %domain_error,
                "chat request rejected"
            );
            let interface = ApplicationError::from(domain_error).into_interface(&correlation_id);
            Err((
                StatusCode::BAD_REQUEST,
                Json(ChatErrorResponse {
                    error: interface.user_message().to_string(),
                    correlation_id,
                }),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{extract::State, http::StatusCode, Json};
    use guichet_agent::{
        DialogueRuntime, NoopLlmGateway, RetryPolicy, SessionRegistry, ToolDispatcher,
        TurnProcessor,
    };
    use guichet_core::DirectiveMarkers;
    use guichet_db::repositories::{InMemoryClaimRepository, InMemoryContractRepository};
    use serde_json::json;

    use super::{chat, ChatRequest, ChatState};

    fn state() -> ChatState {
        let dispatcher = Arc::new(ToolDispatcher::new(
            Arc::new(InMemoryContractRepository::default()),
            Arc::new(InMemoryClaimRepository::default()),
        ));
        let processor = TurnProcessor::new(
            Arc::new(NoopLlmGateway),
            dispatcher,
            "prompt de test".to_string(),
            DirectiveMarkers::default(),
            RetryPolicy::default(),
            10,
        );
        ChatState {
            runtime: Arc::new(DialogueRuntime::new(Arc::new(SessionRegistry::new()), processor)),
        }
    }

    fn request(message: &str, conversation_id: Option<String>) -> ChatRequest {
        ChatRequest {
            session_id: "http_session_1".to_string(),
            user_message: message.to_string(),
            conversation_id,
            metadata: Some(json!({ "channel": "test" })),
        }
    }

    #[tokio::test]
    async fn chat_answers_and_mints_a_conversation_id() {
        let Json(response) = chat(State(state()), Json(request("Bonjour", None)))
            .await
            .expect("chat answers");

        assert!(!response.assistant_message.is_empty());
        assert!(response.conversation_id.starts_with("conv_http_session_1_"));
        assert_eq!(response.usage.total_tokens, 0);
    }

    #[tokio::test]
    async fn chat_reuses_a_known_conversation_id() {
        let shared = state();

        let Json(first) = chat(State(shared.clone()), Json(request("Bonjour", None)))
            .await
            .expect("first turn");
        let Json(second) = chat(
            State(shared),
            Json(request("Et ensuite?", Some(first.conversation_id.clone()))),
        )
        .await
        .expect("second turn");

        assert_eq!(second.conversation_id, first.conversation_id);
    }

    #[tokio::test]
    async fn empty_message_is_a_bad_request_with_a_safe_body() {
        let (status, Json(body)) = chat(State(state()), Json(request("   ", None)))
            .await
            .expect_err("empty message rejected");

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.error.contains("Votre demande"));
        assert!(!body.correlation_id.is_empty());
    }
}
