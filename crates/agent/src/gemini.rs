//! Gemini `generateContent` REST client behind [`LlmGateway`].
//!
//! The wire format is the v1beta API: `contents` with `user` / `model` /
//! `function` roles, camelCase part keys (`functionCall`,
//! `functionResponse`), `systemInstruction`, and
//! `tools[].functionDeclarations`. Responses are read from
//! `candidates[0].content.parts`; the first `functionCall` part wins,
//! otherwise text parts are concatenated.

use std::time::Duration;

use async_trait::async_trait;
use guichet_core::config::GatewayConfig;
use guichet_core::{ToolCall, Turn, UsageStats};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::gateway::{Completion, GatewayError, LlmGateway, ToolSchema};

const ROLE_USER: &str = "user";
const ROLE_MODEL: &str = "model";
const ROLE_FUNCTION: &str = "function";

pub struct GeminiGateway {
    client: Client,
    base_url: String,
    model: String,
    api_key: SecretString,
}

impl GeminiGateway {
    /// Build the client from validated configuration.
    ///
    /// A missing API key is a configuration error here so that bootstrap
    /// fails fast instead of every turn failing later.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            GatewayError::Configuration(
                "gateway.api_key is required for the gemini provider".to_string(),
            )
        })?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| {
                GatewayError::Configuration(format!("could not build the http client: {error}"))
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }

    // The key rides in the query string, so this URL must never be logged.
    fn request_url(&self) -> String {
        format!(
            "{base}/models/{model}:generateContent?key={key}",
            base = self.base_url,
            model = self.model,
            key = self.api_key.expose_secret(),
        )
    }
}

#[async_trait]
impl LlmGateway for GeminiGateway {
    async fn generate(
        &self,
        history: &[Turn],
        system_instruction: &str,
        tools: &[ToolSchema],
    ) -> Result<Completion, GatewayError> {
        let request = build_request(history, system_instruction, tools);
        debug!(
            event_name = "gateway.gemini.request",
            model = %self.model,
            contents = request.contents.len(),
            "sending generateContent request"
        );

        let response = self
            .client
            .post(self.request_url())
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_from_status(status.as_u16(), &body));
        }

        let decoded: GenerateContentResponse =
            response.json().await.map_err(|error| GatewayError::Decode(error.to_string()))?;

        Ok(completion_from_response(decoded))
    }
}

fn transport_error(error: reqwest::Error) -> GatewayError {
    if error.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Connect(error.to_string())
    }
}

fn error_from_status(status: u16, body: &str) -> GatewayError {
    match status {
        429 => GatewayError::RateLimited,
        500..=599 => GatewayError::Server { status },
        _ => GatewayError::Rejected { status, detail: body.trim().to_string() },
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolDeclarations>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

/// One content part. Untagged: the discriminating wire key is the payload
/// field itself, so `functionCall` must be tried before plain text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
enum Part {
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: FunctionCallPayload,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: FunctionResponsePayload,
    },
    Text {
        text: String,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct FunctionCallPayload {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct FunctionResponsePayload {
    name: String,
    response: Value,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<TextPart>,
}

#[derive(Debug, Serialize)]
struct TextPart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolDeclarations {
    function_declarations: Vec<ToolSchema>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: UsageMetadata,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Default, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
    #[serde(default)]
    total_token_count: u64,
}

fn build_request(
    history: &[Turn],
    system_instruction: &str,
    tools: &[ToolSchema],
) -> GenerateContentRequest {
    let system_instruction = (!system_instruction.trim().is_empty()).then(|| SystemInstruction {
        parts: vec![TextPart { text: system_instruction.to_string() }],
    });
    let tools = if tools.is_empty() {
        Vec::new()
    } else {
        vec![ToolDeclarations { function_declarations: tools.to_vec() }]
    };

    GenerateContentRequest { contents: contents_from_history(history), system_instruction, tools }
}

fn contents_from_history(history: &[Turn]) -> Vec<Content> {
    history
        .iter()
        .map(|turn| match turn {
            Turn::User(text) => Content {
                role: ROLE_USER.to_string(),
                parts: vec![Part::Text { text: text.clone() }],
            },
            Turn::Model(text) => Content {
                role: ROLE_MODEL.to_string(),
                parts: vec![Part::Text { text: text.clone() }],
            },
            Turn::ToolRequest(call) => Content {
                role: ROLE_MODEL.to_string(),
                parts: vec![Part::FunctionCall {
                    function_call: FunctionCallPayload {
                        name: call.name.clone(),
                        args: call.arguments.clone(),
                    },
                }],
            },
            Turn::ToolResult(result) => Content {
                role: ROLE_FUNCTION.to_string(),
                parts: vec![Part::FunctionResponse {
                    function_response: FunctionResponsePayload {
                        name: result.name.clone(),
                        response: result.payload.clone(),
                    },
                }],
            },
        })
        .collect()
}

fn completion_from_response(response: GenerateContentResponse) -> Completion {
    let usage = UsageStats::new(
        response.usage_metadata.prompt_token_count,
        response.usage_metadata.candidates_token_count,
        response.usage_metadata.total_token_count,
    );

    let parts = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| content.parts)
        .unwrap_or_default();

    for part in &parts {
        if let Part::FunctionCall { function_call } = part {
            return Completion::tool_call(
                ToolCall::new(function_call.name.clone(), function_call.args.clone()),
                usage,
            );
        }
    }

    let text: String = parts
        .iter()
        .filter_map(|part| match part {
            Part::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();

    Completion::text(text, usage)
}
