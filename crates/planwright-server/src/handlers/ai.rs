use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{Map, Value};

use planwright_engine::{ChatReply, ChatRequest, GeneratedDocument, GenerationContext, GenerationStatus, SuggestionSet};

use super::{require, session_id};
use crate::error::{ApiError, ApiResponse, ApiResult};
use crate::server::AppState;

pub async fn chat(
    State(state): State<AppState>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<ChatReply> {
    let Json(request) = body?;
    require("agentId", &request.agent_id)?;
    require("phase", &request.phase)?;
    require("message", &request.message)?;
    if let Some(id) = &request.session_id {
        let _ = session_id(id.to_string())?;
    }
    Ok(ApiResponse::ok(state.assembler.chat(request).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateTemplateBody {
    #[serde(default)]
    pub template_name: String,
    #[serde(default)]
    pub agent_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub context: GenerationContext,
}

pub async fn generate_template(
    State(state): State<AppState>,
    body: Result<Json<GenerateTemplateBody>, JsonRejection>,
) -> ApiResult<GeneratedDocument> {
    let Json(body) = body?;
    require("templateName", &body.template_name)?;
    require("agentId", &body.agent_id)?;
    let Some(raw_id) = body.session_id else {
        return Err(ApiError::validation("sessionId is required"));
    };
    let id = session_id(raw_id)?;

    let document = state
        .assembler
        .generate_document(&body.template_name, &body.agent_id, Some(&id), body.context)
        .await?;
    Ok(ApiResponse::ok(document))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionsBody {
    #[serde(default)]
    pub agent_id: String,
    #[serde(default)]
    pub phase: String,
    #[serde(default)]
    pub current_data: Map<String, Value>,
}

pub async fn suggestions(
    State(state): State<AppState>,
    body: Result<Json<SuggestionsBody>, JsonRejection>,
) -> ApiResult<SuggestionSet> {
    let Json(body) = body?;
    require("agentId", &body.agent_id)?;
    require("phase", &body.phase)?;
    let set = state
        .assembler
        .suggestions(&body.agent_id, &body.phase, &body.current_data)
        .await?;
    Ok(ApiResponse::ok(set))
}

pub async fn status(State(state): State<AppState>) -> ApiResult<GenerationStatus> {
    Ok(ApiResponse::ok(state.assembler.status()))
}

#[cfg(test)]
mod tests {
    use crate::server::test_support::*;
    use axum::http::StatusCode;
    use planwright_core::errors::GatewayError;
    use planwright_llm::{MockGateway, MockResponse};
    use serde_json::json;

    async fn session(app: &TestApp, name: &str) -> String {
        let (_, body) = send(app.router(), "POST", "/api/sessions", Some(json!({"projectName": name}))).await;
        body["data"]["id"].as_str().unwrap().to_owned()
    }

    #[tokio::test]
    async fn chat_returns_reply() {
        let app = app_with(MockGateway::new(vec![MockResponse::text("Hello from the analyst")]));
        let (status, body) = send(
            app.router(),
            "POST",
            "/api/ai/chat",
            Some(json!({
                "agentId": "analyst",
                "phase": "analyst",
                "message": "Where do we start?",
                "context": {"projectName": "Acme", "chatHistory": [{"type": "user", "content": "hi"}]}
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["response"], "Hello from the analyst");
        assert_eq!(body["data"]["agentId"], "analyst");
        let prompt = app.gateway.last_prompt().unwrap();
        assert!(prompt.contains("Where do we start?"));
        assert!(prompt.contains("You are the analyst."));
    }

    #[tokio::test]
    async fn chat_without_message_is_rejected_before_generation() {
        let app = app();
        let (status, _) = send(
            app.router(),
            "POST",
            "/api/ai/chat",
            Some(json!({"agentId": "analyst", "phase": "analyst", "message": " "})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(app.gateway.call_count(), 0);
    }

    #[tokio::test]
    async fn unready_gateway_is_503() {
        let app = app_with(MockGateway::unready());
        let (status, body) = send(
            app.router(),
            "POST",
            "/api/ai/chat",
            Some(json!({"agentId": "analyst", "phase": "analyst", "message": "hi"})),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"]["code"], "GENERATION_UNAVAILABLE");

        let (status, body) = send(app.router(), "GET", "/api/ai/status", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["ready"], false);
        assert_eq!(body["data"]["provider"], "mock");
    }

    #[tokio::test]
    async fn gateway_failure_is_502() {
        let app = app_with(MockGateway::new(vec![MockResponse::Error(GatewayError::ServerError {
            status: 500,
            body: "boom".into(),
        })]));
        let (status, body) = send(
            app.router(),
            "POST",
            "/api/ai/chat",
            Some(json!({"agentId": "analyst", "phase": "analyst", "message": "hi"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"]["code"], "UPSTREAM_ERROR");
    }

    #[tokio::test]
    async fn generate_template_saves_artifact() {
        let app = app_with(MockGateway::always("# Acme Brief\nBody"));
        let id = session(&app, "Acme Widget").await;
        let (status, body) = send(
            app.router(),
            "POST",
            "/api/ai/generate-template",
            Some(json!({
                "templateName": "project-brief",
                "agentId": "analyst",
                "sessionId": id,
                "context": {"phase": "analyst", "summary": "widgets"}
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["content"], "# Acme Brief\nBody");
        assert_eq!(body["data"]["savedFile"]["filename"], "acme-widget-project-brief.md");

        let prompt = app.gateway.last_prompt().unwrap();
        assert!(prompt.contains("\"summary\": \"widgets\""));
        assert!(prompt.contains("\"projectName\": \"Acme Widget\""));

        let (_, body) = send(app.router(), "GET", &format!("/api/sessions/{id}"), None).await;
        assert_eq!(body["data"]["generatedFiles"], json!(["acme-widget-project-brief.md"]));
    }

    #[tokio::test]
    async fn generate_template_requires_session() {
        let app = app();
        let (status, body) = send(
            app.router(),
            "POST",
            "/api/ai/generate-template",
            Some(json!({"templateName": "project-brief", "agentId": "analyst"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "sessionId is required");
    }

    #[tokio::test]
    async fn unknown_template_is_404() {
        let app = app();
        let id = session(&app, "Acme").await;
        let (status, _) = send(
            app.router(),
            "POST",
            "/api/ai/generate-template",
            Some(json!({"templateName": "nope", "agentId": "analyst", "sessionId": id})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(app.gateway.call_count(), 0);
    }

    #[tokio::test]
    async fn suggestions_parse_and_degrade() {
        let app = app_with(MockGateway::new(vec![
            MockResponse::text(r#"```json
[{"title": "Define users", "description": "List personas", "priority": "high"}]
```"#),
            MockResponse::Error(GatewayError::RateLimited { retry_after: None }),
        ]));
        let body = json!({"agentId": "analyst", "phase": "analyst", "currentData": {"summary": "x"}});

        let (status, resp) = send(app.router(), "POST", "/api/ai/suggestions", Some(body.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resp["data"]["suggestions"][0]["title"], "Define users");
        assert_eq!(resp["data"]["suggestions"][0]["priority"], "high");

        let (status, resp) = send(app.router(), "POST", "/api/ai/suggestions", Some(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resp["data"]["suggestions"].as_array().unwrap().len(), 1);
        assert_eq!(resp["data"]["suggestions"][0]["title"], "AI Guidance");
    }
}
