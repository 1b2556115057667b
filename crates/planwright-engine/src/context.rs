//! Prompt assembly for agent chat, template filling and suggestions.
//!
//! Every prompt that carries a session id is grounded in that session's
//! generated documents, inlined in full in the Document Store's listing order.

use std::fmt::Write as _;
use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use planwright_core::errors::GatewayError;
use planwright_core::generation::GenerationGateway;
use planwright_core::ids::SessionId;
use planwright_store::{ArtifactDescriptor, ArtifactMetadata, DocumentStore, SessionDocument};

use crate::error::EngineError;
use crate::library::AssetLibrary;
use crate::naming;
use crate::phases::SessionService;

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"```json\n?|\n?```").unwrap());

const SUGGESTION_FALLBACK_TITLE: &str = "AI Guidance";

// ── Request and response types ──

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Ai,
    #[serde(other)]
    Other,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(rename = "type")]
    pub role: ChatRole,
    pub content: String,
}

/// Client-supplied conversation state for a chat turn.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatContext {
    pub project_name: Option<String>,
    pub project_brief: Option<String>,
    pub previous_phases: Option<Value>,
    pub chat_history: Vec<ChatMessage>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub agent_id: String,
    pub phase: String,
    pub message: String,
    #[serde(default)]
    pub session_id: Option<SessionId>,
    #[serde(default)]
    pub context: ChatContext,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub response: String,
    pub timestamp: DateTime<Utc>,
    pub agent_id: String,
    pub phase: String,
}

/// Free-form context for template generation. Known keys are typed; the rest
/// pass through into the prompt untouched.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedDocument {
    pub content: String,
    pub template_name: String,
    pub agent_id: String,
    pub timestamp: DateTime<Utc>,
    /// Present when the document was persisted to the session.
    pub saved_file: Option<ArtifactDescriptor>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionPriority {
    High,
    Low,
    #[default]
    #[serde(other)]
    Medium,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: SuggestionPriority,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionSet {
    pub suggestions: Vec<Suggestion>,
    pub agent_id: String,
    pub phase: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct GenerationStatus {
    pub ready: bool,
    pub provider: String,
    pub model: String,
}

// ── Prompt rendering ──

fn render_documents(prompt: &mut String, heading: &str, documents: &[SessionDocument]) {
    if documents.is_empty() {
        return;
    }
    let _ = write!(prompt, "\n\n## {heading}\n");
    for doc in documents {
        let _ = write!(
            prompt,
            "\n### {}\n{}\n\n---\n",
            naming::heading_from_name(&doc.name),
            doc.content
        );
    }
}

fn pretty_json(value: &impl Serialize) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_owned())
}

/// Chat prompt for one agent turn. Pure: all inputs are already loaded.
pub fn render_chat_prompt(
    persona: &str,
    phase: &str,
    context: &ChatContext,
    message: &str,
    documents: &[SessionDocument],
) -> String {
    let project_name = context.project_name.as_deref().unwrap_or("Not specified");
    let brief = context
        .project_brief
        .as_deref()
        .unwrap_or("No project brief available yet");
    let previous = context
        .previous_phases
        .as_ref()
        .filter(|v| !v.is_null())
        .map_or_else(|| "No previous phases completed".to_owned(), pretty_json);

    let mut prompt = format!(
        "# Planwright Agent Session\n\n\
         ## Your Role\n{persona}\n\n\
         ## Current Phase: {}\n\n\
         ## Project Context\n**Project Name:** {project_name}\n\n\
         **Project Brief:**\n{brief}\n\n\
         ## Previous Phase Outputs\n{previous}",
        phase.to_uppercase()
    );

    render_documents(&mut prompt, "Generated Documents (Full Content)", documents);

    if !context.chat_history.is_empty() {
        prompt.push_str("\n\n## Chat History\n");
        for entry in &context.chat_history {
            let speaker = match entry.role {
                ChatRole::User => "User",
                ChatRole::Ai => "You",
                ChatRole::Other => continue,
            };
            let _ = writeln!(prompt, "**{speaker}:** {}", entry.content);
        }
    }

    let message = if message.trim().is_empty() {
        "User is starting this phase"
    } else {
        message
    };
    let _ = write!(
        prompt,
        "\n\n## Current User Message\n{message}\n\n\
         ## Instructions\n\
         1. Act as the specified agent persona consistently\n\
         2. Remember the conversation history and maintain context\n\
         3. The project name is \"{project_name}\" - always use this exact name\n\
         4. Help the user complete the current phase\n\
         5. Ask clarifying questions to gather necessary information\n\
         6. Provide expert guidance based on your role\n\
         7. Generate structured outputs that can be used in templates\n\
         8. Be conversational but professional\n\
         9. Focus on the specific phase requirements\n\
         10. When the user is ready, offer to generate templates for this phase\n\n\
         ## Response Format\n\
         Please respond in a conversational manner, maintaining context from our previous conversation. \
         If you need specific information to proceed, ask for it clearly. \
         Always use the correct project name \"{project_name}\"."
    );
    prompt
}

/// Template-filling prompt. `context` is rendered verbatim as JSON.
pub fn render_template_prompt(
    persona: &str,
    template: &str,
    context: &Value,
    documents: &[SessionDocument],
) -> String {
    let mut prompt = format!(
        "# Template Generation Task\n\n\
         ## Your Role\n{persona}\n\n\
         ## Template to Fill\n{template}\n\n\
         ## Project Context\n{}",
        pretty_json(context)
    );

    render_documents(&mut prompt, "Previously Generated Documents (Full Content)", documents);

    prompt.push_str(
        "\n\n## Instructions\n\
         1. Fill out the template completely based on the project context and previously generated documents\n\
         2. Use your expertise as the specified agent\n\
         3. Replace all placeholders with appropriate content\n\
         4. Ensure consistency with previously generated documents\n\
         5. Ensure the output is professional and comprehensive\n\
         6. Return only the filled template content, no additional commentary\n\n\
         Generate the completed template:",
    );
    prompt
}

fn render_suggestions_prompt(persona: &str, phase: &str, current_data: &Map<String, Value>) -> String {
    format!(
        "# Agent Suggestions Request\n\n\
         ## Your Role\n{persona}\n\n\
         ## Current Phase: {phase}\n\n\
         ## Current Data\n{}\n\n\
         ## Instructions\n\
         Provide 3-5 specific, actionable suggestions for what the user should do next in this phase. \
         Be concise and practical.\n\n\
         Format your response as a JSON array of suggestion objects:\n\
         [\n  {{\n    \"title\": \"Suggestion title\",\n    \"description\": \"Brief description\",\n    \
         \"priority\": \"high|medium|low\"\n  }}\n]",
        pretty_json(current_data)
    )
}

/// Parse a model reply as a suggestion list, or wrap the raw text as a single
/// medium-priority suggestion.
pub fn parse_suggestions(raw: &str) -> Vec<Suggestion> {
    let cleaned = CODE_FENCE.replace_all(raw, "");
    match serde_json::from_str::<Vec<Suggestion>>(cleaned.trim()) {
        Ok(list) => list,
        Err(e) => {
            debug!(error = %e, "suggestions reply is not a JSON list");
            vec![fallback_suggestion(raw.to_owned())]
        }
    }
}

fn fallback_suggestion(description: String) -> Suggestion {
    Suggestion {
        title: SUGGESTION_FALLBACK_TITLE.to_owned(),
        description,
        priority: SuggestionPriority::Medium,
    }
}

// ── Assembler ──

/// Builds grounded prompts and runs them through the generation gateway.
pub struct ContextAssembler {
    gateway: Arc<dyn GenerationGateway>,
    library: AssetLibrary,
    documents: DocumentStore,
    sessions: Arc<SessionService>,
}

impl ContextAssembler {
    pub fn new(
        gateway: Arc<dyn GenerationGateway>,
        library: AssetLibrary,
        documents: DocumentStore,
        sessions: Arc<SessionService>,
    ) -> Self {
        Self {
            gateway,
            library,
            documents,
            sessions,
        }
    }

    pub fn status(&self) -> GenerationStatus {
        GenerationStatus {
            ready: self.gateway.is_ready(),
            provider: self.gateway.name().to_owned(),
            model: self.gateway.model().to_owned(),
        }
    }

    fn ensure_ready(&self) -> Result<(), EngineError> {
        if self.gateway.is_ready() {
            Ok(())
        } else {
            Err(GatewayError::NotConfigured(self.gateway.name().to_owned()).into())
        }
    }

    async fn session_documents(&self, session_id: Option<&SessionId>) -> Result<Vec<SessionDocument>, EngineError> {
        match session_id {
            Some(id) => Ok(self.documents.context(id).await?),
            None => Ok(Vec::new()),
        }
    }

    /// The session's project name, if the session exists.
    async fn session_project_name(&self, session_id: Option<&SessionId>) -> Result<Option<String>, EngineError> {
        let Some(id) = session_id else {
            return Ok(None);
        };
        match self.sessions.get(id).await {
            Ok(session) => Ok(Some(session.project_name)),
            Err(EngineError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn build_chat_prompt(
        &self,
        agent_id: &str,
        phase: &str,
        context: &ChatContext,
        message: &str,
        session_id: Option<&SessionId>,
    ) -> Result<String, EngineError> {
        let persona = self.library.persona(agent_id).await?;
        let documents = self.session_documents(session_id).await?;
        Ok(render_chat_prompt(&persona, phase, context, message, &documents))
    }

    #[instrument(skip(self, request), fields(agent_id = %request.agent_id, phase = %request.phase))]
    pub async fn chat(&self, mut request: ChatRequest) -> Result<ChatReply, EngineError> {
        self.ensure_ready()?;
        if request.context.project_name.is_none() {
            request.context.project_name = self.session_project_name(request.session_id.as_ref()).await?;
        }

        let prompt = self
            .build_chat_prompt(
                &request.agent_id,
                &request.phase,
                &request.context,
                &request.message,
                request.session_id.as_ref(),
            )
            .await?;
        debug!(prompt_bytes = prompt.len(), "chat prompt assembled");

        let response = self.gateway.generate(&prompt).await.inspect_err(|e| {
            warn!(error = %e, kind = e.error_kind(), "chat generation failed");
        })?;
        Ok(ChatReply {
            response,
            timestamp: Utc::now(),
            agent_id: request.agent_id,
            phase: request.phase,
        })
    }

    /// Fill a template and, when the session and project name are known,
    /// persist the result as a session artifact.
    #[instrument(skip(self, context), fields(template = template_name, agent_id = agent_id))]
    pub async fn generate_document(
        &self,
        template_name: &str,
        agent_id: &str,
        session_id: Option<&SessionId>,
        mut context: GenerationContext,
    ) -> Result<GeneratedDocument, EngineError> {
        self.ensure_ready()?;
        let template = self.library.template(template_name).await?;
        let persona = self.library.persona(agent_id).await?;

        if context.project_name.is_none() {
            context.project_name = self.session_project_name(session_id).await?;
        }

        let mut context_json = context.extra.clone();
        if let Some(name) = &context.project_name {
            let _ = context_json.insert("projectName".into(), Value::String(name.clone()));
        }
        if let Some(phase) = &context.phase {
            let _ = context_json.insert("phase".into(), Value::String(phase.clone()));
        }
        if let Some(id) = session_id {
            let _ = context_json.insert("sessionId".into(), Value::String(id.to_string()));
        }
        let context_json = Value::Object(context_json);

        let documents = self.session_documents(session_id).await?;
        let prompt = render_template_prompt(&persona, &template, &context_json, &documents);
        debug!(prompt_bytes = prompt.len(), grounding_docs = documents.len(), "template prompt assembled");

        let content = self.gateway.generate(&prompt).await.inspect_err(|e| {
            warn!(error = %e, kind = e.error_kind(), "template generation failed");
        })?;

        let saved_file = match (session_id, context.project_name.as_deref()) {
            (Some(id), Some(project_name)) => {
                let filename = naming::artifact_filename(template_name, project_name);
                let meta = ArtifactMetadata {
                    phase: context.phase.clone(),
                    agent_id: Some(agent_id.to_owned()),
                    template_name: Some(template_name.to_owned()),
                };
                let descriptor = self.documents.save(id, &filename, &content, &meta).await?;
                match self.sessions.record_generated_file(id, &filename).await {
                    Ok(_) | Err(EngineError::NotFound(_)) => {}
                    Err(e) => warn!(error = %e, filename = %filename, "could not record generated file on session"),
                }
                info!(filename = %filename, bytes = descriptor.size_bytes, "document generated and saved");
                Some(descriptor)
            }
            _ => None,
        };

        Ok(GeneratedDocument {
            content,
            template_name: template_name.to_owned(),
            agent_id: agent_id.to_owned(),
            timestamp: Utc::now(),
            saved_file,
        })
    }

    /// Next-step suggestions. Replies that are not a JSON list, and gateway
    /// failures other than a missing configuration, degrade to one free-text
    /// suggestion instead of failing.
    #[instrument(skip(self, current_data), fields(agent_id = agent_id, phase = phase))]
    pub async fn suggestions(
        &self,
        agent_id: &str,
        phase: &str,
        current_data: &Map<String, Value>,
    ) -> Result<SuggestionSet, EngineError> {
        self.ensure_ready()?;
        let persona = self.library.persona(agent_id).await?;
        let prompt = render_suggestions_prompt(&persona, phase, current_data);

        let suggestions = match self.gateway.generate(&prompt).await {
            Ok(raw) => parse_suggestions(&raw),
            Err(e @ GatewayError::NotConfigured(_)) => return Err(e.into()),
            Err(e) => {
                warn!(error = %e, kind = e.error_kind(), "suggestions degraded to fallback");
                vec![fallback_suggestion(format!(
                    "Suggestions are unavailable right now ({e}). Continue with the current phase and try again shortly."
                ))]
            }
        };

        Ok(SuggestionSet {
            suggestions,
            agent_id: agent_id.to_owned(),
            phase: phase.to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use planwright_llm::{MockGateway, MockResponse};
    use planwright_store::{Database, SqliteSessionRepo};
    use serde_json::json;

    struct Fixture {
        _dir: tempfile::TempDir,
        gateway: Arc<MockGateway>,
        documents: DocumentStore,
        sessions: Arc<SessionService>,
        assembler: ContextAssembler,
    }

    fn fixture(gateway: MockGateway) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let assets = dir.path().join("assets");
        std::fs::create_dir_all(assets.join("personas")).unwrap();
        std::fs::create_dir_all(assets.join("templates")).unwrap();
        std::fs::write(assets.join("personas/analyst.md"), "You are the analyst.").unwrap();
        std::fs::write(assets.join("personas/pm.md"), "You are the PM.").unwrap();
        std::fs::write(assets.join("templates/prd.md"), "# {{Project}} PRD\n## Goals").unwrap();

        let library = AssetLibrary::new(&assets);
        let documents = DocumentStore::new(dir.path().join("artifacts"));
        let repo = Arc::new(SqliteSessionRepo::new(Database::in_memory().unwrap()));
        let sessions = Arc::new(SessionService::new(repo, documents.clone(), library.clone()));
        let gateway = Arc::new(gateway);
        let assembler = ContextAssembler::new(
            Arc::clone(&gateway) as Arc<dyn GenerationGateway>,
            library,
            documents.clone(),
            Arc::clone(&sessions),
        );
        Fixture {
            _dir: dir,
            gateway,
            documents,
            sessions,
            assembler,
        }
    }

    fn chat_request(session_id: Option<SessionId>) -> ChatRequest {
        ChatRequest {
            agent_id: "analyst".into(),
            phase: "analyst".into(),
            message: "What next?".into(),
            session_id,
            context: ChatContext {
                project_name: Some("Acme Widget".into()),
                chat_history: vec![
                    ChatMessage { role: ChatRole::User, content: "Hi".into() },
                    ChatMessage { role: ChatRole::Ai, content: "Hello".into() },
                    ChatMessage { role: ChatRole::Other, content: "ignored".into() },
                ],
                ..Default::default()
            },
        }
    }

    #[test]
    fn chat_prompt_sections() {
        let ctx = chat_request(None).context;
        let prompt = render_chat_prompt("PERSONA", "analyst", &ctx, "What next?", &[]);
        assert!(prompt.contains("## Your Role\nPERSONA"));
        assert!(prompt.contains("## Current Phase: ANALYST"));
        assert!(prompt.contains("**Project Name:** Acme Widget"));
        assert!(prompt.contains("No previous phases completed"));
        assert!(prompt.contains("**User:** Hi\n**You:** Hello\n"));
        assert!(!prompt.contains("ignored"));
        assert!(prompt.contains("The project name is \"Acme Widget\""));
        assert!(!prompt.contains("Generated Documents"));
    }

    #[tokio::test]
    async fn chat_prompt_inlines_every_document_in_full() {
        let f = fixture(MockGateway::always("ok"));
        let s = f.sessions.create_session("Acme Widget", None).await.unwrap();
        let long_body = "line of architecture detail\n".repeat(2_000);
        let meta = ArtifactMetadata::default();
        let t0 = Utc::now();
        f.documents
            .save_at(&s.id, "acme-widget-prd.md", "# PRD body", &meta, t0)
            .await
            .unwrap();
        f.documents
            .save_at(&s.id, "acme-widget-architecture.md", &long_body, &meta, t0 + chrono::Duration::seconds(1))
            .await
            .unwrap();

        let prompt = f
            .assembler
            .build_chat_prompt("analyst", "pm", &ChatContext::default(), "hi", Some(&s.id))
            .await
            .unwrap();

        assert!(prompt.contains("## Generated Documents (Full Content)"));
        assert!(prompt.contains(&long_body));
        assert!(prompt.contains("# PRD body"));
        assert!(!prompt.contains("Planwright Generated Document"));
        let arch = prompt.find("### Acme Widget Architecture").unwrap();
        let prd = prompt.find("### Acme Widget Prd").unwrap();
        assert!(arch < prd, "newest document first");
    }

    #[tokio::test]
    async fn chat_returns_reply_and_records_prompt() {
        let f = fixture(MockGateway::always("Let's start with the problem."));
        let reply = f.assembler.chat(chat_request(None)).await.unwrap();
        assert_eq!(reply.response, "Let's start with the problem.");
        assert_eq!(reply.agent_id, "analyst");
        assert!(f.gateway.last_prompt().unwrap().contains("What next?"));
    }

    #[tokio::test]
    async fn chat_with_unready_gateway_is_not_configured() {
        let f = fixture(MockGateway::unready());
        let err = f.assembler.chat(chat_request(None)).await.unwrap_err();
        assert!(matches!(err, EngineError::Upstream(GatewayError::NotConfigured(_))));
        assert_eq!(f.gateway.call_count(), 0);
    }

    #[tokio::test]
    async fn chat_with_unknown_persona_is_not_found() {
        let f = fixture(MockGateway::always("x"));
        let mut req = chat_request(None);
        req.agent_id = "ghost".into();
        assert!(matches!(f.assembler.chat(req).await, Err(EngineError::NotFound(_))));
    }

    #[tokio::test]
    async fn generate_document_saves_and_tracks_file() {
        let f = fixture(MockGateway::always("# Acme Widget PRD\nFilled."));
        let s = f.sessions.create_session("Acme Widget", None).await.unwrap();

        let doc = f
            .assembler
            .generate_document(
                "prd",
                "pm",
                Some(&s.id),
                GenerationContext {
                    phase: Some("pm".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let saved = doc.saved_file.unwrap();
        assert_eq!(saved.filename, "acme-widget-prd.md");
        let stored = f.documents.read(&s.id, "acme-widget-prd.md").await.unwrap().unwrap();
        assert_eq!(stored.content, "# Acme Widget PRD\nFilled.");
        assert_eq!(stored.descriptor.metadata.agent_id.as_deref(), Some("pm"));
        assert_eq!(stored.descriptor.metadata.phase.as_deref(), Some("pm"));

        let session = f.sessions.get(&s.id).await.unwrap();
        assert_eq!(session.generated_files, vec!["acme-widget-prd.md"]);

        let prompt = f.gateway.last_prompt().unwrap();
        assert!(prompt.contains("## Template to Fill\n# {{Project}} PRD"));
        assert!(prompt.contains(&format!("\"sessionId\": \"{}\"", s.id)));
        assert!(prompt.ends_with("Generate the completed template:"));
        assert!(prompt.contains("Return only the filled template content, no additional commentary"));
    }

    #[tokio::test]
    async fn generate_document_without_session_is_not_saved() {
        let f = fixture(MockGateway::always("text"));
        let doc = f
            .assembler
            .generate_document("prd", "pm", None, GenerationContext::default())
            .await
            .unwrap();
        assert!(doc.saved_file.is_none());
        assert_eq!(doc.content, "text");
    }

    #[tokio::test]
    async fn generate_document_missing_template() {
        let f = fixture(MockGateway::always("text"));
        let err = f
            .assembler
            .generate_document("story", "pm", None, GenerationContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
        assert_eq!(f.gateway.call_count(), 0);
    }

    #[tokio::test]
    async fn generation_failure_surfaces() {
        let f = fixture(MockGateway::new(vec![MockResponse::Error(GatewayError::ServerError {
            status: 500,
            body: "boom".into(),
        })]));
        let err = f
            .assembler
            .generate_document("prd", "pm", None, GenerationContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Upstream(GatewayError::ServerError { .. })));
    }

    #[tokio::test]
    async fn suggestions_parse_fenced_json() {
        let reply = "```json\n[{\"title\":\"Interview users\",\"description\":\"Talk to five\",\"priority\":\"high\"}]\n```";
        let f = fixture(MockGateway::always(reply));
        let set = f.assembler.suggestions("analyst", "analyst", &Map::new()).await.unwrap();
        assert_eq!(set.suggestions.len(), 1);
        assert_eq!(set.suggestions[0].title, "Interview users");
        assert_eq!(set.suggestions[0].priority, SuggestionPriority::High);
    }

    #[tokio::test]
    async fn suggestions_fall_back_on_prose() {
        let f = fixture(MockGateway::always("Start by listing your users."));
        let data = json!({"goal": "x"}).as_object().cloned().unwrap();
        let set = f.assembler.suggestions("analyst", "analyst", &data).await.unwrap();
        assert_eq!(
            set.suggestions,
            vec![Suggestion {
                title: "AI Guidance".into(),
                description: "Start by listing your users.".into(),
                priority: SuggestionPriority::Medium,
            }]
        );
        assert!(f.gateway.last_prompt().unwrap().contains("\"goal\": \"x\""));
    }

    #[tokio::test]
    async fn suggestions_fall_back_on_gateway_failure() {
        let f = fixture(MockGateway::new(vec![MockResponse::Error(GatewayError::Timeout(
            std::time::Duration::from_secs(1),
        ))]));
        let set = f.assembler.suggestions("analyst", "analyst", &Map::new()).await.unwrap();
        assert_eq!(set.suggestions.len(), 1);
        assert_eq!(set.suggestions[0].title, "AI Guidance");
    }

    #[tokio::test]
    async fn status_reports_gateway() {
        let f = fixture(MockGateway::always("x"));
        let status = f.assembler.status();
        assert!(status.ready);
        assert_eq!(status.provider, "mock");
    }

    #[test]
    fn unknown_priority_reads_as_medium() {
        let parsed = parse_suggestions(r#"[{"title":"t","priority":"high|medium|low"}]"#);
        assert_eq!(parsed[0].priority, SuggestionPriority::Medium);
    }
}
