use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};

use planwright_core::checklist::ChecklistResult;
use planwright_core::phase::Phase;
use planwright_core::session::Session;
use planwright_store::SessionDocument;

use crate::naming;

/// Roles that get a ready-made prompt in every package.
pub const PROMPT_ROLES: [&str; 4] = ["analyst", "pm", "architect", "developer"];

const STORY_SEPARATOR: &str = "\n\n---\n\n";

/// Content lookups for prompt skeletons: completed phase outputs first, then
/// the session's generated documents by canonical suffix.
pub(crate) struct PromptSources<'a> {
    session: &'a Session,
    artifacts: HashMap<String, &'a str>,
}

impl<'a> PromptSources<'a> {
    pub(crate) fn new(session: &'a Session, documents: &'a [SessionDocument]) -> Self {
        let slug = naming::project_slug(&session.project_name);
        let artifacts = documents
            .iter()
            .filter_map(|doc| {
                doc.name
                    .strip_prefix(&slug)
                    .and_then(|rest| rest.strip_prefix('-'))
                    .map(|suffix| (suffix.to_owned(), doc.content.as_str()))
            })
            .collect();
        Self { session, artifacts }
    }

    fn output(&self, phase: Phase, kind: &str, suffix: &str) -> Option<&'a str> {
        let record = self.session.phases.get(phase);
        record
            .completed
            .then(|| record.outputs.iter().find(|o| o.kind == kind))
            .flatten()
            .map(|o| o.content.as_str())
            .or_else(|| self.artifacts.get(suffix).copied())
    }

    fn or_missing(&self, phase: Phase, kind: &str, suffix: &str, missing: &str) -> String {
        self.output(phase, kind, suffix).unwrap_or(missing).to_owned()
    }

    fn stories(&self) -> String {
        let record = self.session.phases.get(Phase::Sm);
        let stories: Vec<&str> = if record.completed {
            record
                .outputs
                .iter()
                .filter(|o| o.kind == "story")
                .map(|o| o.content.as_str())
                .collect()
        } else {
            Vec::new()
        };
        if !stories.is_empty() {
            return stories.join(STORY_SEPARATOR);
        }
        self.artifacts
            .get("user-stories")
            .or_else(|| self.artifacts.get("story"))
            .copied()
            .unwrap_or("No user stories available")
            .to_owned()
    }

    fn brief(&self) -> String {
        self.or_missing(Phase::Analyst, "project-brief", "project-brief", "No project brief available")
    }

    fn prd(&self) -> String {
        self.or_missing(Phase::Pm, "prd", "prd", "No PRD available")
    }

    fn architecture(&self) -> String {
        self.or_missing(
            Phase::Architect,
            "architecture",
            "architecture",
            "No architecture document available",
        )
    }
}

pub(crate) fn agent_prompt(role: &str, sources: &PromptSources<'_>) -> String {
    let project = &sources.session.project_name;
    match role {
        "analyst" => format!(
            "# Analyst Agent Prompt\n\n\
             You are an expert business analyst and researcher. Your task is to help implement the project based on the following brief:\n\n\
             ## Project Overview\n**Project Name:** {project}\n\n\
             ## Project Brief\n{}\n\n\
             ## Your Role\n\
             - Conduct additional research as needed\n\
             - Clarify requirements and assumptions\n\
             - Identify potential risks and opportunities\n\
             - Provide detailed analysis and recommendations\n\n\
             ## Instructions\n\
             Use this information to guide your analysis and provide detailed insights for the development team.",
            sources.brief()
        ),
        "pm" => format!(
            "# Product Manager Agent Prompt\n\n\
             You are an expert product manager. Use the following PRD to guide product development:\n\n\
             ## Project Overview\n**Project Name:** {project}\n\n\
             ## Product Requirements Document\n{}\n\n\
             ## Your Role\n\
             - Ensure product requirements are met\n\
             - Prioritize features and functionality\n\
             - Make product decisions based on the PRD\n\
             - Coordinate with development team\n\n\
             ## Instructions\n\
             Reference this PRD for all product-related decisions and implementations.",
            sources.prd()
        ),
        "architect" => format!(
            "# System Architect Agent Prompt\n\n\
             You are a senior system architect. Use the following architecture document to guide system design:\n\n\
             ## Project Overview\n**Project Name:** {project}\n\n\
             ## System Architecture\n{}\n\n\
             ## Your Role\n\
             - Implement the defined system architecture\n\
             - Ensure scalability and performance requirements are met\n\
             - Make technical decisions aligned with the architecture\n\
             - Guide development team on technical implementation\n\n\
             ## Instructions\n\
             Follow this architecture document for all system design and implementation decisions.",
            sources.architecture()
        ),
        "developer" => format!(
            "# Developer Agent Prompt\n\n\
             You are a senior full-stack developer. Use the following comprehensive project documentation to guide development:\n\n\
             ## Project Overview\n**Project Name:** {project}\n\n\
             ## Complete Project Documentation\n\n\
             ### Project Brief\n{}\n\n\
             ### Product Requirements Document\n{}\n\n\
             ### System Architecture\n{}\n\n\
             ### Frontend Architecture & UI/UX Specifications\n{}\n\n{}\n\n\
             ### User Stories\n{}\n\n\
             ## Your Role\n\
             - Implement all features according to specifications\n\
             - Follow the defined architecture and design patterns\n\
             - Ensure code quality and best practices\n\
             - Test implementations thoroughly\n\n\
             ## Instructions\n\
             Use this comprehensive documentation to build the complete application. \
             Prioritize user stories and follow the technical specifications exactly.",
            sources.brief(),
            sources.prd(),
            sources.architecture(),
            sources.or_missing(
                Phase::DesignArchitect,
                "frontend-architecture",
                "frontend-architecture",
                "No frontend architecture available",
            ),
            sources.or_missing(
                Phase::DesignArchitect,
                "uiux-spec",
                "uiux-spec",
                "No UI/UX specifications available",
            ),
            sources.stories()
        ),
        other => format!(
            "# {} Agent Prompt\n\nProject: {project}\n\nUse the project documentation to guide your work.",
            naming::heading_from_name(other)
        ),
    }
}

pub(crate) fn checklist_summary(name: &str, result: &ChecklistResult) -> String {
    let responses = serde_json::to_string_pretty(&result.responses).unwrap_or_else(|_| "{}".to_owned());
    format!(
        "# {name} - Completed\n\n\
         **Completion:** {}% ({} of {} items)\n\
         **Completed At:** {}\n\n\
         ## Results\n{responses}",
        result.completion_percentage,
        result.completed_items,
        result.total_items,
        result.completed_at.to_rfc3339_opts(SecondsFormat::Millis, true),
    )
}

pub(crate) fn readme(session: &Session, generated_at: DateTime<Utc>) -> String {
    format!(
        "# {}\n\n\
         Generated with Planwright\n\n\
         ## Project Overview\n\
         This package contains all the planning documents and agent prompts needed to implement your project using AI-driven development.\n\n\
         ## Contents\n\n\
         ### Documentation (/docs)\n\
         - Project brief and requirements\n\
         - System architecture documents\n\
         - Frontend architecture and UI/UX specifications\n\
         - User stories and epics\n\n\
         ### Agent Prompts (/agent-prompts)\n\
         - Ready-to-use prompts for different AI agents\n\
         - Analyst, PM, Architect, and Developer prompts\n\
         - Copy and paste into your preferred AI coding tool\n\n\
         ### Checklists (/checklists)\n\
         - Completed validation checklists\n\
         - Quality assurance records\n\n\
         ## How to Use\n\n\
         1. **Start with the Developer Agent Prompt**: Use `agent-prompts/developer-agent-prompt.md` as your main prompt for AI coding tools\n\
         2. **Reference Documentation**: All project docs are in the `docs/` folder\n\
         3. **Follow User Stories**: Implement features based on the user stories provided\n\
         4. **Use Specialized Prompts**: Switch to specific agent prompts for specialized tasks\n\n\
         ## Generated On\n{}\n\n\
         ## Session ID\n{}\n",
        session.project_name,
        generated_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        session.id,
    )
}
