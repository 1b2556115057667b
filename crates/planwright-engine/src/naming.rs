//! Filename conventions shared by document generation and packaging.

/// Template id → artifact filename suffix.
const ARTIFACT_SUFFIXES: &[(&str, &str)] = &[
    ("project-brief", "project-brief"),
    ("prd", "prd"),
    ("architecture", "architecture"),
    ("frontend-architecture", "frontend-architecture"),
    ("uiux-specification", "uiux-spec"),
    ("po-validation", "po-validation"),
    ("user-stories", "user-stories"),
];

/// Lowercased project name with whitespace runs collapsed to `-`, path
/// separators dropped and no leading dots.
pub fn project_slug(project_name: &str) -> String {
    let cleaned: String = project_name
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | '\0'))
        .collect();
    cleaned
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .trim_start_matches('.')
        .to_owned()
}

pub fn artifact_suffix(template_id: &str) -> &str {
    ARTIFACT_SUFFIXES
        .iter()
        .find(|(id, _)| *id == template_id)
        .map_or(template_id, |(_, suffix)| suffix)
}

/// `{slug}-{suffix}.md`, where unknown template ids are used as the suffix.
pub fn artifact_filename(template_id: &str, project_name: &str) -> String {
    let id = template_id.strip_suffix(".md").unwrap_or(template_id);
    let suffix: String = artifact_suffix(id)
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '-' } else { c })
        .collect();
    format!("{}-{suffix}.md", project_slug(project_name))
}

/// Archive download names keep only ASCII alphanumerics.
pub fn archive_slug(project_name: &str) -> String {
    project_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect()
}

/// `my-project-prd` → `My Project Prd`.
pub fn heading_from_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_word = false;
    for c in name.chars() {
        let c = if c == '-' { ' ' } else { c };
        let is_word = c.is_alphanumeric() || c == '_';
        if is_word && !in_word {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        in_word = is_word;
    }
    out
}

/// Reduce an arbitrary label to one safe path component.
pub fn path_component(raw: &str) -> String {
    let mapped: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect();
    let trimmed = mapped.trim_start_matches('.');
    if trimmed.is_empty() {
        "untitled".to_owned()
    } else {
        trimmed.to_owned()
    }
}
