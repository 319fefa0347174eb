//! Prompt construction
//!
//! Turns the user's draft plus the tab's preset options into the single
//! prompt string sent to the model. Pure string building; no I/O.

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use crate::data::TaskType;
use crate::model::GenerationOptions;

const UNIFIED_MODE_GUIDELINES: &str = "Create ONE minimal prompt. No meta.\n\
Never include answers or code. Output the prompt only.\n\
No headings, no numbered sections, no labels.";

const CLOSING_INSTRUCTION: &str =
    "One output only. If insufficient detail, reply INPUT_INSUFFICIENT.";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromptError {
    #[error("Empty input. Please provide a prompt description or content to work with.")]
    EmptyInput,
    #[error(
        "Potential prompt injection detected. Please focus on describing the prompt content you want created or enhanced."
    )]
    Injection,
}

fn type_guidelines(task_type: TaskType) -> Option<&'static str> {
    match task_type {
        TaskType::General => None,
        TaskType::Coding => Some("Code: state language, environment, and I/O. Be precise."),
        TaskType::Image => Some("Image: cover subject, context, style, lighting. No meta."),
        TaskType::Video => Some("Video: cover subject, motion, camera, pacing. No meta."),
        TaskType::Research => Some("Research: precise claims; cite if requested."),
        TaskType::Writing => Some("Writing: align audience, tone, and structure."),
        TaskType::Marketing => Some("Marketing: persona, benefits, CTA."),
    }
}

struct InjectionRules {
    direct: Vec<Regex>,
    /// Phrases that are fine when followed by a discussion word
    qualified: Vec<(Regex, Regex)>,
}

fn injection_rules() -> &'static InjectionRules {
    static RULES: OnceLock<InjectionRules> = OnceLock::new();
    RULES.get_or_init(|| {
        let compile = |pattern: &str| Regex::new(pattern).ok();
        let direct = [
            r"(?i)ignore\s+(all\s+)?(previous|prior|above)\s+(instructions?|prompts?|rules?)",
            r"(?i)forget\s+(everything|all)\s+(above|before|previous)",
            r"(?i)disregard\s+(all\s+)?(above|previous)\s+(instructions?|prompts?)",
            r"(?i)you\s+are\s+(no\s+longer|now)\s+(a|an)\s+",
            r"(?i)from\s+now\s+on\s+you\s+(will|are|should)",
            r"(?i)act\s+as\s+(if\s+you\s+are\s+)?(a|an)\s+(different|new)\s+",
            r"(?i)override\s+(system|default|previous)\s+(settings?|instructions?)",
            r"(?i)reset\s+(your\s+)?(instructions?|parameters?|settings?)",
        ]
        .into_iter()
        .filter_map(compile)
        .collect();
        let qualified = [
            (
                r"(?i)\bjailbreak\b|\bDAN\s*v?\d*\b",
                r"(?i)^\s+(method|technique|prevention|detection)",
            ),
            (
                r"(?i)developer\s+mode",
                r"(?i)^\s+(discussion|prevention|security)",
            ),
        ]
        .into_iter()
        .filter_map(|(phrase, exempt)| Some((compile(phrase)?, compile(exempt)?)))
        .collect();
        InjectionRules { direct, qualified }
    })
}

fn looks_like_injection(input: &str) -> bool {
    let rules = injection_rules();
    if rules.direct.iter().any(|re| re.is_match(input)) {
        return true;
    }
    rules.qualified.iter().any(|(phrase, exempt)| {
        phrase
            .find_iter(input)
            .any(|m| !exempt.is_match(&input[m.end()..]))
    })
}

/// Reject input that cannot be turned into a prompt
pub fn validate_builder_input(input: &str) -> Result<(), PromptError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(PromptError::EmptyInput);
    }
    if looks_like_injection(trimmed) {
        return Err(PromptError::Injection);
    }
    Ok(())
}

fn constraints(task_type: TaskType, options: &GenerationOptions) -> Vec<String> {
    let mut parts = Vec::new();
    if let Some(tone) = &options.tone {
        parts.push(format!("tone={}", tone));
    }
    if let Some(detail) = &options.detail {
        parts.push(format!("detail={}", detail));
    }
    if let Some(audience) = &options.audience {
        parts.push(format!("audience={}", audience));
    }
    if let Some(language) = options
        .language
        .as_ref()
        .filter(|lang| !lang.eq_ignore_ascii_case("english"))
    {
        parts.push(format!("lang={}", language));
    }
    if let Some(format) = &options.format {
        parts.push(format!("format={}", format));
    }
    if matches!(task_type, TaskType::Image | TaskType::Video) {
        if let Some(style) = &options.style_preset {
            parts.push(format!("style={}", style));
        }
        if let Some(ratio) = &options.aspect_ratio {
            parts.push(format!("ratio={}", ratio));
        }
    }
    if task_type == TaskType::Coding && options.include_tests == Some(true) {
        parts.push("tests=yes".to_string());
    }
    if task_type == TaskType::Research && options.require_citations == Some(true) {
        parts.push("citations=yes".to_string());
    }
    parts
}

/// Assemble the full prompt for `input`.
///
/// Sections, separated by blank lines: system prompt (if any), fixed
/// guidelines, task-type guideline, constraints, extra context, examples,
/// the input itself, and the closing instruction.
pub fn build_unified_prompt(
    input: &str,
    task_type: TaskType,
    options: &GenerationOptions,
    system_prompt: Option<&str>,
) -> Result<String, PromptError> {
    validate_builder_input(input)?;

    let mut sections: Vec<String> = Vec::new();
    if let Some(system) = system_prompt.map(str::trim).filter(|s| !s.is_empty()) {
        sections.push(system.to_string());
    }
    sections.push(UNIFIED_MODE_GUIDELINES.to_string());
    if let Some(guideline) = type_guidelines(task_type) {
        sections.push(guideline.to_string());
    }
    let constraints = constraints(task_type, options);
    if !constraints.is_empty() {
        sections.push(format!("Constraints: {}", constraints.join(", ")));
    }
    if let Some(context) = options.additional_context.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        sections.push(format!("Context: {}", context));
    }
    if let Some(examples) = options.examples_text.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        sections.push(format!("Examples: {}", examples));
    }
    sections.push(format!("Input: {}", input.trim()));
    sections.push(CLOSING_INSTRUCTION.to_string());

    Ok(sections.join("\n\n"))
}
