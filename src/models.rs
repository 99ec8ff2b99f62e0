//! Cursor model registry.
//!
//! Built once at startup and shared read-only through the app state.

use std::collections::BTreeMap;

use crate::openai::{ModelList, ModelObject};

/// `created` timestamp reported for every model.
const MODEL_CREATED: i64 = 1_700_000_000;

/// Provider prefixes clients may put in front of a model id, stripped in order.
const MODEL_PREFIXES: [&str; 2] = ["cursor/", "cursor-acp/"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub supports_thinking: bool,
    pub supports_tools: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown model {input:?}")]
pub struct UnknownModel {
    pub input: String,
}

#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: BTreeMap<String, ModelInfo>,
}

// (id, display name, thinking)
const BUILTIN_MODELS: &[(&str, &str, bool)] = &[
    ("auto", "Auto", false),
    ("composer-1.5", "Composer 1.5", false),
    ("composer-1", "Composer 1", false),
    ("gpt-5.3-codex", "GPT-5.3 Codex", true),
    ("gpt-5.3-codex-low", "GPT-5.3 Codex Low", true),
    ("gpt-5.3-codex-high", "GPT-5.3 Codex High", true),
    ("gpt-5.3-codex-xhigh", "GPT-5.3 Codex Extra High", true),
    ("gpt-5.3-codex-fast", "GPT-5.3 Codex Fast", true),
    ("gpt-5.3-codex-low-fast", "GPT-5.3 Codex Low Fast", true),
    ("gpt-5.3-codex-high-fast", "GPT-5.3 Codex High Fast", true),
    ("gpt-5.3-codex-xhigh-fast", "GPT-5.3 Codex Extra High Fast", true),
    ("gpt-5.2", "GPT-5.2", true),
    ("gpt-5.2-codex", "GPT-5.2 Codex", true),
    ("gpt-5.2-codex-high", "GPT-5.2 Codex High", true),
    ("gpt-5.2-codex-low", "GPT-5.2 Codex Low", true),
    ("gpt-5.2-codex-xhigh", "GPT-5.2 Codex Extra High", true),
    ("gpt-5.2-codex-fast", "GPT-5.2 Codex Fast", true),
    ("gpt-5.2-codex-high-fast", "GPT-5.2 Codex High Fast", true),
    ("gpt-5.2-codex-low-fast", "GPT-5.2 Codex Low Fast", true),
    ("gpt-5.2-codex-xhigh-fast", "GPT-5.2 Codex Extra High Fast", true),
    ("gpt-5.2-high", "GPT-5.2 High", true),
    ("gpt-5.1-codex-max", "GPT-5.1 Codex Max", true),
    ("gpt-5.1-codex-max-high", "GPT-5.1 Codex Max High", true),
    ("gpt-5.1-high", "GPT-5.1 High", true),
    ("opus-4.6", "Claude 4.6 Opus", false),
    ("opus-4.6-thinking", "Claude 4.6 Opus (Thinking)", true),
    ("opus-4.5", "Claude 4.5 Opus", false),
    ("opus-4.5-thinking", "Claude 4.5 Opus (Thinking)", true),
    ("sonnet-4.5", "Claude 4.5 Sonnet", false),
    ("sonnet-4.5-thinking", "Claude 4.5 Sonnet (Thinking)", true),
    ("gemini-3-pro", "Gemini 3 Pro", false),
    ("gemini-3-flash", "Gemini 3 Flash", false),
    ("grok", "Grok", false),
];

impl ModelRegistry {
    /// Models `cursor-agent` currently accepts.
    pub fn builtin() -> Self {
        Self::from_models(BUILTIN_MODELS.iter().map(|(id, name, thinking)| ModelInfo {
            id: id.to_string(),
            name: name.to_string(),
            supports_thinking: *thinking,
            supports_tools: true,
        }))
    }

    pub fn from_models(models: impl IntoIterator<Item = ModelInfo>) -> Self {
        Self {
            models: models.into_iter().map(|m| (m.id.clone(), m)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&ModelInfo> {
        self.models.get(id)
    }

    /// Resolve a client model id (`cursor/auto`, `cursor-acp/sonnet-4.5`, `grok`).
    pub fn resolve(&self, input: &str) -> Result<&ModelInfo, UnknownModel> {
        let mut id = input.trim();
        for prefix in MODEL_PREFIXES {
            id = id.strip_prefix(prefix).unwrap_or(id);
        }
        self.models.get(id).ok_or_else(|| UnknownModel {
            input: input.to_string(),
        })
    }

    /// All models, sorted by id.
    pub fn iter(&self) -> impl Iterator<Item = &ModelInfo> {
        self.models.values()
    }

    /// `GET /v1/models` body.
    pub fn list_openai(&self) -> ModelList {
        ModelList {
            object: "list",
            data: self
                .iter()
                .map(|m| ModelObject {
                    id: m.id.clone(),
                    object: "model",
                    created: MODEL_CREATED,
                    owned_by: "cursor",
                })
                .collect(),
        }
    }
}
