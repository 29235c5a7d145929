use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_NAME: &str = "Assistant";
pub const DEFAULT_DESCRIPTION: &str = "You are a helpful assistant.";
pub const DEFAULT_BASE_PROMPT: &str = "You are a helpful and concise AI assistant replying in a WhatsApp chat. \
Do not use Markdown formatting. Keep your answers short, friendly, and easy to read. \
Split long answers every 3 lines using a real newline character. \
Each newline means a new WhatsApp message. Avoid long paragraphs or unnecessary explanations.";

/// Persona used as the model's system instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persona {
    pub name: String,
    pub system_instruction: String,
}

#[derive(Debug, Deserialize)]
struct PersonaFile {
    name: Option<String>,
    description: Option<String>,
    base_prompt: Option<String>,
}

impl Persona {
    fn compose(name: &str, base_prompt: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            system_instruction: format!("{}\n\n{}", base_prompt, description),
        }
    }
}

impl Default for Persona {
    fn default() -> Self {
        Self::compose(DEFAULT_NAME, DEFAULT_BASE_PROMPT, DEFAULT_DESCRIPTION)
    }
}

/// Load a persona JSON file. Any failure falls back to the default persona.
pub fn load_persona(path: &Path) -> Persona {
    if !path.exists() {
        tracing::warn!("Persona file not found at {}. Using default persona.", path.display());
        return Persona::default();
    }

    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::error!("Failed to read persona {}: {}. Using default persona.", path.display(), e);
            return Persona::default();
        }
    };

    match serde_json::from_str::<PersonaFile>(&raw) {
        Ok(file) => {
            let persona = Persona::compose(
                file.name.as_deref().unwrap_or(DEFAULT_NAME),
                file.base_prompt.as_deref().unwrap_or(DEFAULT_BASE_PROMPT),
                file.description.as_deref().unwrap_or(DEFAULT_DESCRIPTION),
            );
            tracing::info!("Loaded persona: {}", persona.name);
            persona
        }
        Err(e) => {
            tracing::error!("Invalid persona JSON in {}: {}. Using default persona.", path.display(), e);
            Persona::default()
        }
    }
}
