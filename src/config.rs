use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::audio::AudioConfig;
use crate::error::SessionError;

/// Environment overrides look like `PERSONA_VOICE__ENDPOINT__API_KEY`.
pub const ENV_PREFIX: &str = "PERSONA_VOICE";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub endpoint: EndpointConfig,
    pub audio: AudioConfig,
    /// Persona used by the command-line client; library callers pass their own.
    pub persona: PersonaConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// WebSocket URL of the live endpoint (ws:// or wss://)
    pub url: String,
    /// Identifier of the remote agent/model the session is bound to
    pub identifier: String,
    /// Sent as a bearer token during the upgrade request
    pub api_key: String,
    pub handshake_timeout_ms: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            identifier: String::new(),
            api_key: String::new(),
            handshake_timeout_ms: 10_000,
        }
    }
}

impl EndpointConfig {
    /// Check required settings before any device or network resource is touched.
    pub fn validate(&self) -> Result<Url, SessionError> {
        if self.url.trim().is_empty() {
            return Err(SessionError::Configuration("endpoint url is not set".into()));
        }
        let url = Url::parse(self.url.trim()).map_err(|e| {
            SessionError::Configuration(format!("invalid endpoint url '{}': {}", self.url, e))
        })?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(SessionError::Configuration(format!(
                "endpoint url must use ws:// or wss://, got '{}'",
                url.scheme()
            )));
        }
        if self.identifier.trim().is_empty() {
            return Err(SessionError::Configuration(
                "endpoint identifier is not set".into(),
            ));
        }
        if self.api_key.trim().is_empty() {
            return Err(SessionError::Configuration(format!(
                "api key is missing (set endpoint.api_key or {}__ENDPOINT__API_KEY)",
                ENV_PREFIX
            )));
        }
        Ok(url)
    }
}

/// Behavioural profile assigned to the remote endpoint.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Persona {
    pub name: String,
    pub description: String,
    pub instructions: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PersonaConfig {
    #[serde(flatten)]
    pub persona: Persona,
    /// Free-text conversation context, e.g. notes about the project under discussion
    pub context: String,
}

/// What the application passes to `connect`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallRequest {
    pub persona: Persona,
    pub context: String,
}

impl CallRequest {
    pub fn new(persona: Persona, context: impl Into<String>) -> Self {
        Self {
            persona,
            context: context.into(),
        }
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        if self.persona.name.trim().is_empty() {
            return Err(SessionError::Configuration("persona name is empty".into()));
        }
        Ok(())
    }

    pub fn instruction(&self) -> String {
        compose_instruction(&self.persona, &self.context)
    }
}

impl From<PersonaConfig> for CallRequest {
    fn from(config: PersonaConfig) -> Self {
        Self::new(config.persona, config.context)
    }
}

/// Build the single instruction string sent at connect time.
///
/// Always ends with the directive to stay in character, so the endpoint
/// answers as the persona instead of as a generic assistant.
pub fn compose_instruction(persona: &Persona, context: &str) -> String {
    let name = persona.name.trim();
    let mut out = format!("You are {}.", name);

    let description = persona.description.trim();
    if !description.is_empty() {
        out.push(' ');
        out.push_str(description);
    }

    let instructions = persona.instructions.trim();
    if !instructions.is_empty() {
        out.push_str("\n\nInstructions:\n");
        out.push_str(instructions);
    }

    let context = context.trim();
    if !context.is_empty() {
        out.push_str("\n\nConversation context:\n");
        out.push_str(context);
    }

    out.push_str(&format!(
        "\n\nYou must behave as {name} for the whole conversation. Do not act as a \
         generic AI assistant and do not describe yourself as one; speak only as {name} would."
    ));
    out
}

impl Config {
    /// Load `config.toml` (or the given file) and apply environment overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = ::config::Config::builder();
        builder = match path {
            Some(p) => builder.add_source(::config::File::from(p).required(true)),
            None => builder.add_source(::config::File::with_name("config").required(false)),
        };
        let settings = builder
            .add_source(::config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn endpoint() -> EndpointConfig {
        EndpointConfig {
            url: "wss://live.example.com/v1/stream".into(),
            identifier: "persona-live-1".into(),
            api_key: "secret".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[endpoint]
url = "ws://127.0.0.1:9000/live"
identifier = "agent-7"
api_key = "k"

[audio]
capture_device = "plughw:1,0"
playback_sample_rate = 16000

[persona]
name = "Ada"
description = "A pragmatic product coach."
context = "Project: a bike-sharing app"
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.endpoint.identifier, "agent-7");
        assert_eq!(config.endpoint.handshake_timeout_ms, 10_000);
        assert_eq!(config.audio.capture_device, "plughw:1,0");
        assert_eq!(config.audio.playback_sample_rate, 16000);
        // Unset keys keep their defaults
        assert_eq!(config.audio.uplink_queue_depth, 64);
        assert_eq!(config.persona.persona.name, "Ada");

        let request = CallRequest::from(config.persona);
        assert_eq!(request.context, "Project: a bike-sharing app");
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        assert!(Config::load(Some(Path::new("/nonexistent/persona.toml"))).is_err());
    }

    #[test]
    fn test_validate_requires_credentials() {
        assert!(endpoint().validate().is_ok());

        let mut missing_key = endpoint();
        missing_key.api_key = "  ".into();
        assert!(matches!(
            missing_key.validate(),
            Err(SessionError::Configuration(_))
        ));

        let mut http = endpoint();
        http.url = "https://live.example.com".into();
        assert!(http.validate().is_err());

        let mut no_id = endpoint();
        no_id.identifier.clear();
        assert!(no_id.validate().is_err());

        assert!(EndpointConfig::default().validate().is_err());
    }

    #[test]
    fn test_instruction_composition() {
        let persona = Persona {
            name: "Marcus".into(),
            description: "A skeptical venture investor.".into(),
            instructions: "Ask hard questions about the market.".into(),
        };
        let text = compose_instruction(&persona, "Idea: drone delivery for pharmacies");

        assert!(text.starts_with("You are Marcus. A skeptical venture investor."));
        assert!(text.contains("Instructions:\nAsk hard questions about the market."));
        assert!(text.contains("Conversation context:\nIdea: drone delivery for pharmacies"));
        assert!(text.contains("You must behave as Marcus"));
        assert!(text.contains("generic AI assistant"));
    }

    #[test]
    fn test_instruction_skips_empty_sections() {
        let persona = Persona {
            name: "Ada".into(),
            ..Default::default()
        };
        let text = compose_instruction(&persona, "   ");
        assert!(!text.contains("Instructions:"));
        assert!(!text.contains("Conversation context:"));
    }

    #[test]
    fn test_request_needs_persona_name() {
        assert!(CallRequest::default().validate().is_err());
        let ok = CallRequest::new(
            Persona {
                name: "Ada".into(),
                ..Default::default()
            },
            "",
        );
        assert!(ok.validate().is_ok());
        assert_eq!(ok.instruction(), compose_instruction(&ok.persona, ""));
    }
}
