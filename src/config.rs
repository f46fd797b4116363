//! Persona configuration loading and validation.

use crate::error::{Error, Result};
use anyhow::Context as _;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default automation engine base URL. Doubles as the dev-mode placeholder:
/// debug dispatches against this exact URL are short-circuited locally.
pub const DEFAULT_WEBHOOK_BASE: &str = "http://localhost:5678";

/// Role name fragments that mark an author as command staff unless the
/// persona overrides them.
const DEFAULT_COMMAND_ROLES: [&str; 2] = ["Commander", "Command Staff"];

/// Resolved persona configuration. Immutable after load; shared as `Arc`.
#[derive(Debug, Clone)]
pub struct PersonaConfig {
    pub id: String,
    pub name: String,
    pub rank: Option<String>,
    pub role: Option<String>,
    pub callsign: Option<String>,
    pub division: Option<String>,
    /// Resolved Discord bot token.
    pub token: String,
    pub client_id: Option<String>,
    pub webhook: WebhookTarget,
    /// Delay before outbound sends, to appear more natural.
    pub response_delay_ms: u64,
    pub debug_mode: bool,
    /// Channel ids this persona responds in. Empty means all channels.
    pub active_channels: Vec<String>,
    /// Role name fragments that classify an author as a commander.
    pub command_roles: Vec<String>,
    /// In-character failure reply template with `{{ officer.callsign }}` placeholder.
    pub error_message: Option<String>,
    /// Opaque persona documents forwarded to the automation engine.
    pub personality: Option<serde_yaml::Value>,
    pub organization: Option<serde_yaml::Value>,
    /// Knowledge base documents keyed by file stem.
    pub knowledge_base: BTreeMap<String, serde_yaml::Value>,
}

/// Where outbound webhook payloads are POSTed.
#[derive(Debug, Clone)]
pub struct WebhookTarget {
    pub base_url: String,
    pub path: String,
    /// Production override. When set, takes precedence over `base_url`.
    pub prod_url: Option<String>,
}

impl WebhookTarget {
    fn from_env(path: impl Into<String>) -> Self {
        Self {
            base_url: env_nonempty("N8N_WEBHOOK_URL")
                .unwrap_or_else(|| DEFAULT_WEBHOOK_BASE.to_string()),
            path: path.into(),
            prod_url: env_nonempty("N8N_PROD_URL"),
        }
    }

    /// Effective POST target.
    pub fn url(&self) -> String {
        let base = self.prod_url.as_deref().unwrap_or(&self.base_url);
        format!("{}{}", base, self.path)
    }
}

/// Pick the active persona: CLI flag, then `OFFICER_ID`, then the builtin default.
pub fn select_persona(cli: Option<&str>) -> String {
    cli.map(str::to_string)
        .or_else(|| env_nonempty("OFFICER_ID"))
        .unwrap_or_else(|| "vance".to_string())
}

/// Resolve the config directory: CLI flag, then `RELAYBOT_DIR`, then cwd.
pub fn resolve_config_dir(cli: Option<&Path>) -> PathBuf {
    cli.map(Path::to_path_buf)
        .or_else(|| env_nonempty("RELAYBOT_DIR").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."))
}

impl PersonaConfig {
    /// Load the persona named by `selector`. `"vance"` is builtin; anything
    /// else is read from `officers/<selector>.yml` beneath `config_dir`.
    pub fn load(selector: &str, config_dir: &Path) -> Result<Self> {
        if selector == "vance" {
            Self::builtin_vance()
        } else {
            Self::from_yaml_file(selector, config_dir)
        }
    }

    /// The callsign used in outbound replies, falling back to the persona name.
    pub fn callsign_or_name(&self) -> &str {
        self.callsign.as_deref().unwrap_or(&self.name)
    }

    /// Whether any of personality, knowledge base, or organization is present.
    pub fn has_engine_config(&self) -> bool {
        self.personality.is_some() || self.organization.is_some() || !self.knowledge_base.is_empty()
    }

    fn builtin_vance() -> Result<Self> {
        let token = resolve_secret("DISCORD_BOT_TOKEN_VANCE")?;

        let response_delay_ms = env_nonempty("RESPONSE_DELAY_MS")
            .and_then(|value| value.parse().ok())
            .unwrap_or(2000);

        Ok(Self {
            id: "vance".into(),
            name: "General Vance".into(),
            rank: Some("General".into()),
            role: Some("Fleet Commander".into()),
            callsign: Some("Horizon Actual".into()),
            division: None,
            token,
            client_id: env_nonempty("DISCORD_CLIENT_ID_VANCE"),
            webhook: WebhookTarget::from_env("/webhook/general-vance"),
            response_delay_ms,
            debug_mode: debug_mode_from_env(),
            active_channels: resolve_channel_refs(&[
                "CHANNEL_GENERAL_VANCE",
                "CHANNEL_COMMAND_BRIEFING",
            ]),
            command_roles: DEFAULT_COMMAND_ROLES.map(String::from).to_vec(),
            error_message: None,
            personality: None,
            organization: None,
            knowledge_base: BTreeMap::new(),
        })
    }

    fn from_yaml_file(selector: &str, config_dir: &Path) -> Result<Self> {
        let path = config_dir.join("officers").join(format!("{selector}.yml"));
        if !path.exists() {
            return Err(Error::ConfigNotFound { path });
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read persona config from {}", path.display()))?;

        let raw: YamlPersona = serde_yaml::from_str(&content).map_err(|error| {
            Error::ConfigInvalid {
                reason: format!("{}: {error}", path.display()),
            }
        })?;

        validate(&raw)?;

        let token = resolve_secret(&raw.discord.token_env)?;
        let client_id = raw
            .discord
            .client_id_env
            .as_deref()
            .and_then(env_nonempty);

        let knowledge_base = load_knowledge_base(&raw.knowledge_base, config_dir);

        let settings = raw.settings.unwrap_or_default();

        Ok(Self {
            id: raw.officer.id,
            name: raw.officer.name,
            rank: raw.officer.rank,
            role: raw.officer.role,
            callsign: raw.officer.callsign,
            division: raw.officer.division,
            token,
            client_id,
            webhook: WebhookTarget::from_env(raw.n8n.webhook_path),
            response_delay_ms: settings.response_delay_ms.unwrap_or(1500),
            debug_mode: debug_mode_from_env(),
            active_channels: resolve_channel_refs(&raw.discord.active_channels_env),
            command_roles: raw
                .discord
                .command_roles
                .unwrap_or_else(|| DEFAULT_COMMAND_ROLES.map(String::from).to_vec()),
            error_message: settings.error_message,
            personality: raw.personality,
            organization: raw.organization,
            knowledge_base,
        })
    }
}

fn validate(raw: &YamlPersona) -> Result<()> {
    if raw.officer.id.trim().is_empty() {
        return Err(Error::ConfigInvalid {
            reason: "officer.id is required".into(),
        });
    }
    if raw.officer.name.trim().is_empty() {
        return Err(Error::ConfigInvalid {
            reason: "officer.name is required".into(),
        });
    }
    if raw.discord.token_env.trim().is_empty() {
        return Err(Error::ConfigInvalid {
            reason: "discord.token_env is required".into(),
        });
    }

    if let Some(level) = raw.personality.as_ref().and_then(formality_level) {
        if !(1.0..=10.0).contains(&level) {
            return Err(Error::ConfigInvalid {
                reason: "personality.voice.formality_level must be between 1 and 10".into(),
            });
        }
    }

    Ok(())
}

fn formality_level(personality: &serde_yaml::Value) -> Option<f64> {
    personality.get("voice")?.get("formality_level")?.as_f64()
}

/// Parse each `knowledge_base.files` entry from `knowledge-base/` beneath the
/// config dir. Missing or unparsable files are skipped with a warning.
fn load_knowledge_base(
    raw: &Option<YamlKnowledgeBase>,
    config_dir: &Path,
) -> BTreeMap<String, serde_yaml::Value> {
    let mut loaded = BTreeMap::new();

    let Some(kb) = raw else {
        return loaded;
    };

    for file in &kb.files {
        let path = config_dir.join("knowledge-base").join(file);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(_) => {
                tracing::warn!(file = %file, "knowledge base file not found, skipping");
                continue;
            }
        };

        match serde_yaml::from_str(&content) {
            Ok(value) => {
                let key = file
                    .strip_suffix(".yml")
                    .or_else(|| file.strip_suffix(".yaml"))
                    .unwrap_or(file)
                    .to_string();
                loaded.insert(key, value);
            }
            Err(error) => {
                tracing::warn!(%error, file = %file, "failed to parse knowledge base file, skipping");
            }
        }
    }

    loaded
}

/// Read a required secret from the env var the persona names.
fn resolve_secret(var: &str) -> Result<String> {
    env_nonempty(var).ok_or_else(|| Error::SecretMissing {
        var: var.to_string(),
    })
}

/// Resolve channel id env references, dropping unset or empty ones.
fn resolve_channel_refs<S: AsRef<str>>(env_names: &[S]) -> Vec<String> {
    env_names
        .iter()
        .filter_map(|name| env_nonempty(name.as_ref()))
        .collect()
}

fn env_nonempty(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|value| !value.is_empty())
}

fn debug_mode_from_env() -> bool {
    matches!(std::env::var("DEBUG_MODE").as_deref(), Ok("true"))
}

// -- Raw YAML persona documents. These never escape this module. --

#[derive(Deserialize)]
struct YamlPersona {
    officer: YamlOfficer,
    discord: YamlDiscord,
    n8n: YamlEngine,
    settings: Option<YamlSettings>,
    personality: Option<serde_yaml::Value>,
    organization: Option<serde_yaml::Value>,
    knowledge_base: Option<YamlKnowledgeBase>,
}

#[derive(Deserialize)]
struct YamlOfficer {
    id: String,
    name: String,
    rank: Option<String>,
    role: Option<String>,
    callsign: Option<String>,
    division: Option<String>,
}

#[derive(Deserialize)]
struct YamlDiscord {
    token_env: String,
    client_id_env: Option<String>,
    #[serde(default)]
    active_channels_env: Vec<String>,
    command_roles: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct YamlEngine {
    webhook_path: String,
}

#[derive(Deserialize, Default)]
struct YamlSettings {
    response_delay_ms: Option<u64>,
    error_message: Option<String>,
}

#[derive(Deserialize)]
struct YamlKnowledgeBase {
    #[serde(default)]
    files: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const TORRES_YAML: &str = r#"
officer:
  id: torres
  name: Major Torres
  rank: Major
  role: Intelligence Officer
  callsign: Spyglass
  division: Intelligence
discord:
  token_env: DISCORD_BOT_TOKEN_TORRES_TEST
  active_channels_env:
    - CHANNEL_TORRES_TEST
    - CHANNEL_TORRES_UNSET_TEST
n8n:
  webhook_path: /webhook/torres
settings:
  response_delay_ms: 1200
  error_message: "{{ officer.callsign }} here. Comms are down. Stand by."
personality:
  voice:
    formality_level: 7
knowledge_base:
  files:
    - fleet-structure.yml
    - missing.yml
"#;

    fn write_persona(dir: &Path, id: &str, yaml: &str) {
        let officers = dir.join("officers");
        std::fs::create_dir_all(&officers).unwrap();
        std::fs::write(officers.join(format!("{id}.yml")), yaml).unwrap();
    }

    #[test]
    fn test_yaml_persona_resolves() {
        let dir = tempfile::tempdir().unwrap();
        write_persona(dir.path(), "torres", TORRES_YAML);

        let kb_dir = dir.path().join("knowledge-base");
        std::fs::create_dir_all(&kb_dir).unwrap();
        std::fs::write(
            kb_dir.join("fleet-structure.yml"),
            "divisions:\n  - Intelligence\n  - Operations\n",
        )
        .unwrap();

        std::env::set_var("DISCORD_BOT_TOKEN_TORRES_TEST", "token-abc");
        std::env::set_var("CHANNEL_TORRES_TEST", "123456789");
        std::env::remove_var("CHANNEL_TORRES_UNSET_TEST");

        let config = PersonaConfig::load("torres", dir.path()).unwrap();

        assert_eq!(config.id, "torres");
        assert_eq!(config.name, "Major Torres");
        assert_eq!(config.callsign_or_name(), "Spyglass");
        assert_eq!(config.token, "token-abc");
        assert_eq!(config.webhook.path, "/webhook/torres");
        assert_eq!(config.response_delay_ms, 1200);
        assert_eq!(config.active_channels, vec!["123456789".to_string()]);
        assert_eq!(config.command_roles, vec!["Commander", "Command Staff"]);
        assert!(config.error_message.as_deref().unwrap().contains("{{ officer.callsign }}"));

        // Present file loaded under its stem, missing file skipped.
        assert!(config.knowledge_base.contains_key("fleet-structure"));
        assert!(!config.knowledge_base.contains_key("missing"));
        assert!(config.has_engine_config());
    }

    #[test]
    fn test_missing_persona_file_is_config_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let result = PersonaConfig::load("ghost", dir.path());
        assert!(matches!(result, Err(Error::ConfigNotFound { .. })));
    }

    #[test]
    fn test_empty_officer_id_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = TORRES_YAML.replace("id: torres", "id: \"\"");
        write_persona(dir.path(), "blank", &yaml);

        let result = PersonaConfig::load("blank", dir.path());
        match result {
            Err(Error::ConfigInvalid { reason }) => assert!(reason.contains("officer.id")),
            other => panic!("expected ConfigInvalid, got {other:?}"),
        }
    }

    #[test]
    fn test_formality_level_out_of_range_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = TORRES_YAML.replace("formality_level: 7", "formality_level: 11");
        write_persona(dir.path(), "stiff", &yaml);

        let result = PersonaConfig::load("stiff", dir.path());
        match result {
            Err(Error::ConfigInvalid { reason }) => {
                assert!(reason.contains("formality_level"));
            }
            other => panic!("expected ConfigInvalid, got {other:?}"),
        }
    }

    #[test]
    fn test_unset_token_env_is_secret_missing() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = TORRES_YAML.replace(
            "token_env: DISCORD_BOT_TOKEN_TORRES_TEST",
            "token_env: DISCORD_BOT_TOKEN_NEVER_SET_TEST",
        );
        write_persona(dir.path(), "untokened", &yaml);

        std::env::remove_var("DISCORD_BOT_TOKEN_NEVER_SET_TEST");

        let result = PersonaConfig::load("untokened", dir.path());
        match result {
            Err(Error::SecretMissing { var }) => {
                assert_eq!(var, "DISCORD_BOT_TOKEN_NEVER_SET_TEST");
            }
            other => panic!("expected SecretMissing, got {other:?}"),
        }
    }

    #[test]
    fn test_webhook_target_prod_override() {
        let target = WebhookTarget {
            base_url: "http://localhost:5678".into(),
            path: "/webhook/torres".into(),
            prod_url: None,
        };
        assert_eq!(target.url(), "http://localhost:5678/webhook/torres");

        let target = WebhookTarget {
            prod_url: Some("https://n8n.example.com".into()),
            ..target
        };
        assert_eq!(target.url(), "https://n8n.example.com/webhook/torres");
    }
}
