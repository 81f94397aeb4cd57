use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub simulation: SimulationConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: Option<SecretString>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub timeout_secs: u64,
    /// Fold system-role content into the first user message for backends
    /// that reject the `system` role.
    pub compat_fold_system: bool,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub transcript_dir: PathBuf,
    pub tariffs_file: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct SimulationConfig {
    pub max_turns: u32,
    pub history_window: usize,
    pub session_max_age_minutes: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub llm_base_url: Option<String>,
    pub llm_model: Option<String>,
    pub transcript_dir: Option<PathBuf>,
    pub max_turns: Option<u32>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                base_url: "http://localhost:1234".to_string(),
                api_key: None,
                model: "mistral-7b-instruct-v0.3".to_string(),
                temperature: 0.7,
                max_tokens: None,
                timeout_secs: 60,
                compat_fold_system: true,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                health_check_port: 8081,
                graceful_shutdown_secs: 15,
            },
            storage: StorageConfig {
                transcript_dir: PathBuf::from("conversation_history"),
                tariffs_file: None,
            },
            simulation: SimulationConfig {
                max_turns: 10,
                history_window: 12,
                session_max_age_minutes: 30,
                sweep_interval_secs: 60,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("tariffsim.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(llm) = patch.llm {
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = base_url;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(temperature) = llm.temperature {
                self.llm.temperature = temperature;
            }
            if let Some(max_tokens) = llm.max_tokens {
                self.llm.max_tokens = Some(max_tokens);
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(compat_fold_system) = llm.compat_fold_system {
                self.llm.compat_fold_system = compat_fold_system;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(storage) = patch.storage {
            if let Some(transcript_dir) = storage.transcript_dir {
                self.storage.transcript_dir = transcript_dir;
            }
            if let Some(tariffs_file) = storage.tariffs_file {
                self.storage.tariffs_file = Some(tariffs_file);
            }
        }

        if let Some(simulation) = patch.simulation {
            if let Some(max_turns) = simulation.max_turns {
                self.simulation.max_turns = max_turns;
            }
            if let Some(history_window) = simulation.history_window {
                self.simulation.history_window = history_window;
            }
            if let Some(session_max_age_minutes) = simulation.session_max_age_minutes {
                self.simulation.session_max_age_minutes = session_max_age_minutes;
            }
            if let Some(sweep_interval_secs) = simulation.sweep_interval_secs {
                self.simulation.sweep_interval_secs = sweep_interval_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("TARIFFSIM_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = read_env("TARIFFSIM_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("TARIFFSIM_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("TARIFFSIM_LLM_TEMPERATURE") {
            self.llm.temperature = parse_f32("TARIFFSIM_LLM_TEMPERATURE", &value)?;
        }
        if let Some(value) = read_env("TARIFFSIM_LLM_MAX_TOKENS") {
            self.llm.max_tokens = Some(parse_u32("TARIFFSIM_LLM_MAX_TOKENS", &value)?);
        }
        if let Some(value) = read_env("TARIFFSIM_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("TARIFFSIM_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("TARIFFSIM_LLM_COMPAT_FOLD_SYSTEM") {
            self.llm.compat_fold_system = parse_bool("TARIFFSIM_LLM_COMPAT_FOLD_SYSTEM", &value)?;
        }

        if let Some(value) = read_env("TARIFFSIM_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("TARIFFSIM_SERVER_PORT") {
            self.server.port = parse_u16("TARIFFSIM_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("TARIFFSIM_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("TARIFFSIM_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("TARIFFSIM_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("TARIFFSIM_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("TARIFFSIM_STORAGE_TRANSCRIPT_DIR") {
            self.storage.transcript_dir = PathBuf::from(value);
        }
        if let Some(value) = read_env("TARIFFSIM_STORAGE_TARIFFS_FILE") {
            self.storage.tariffs_file = Some(PathBuf::from(value));
        }

        if let Some(value) = read_env("TARIFFSIM_SIMULATION_MAX_TURNS") {
            self.simulation.max_turns = parse_u32("TARIFFSIM_SIMULATION_MAX_TURNS", &value)?;
        }
        if let Some(value) = read_env("TARIFFSIM_SIMULATION_HISTORY_WINDOW") {
            self.simulation.history_window =
                parse_u32("TARIFFSIM_SIMULATION_HISTORY_WINDOW", &value)? as usize;
        }
        if let Some(value) = read_env("TARIFFSIM_SIMULATION_SESSION_MAX_AGE_MINUTES") {
            self.simulation.session_max_age_minutes =
                parse_u64("TARIFFSIM_SIMULATION_SESSION_MAX_AGE_MINUTES", &value)?;
        }
        if let Some(value) = read_env("TARIFFSIM_SIMULATION_SWEEP_INTERVAL_SECS") {
            self.simulation.sweep_interval_secs =
                parse_u64("TARIFFSIM_SIMULATION_SWEEP_INTERVAL_SECS", &value)?;
        }

        let log_level =
            read_env("TARIFFSIM_LOGGING_LEVEL").or_else(|| read_env("TARIFFSIM_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("TARIFFSIM_LOGGING_FORMAT").or_else(|| read_env("TARIFFSIM_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(llm_base_url) = overrides.llm_base_url {
            self.llm.base_url = llm_base_url;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(transcript_dir) = overrides.transcript_dir {
            self.storage.transcript_dir = transcript_dir;
        }
        if let Some(max_turns) = overrides.max_turns {
            self.simulation.max_turns = max_turns;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_llm(&self.llm)?;
        validate_server(&self.server)?;
        validate_storage(&self.storage)?;
        validate_simulation(&self.simulation)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("tariffsim.toml"), PathBuf::from("config/tariffsim.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    let base_url = llm.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "llm.base_url must start with http:// or https://".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if !(0.0..=2.0).contains(&llm.temperature) {
        return Err(ConfigError::Validation(
            "llm.temperature must be in range 0.0..=2.0".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.port == server.health_check_port {
        return Err(ConfigError::Validation(
            "server.port and server.health_check_port must differ".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_storage(storage: &StorageConfig) -> Result<(), ConfigError> {
    if storage.transcript_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "storage.transcript_dir must not be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_simulation(simulation: &SimulationConfig) -> Result<(), ConfigError> {
    if simulation.max_turns == 0 || simulation.max_turns > 50 {
        return Err(ConfigError::Validation(
            "simulation.max_turns must be in range 1..=50".to_string(),
        ));
    }

    if simulation.history_window == 0 {
        return Err(ConfigError::Validation(
            "simulation.history_window must be greater than zero".to_string(),
        ));
    }

    if simulation.session_max_age_minutes == 0 {
        return Err(ConfigError::Validation(
            "simulation.session_max_age_minutes must be greater than zero".to_string(),
        ));
    }

    if simulation.sweep_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "simulation.sweep_interval_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_f32(key: &str, value: &str) -> Result<f32, ConfigError> {
    value.parse::<f32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    llm: Option<LlmPatch>,
    server: Option<ServerPatch>,
    storage: Option<StoragePatch>,
    simulation: Option<SimulationPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    base_url: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    timeout_secs: Option<u64>,
    compat_fold_system: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct StoragePatch {
    transcript_dir: Option<PathBuf>,
    tariffs_file: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct SimulationPatch {
    max_turns: Option<u32>,
    history_window: Option<usize>,
    session_max_age_minutes: Option<u64>,
    sweep_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
