use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tariffsim_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let source = |key_path: &str, env_key: &str| {
        field_source(key_path, Some(env_key), config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "llm.base_url",
        &config.llm.base_url,
        source("llm.base_url", "TARIFFSIM_LLM_BASE_URL"),
    ));
    lines.push(render_line("llm.model", &config.llm.model, source("llm.model", "TARIFFSIM_LLM_MODEL")));
    let llm_api_key = if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" };
    lines.push(render_line("llm.api_key", llm_api_key, source("llm.api_key", "TARIFFSIM_LLM_API_KEY")));
    lines.push(render_line(
        "llm.temperature",
        &config.llm.temperature.to_string(),
        source("llm.temperature", "TARIFFSIM_LLM_TEMPERATURE"),
    ));
    lines.push(render_line(
        "llm.timeout_secs",
        &config.llm.timeout_secs.to_string(),
        source("llm.timeout_secs", "TARIFFSIM_LLM_TIMEOUT_SECS"),
    ));

    lines.push(render_line(
        "server.bind_address",
        &config.server.bind_address,
        source("server.bind_address", "TARIFFSIM_SERVER_BIND_ADDRESS"),
    ));
    lines.push(render_line(
        "server.port",
        &config.server.port.to_string(),
        source("server.port", "TARIFFSIM_SERVER_PORT"),
    ));
    lines.push(render_line(
        "server.health_check_port",
        &config.server.health_check_port.to_string(),
        source("server.health_check_port", "TARIFFSIM_SERVER_HEALTH_CHECK_PORT"),
    ));

    lines.push(render_line(
        "storage.transcript_dir",
        &config.storage.transcript_dir.display().to_string(),
        source("storage.transcript_dir", "TARIFFSIM_STORAGE_TRANSCRIPT_DIR"),
    ));
    let tariffs_file = config
        .storage
        .tariffs_file
        .as_ref()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "<builtin>".to_string());
    lines.push(render_line(
        "storage.tariffs_file",
        &tariffs_file,
        source("storage.tariffs_file", "TARIFFSIM_STORAGE_TARIFFS_FILE"),
    ));

    lines.push(render_line(
        "simulation.max_turns",
        &config.simulation.max_turns.to_string(),
        source("simulation.max_turns", "TARIFFSIM_SIMULATION_MAX_TURNS"),
    ));
    lines.push(render_line(
        "simulation.history_window",
        &config.simulation.history_window.to_string(),
        source("simulation.history_window", "TARIFFSIM_SIMULATION_HISTORY_WINDOW"),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", "TARIFFSIM_LOGGING_LEVEL"),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", "TARIFFSIM_LOGGING_FORMAT"),
    ));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("tariffsim.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/tariffsim.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

#[cfg(test)]
mod tests {
    use super::{contains_path, field_source, render_line};

    #[test]
    fn contains_path_walks_nested_tables() {
        let doc: toml::Value = "[llm]\nmodel = \"test\"".parse().expect("toml");
        assert!(contains_path(&doc, "llm.model"));
        assert!(!contains_path(&doc, "llm.base_url"));
        assert!(!contains_path(&doc, "server.port"));
    }

    #[test]
    fn field_source_defaults_when_nothing_set() {
        assert_eq!(field_source("llm.model", None, None, None), "default");
    }

    #[test]
    fn render_line_includes_source_attribution() {
        let line = render_line("llm.model", "mistral", "default".to_string());
        assert_eq!(line, "- llm.model = mistral (source: default)");
    }
}
