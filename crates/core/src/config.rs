use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound for `generation.max_in_flight`.
pub const MAX_IN_FLIGHT_LIMIT: usize = 1024;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub generation: GenerationConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

/// Provider selection and credentials, captured once by the provider factory.
#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub enabled: bool,
    pub provider: String,
    pub tongyi: ProviderSettings,
    pub openai: ProviderSettings,
}

/// Per-provider settings. Unset values fall back to the provider's own defaults.
#[derive(Clone, Debug, Default)]
pub struct ProviderSettings {
    pub api_key: Option<SecretString>,
    pub model: Option<String>,
    pub endpoint: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Clone, Debug)]
pub struct GenerationConfig {
    pub timeout_secs: u64,
    pub max_in_flight: usize,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
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
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_enabled: Option<bool>,
    pub llm_provider: Option<String>,
    pub tongyi_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub generation_timeout_secs: Option<u64>,
    pub generation_max_in_flight: Option<usize>,
    pub server_port: Option<u16>,
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
            database: DatabaseConfig {
                url: "sqlite://buycar.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                enabled: false,
                provider: "tongyi".to_string(),
                tongyi: ProviderSettings::default(),
                openai: ProviderSettings::default(),
            },
            generation: GenerationConfig { timeout_secs: 60, max_in_flight: 8 },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("buycar.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(enabled) = llm.enabled {
                self.llm.enabled = enabled;
            }
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(tongyi) = llm.tongyi {
                tongyi.apply_to(&mut self.llm.tongyi);
            }
            if let Some(openai) = llm.openai {
                openai.apply_to(&mut self.llm.openai);
            }
        }

        if let Some(generation) = patch.generation {
            if let Some(timeout_secs) = generation.timeout_secs {
                self.generation.timeout_secs = timeout_secs;
            }
            if let Some(max_in_flight) = generation.max_in_flight {
                self.generation.max_in_flight = max_in_flight;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
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
        if let Some(value) = read_env("BUYCAR_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("BUYCAR_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("BUYCAR_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("BUYCAR_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("BUYCAR_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("BUYCAR_LLM_ENABLED") {
            self.llm.enabled = parse_bool("BUYCAR_LLM_ENABLED", &value)?;
        }
        if let Some(value) = read_env("BUYCAR_LLM_PROVIDER") {
            self.llm.provider = value;
        }
        apply_provider_env("BUYCAR_LLM_TONGYI", &mut self.llm.tongyi)?;
        apply_provider_env("BUYCAR_LLM_OPENAI", &mut self.llm.openai)?;

        if let Some(value) = read_env("BUYCAR_GENERATION_TIMEOUT_SECS") {
            self.generation.timeout_secs = parse_u64("BUYCAR_GENERATION_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("BUYCAR_GENERATION_MAX_IN_FLIGHT") {
            self.generation.max_in_flight =
                parse_usize("BUYCAR_GENERATION_MAX_IN_FLIGHT", &value)?;
        }

        if let Some(value) = read_env("BUYCAR_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("BUYCAR_SERVER_PORT") {
            self.server.port = parse_u16("BUYCAR_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("BUYCAR_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("BUYCAR_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level = read_env("BUYCAR_LOGGING_LEVEL").or_else(|| read_env("BUYCAR_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("BUYCAR_LOGGING_FORMAT").or_else(|| read_env("BUYCAR_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(enabled) = overrides.llm_enabled {
            self.llm.enabled = enabled;
        }
        if let Some(provider) = overrides.llm_provider {
            self.llm.provider = provider;
        }
        if let Some(api_key) = overrides.tongyi_api_key {
            self.llm.tongyi.api_key = Some(secret_value(api_key));
        }
        if let Some(api_key) = overrides.openai_api_key {
            self.llm.openai.api_key = Some(secret_value(api_key));
        }
        if let Some(timeout_secs) = overrides.generation_timeout_secs {
            self.generation.timeout_secs = timeout_secs;
        }
        if let Some(max_in_flight) = overrides.generation_max_in_flight {
            self.generation.max_in_flight = max_in_flight;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_generation(&self.generation)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("buycar.toml"), PathBuf::from("config/buycar.toml")]
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

fn apply_provider_env(prefix: &str, settings: &mut ProviderSettings) -> Result<(), ConfigError> {
    if let Some(value) = read_env(&format!("{prefix}_API_KEY")) {
        settings.api_key = Some(secret_value(value));
    }
    if let Some(value) = read_env(&format!("{prefix}_MODEL")) {
        settings.model = Some(value);
    }
    if let Some(value) = read_env(&format!("{prefix}_ENDPOINT")) {
        settings.endpoint = Some(value);
    }
    let timeout_key = format!("{prefix}_TIMEOUT_SECS");
    if let Some(value) = read_env(&timeout_key) {
        settings.timeout_secs = Some(parse_u64(&timeout_key, &value)?);
    }
    Ok(())
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

// Provider name and credentials are checked by the provider factory at generation time so that a
// misconfigured provider fails the consult instead of the process.
fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    for (name, settings) in [("tongyi", &llm.tongyi), ("openai", &llm.openai)] {
        if let Some(endpoint) = &settings.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(ConfigError::Validation(format!(
                    "llm.{name}.endpoint must start with http:// or https://"
                )));
            }
        }
        if settings.timeout_secs.is_some_and(|secs| secs > 300) {
            return Err(ConfigError::Validation(format!(
                "llm.{name}.timeout_secs must be at most 300"
            )));
        }
    }

    Ok(())
}

fn validate_generation(generation: &GenerationConfig) -> Result<(), ConfigError> {
    if generation.timeout_secs == 0 || generation.timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "generation.timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    if generation.max_in_flight == 0 || generation.max_in_flight > MAX_IN_FLIGHT_LIMIT {
        return Err(ConfigError::Validation(format!(
            "generation.max_in_flight must be in range 1..={MAX_IN_FLIGHT_LIMIT}"
        )));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
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

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| invalid_override(key, value))
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| invalid_override(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| invalid_override(key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| invalid_override(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    generation: Option<GenerationPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    enabled: Option<bool>,
    provider: Option<String>,
    tongyi: Option<ProviderPatch>,
    openai: Option<ProviderPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderPatch {
    api_key: Option<String>,
    model: Option<String>,
    endpoint: Option<String>,
    timeout_secs: Option<u64>,
}

impl ProviderPatch {
    fn apply_to(self, settings: &mut ProviderSettings) {
        if let Some(api_key) = self.api_key {
            settings.api_key = Some(secret_value(api_key));
        }
        if let Some(model) = self.model {
            settings.model = Some(model);
        }
        if let Some(endpoint) = self.endpoint {
            settings.endpoint = Some(endpoint);
        }
        if let Some(timeout_secs) = self.timeout_secs {
            settings.timeout_secs = Some(timeout_secs);
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct GenerationPatch {
    timeout_secs: Option<u64>,
    max_in_flight: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{
        AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat, MAX_IN_FLIGHT_LIMIT,
    };

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_leave_generation_disabled() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(!config.llm.enabled, "llm should be disabled by default")?;
        ensure(config.llm.provider == "tongyi", "default provider should be tongyi")?;
        ensure(config.generation.timeout_secs == 60, "default generation timeout is 60s")?;
        ensure(config.generation.max_in_flight == 8, "default in-flight bound is 8")?;
        ensure(
            matches!(config.logging.format, LogFormat::Compact),
            "default logging format should be compact",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_TONGYI_KEY", "sk-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("buycar.toml");
            fs::write(
                &path,
                r#"
[llm]
enabled = true
provider = "tongyi"

[llm.tongyi]
api_key = "${TEST_TONGYI_KEY}"
model = "qwen-max"
timeout_secs = 0
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.llm.enabled, "llm should be enabled from file")?;
            ensure(
                config.llm.tongyi.api_key.as_ref().map(|key| key.expose_secret())
                    == Some("sk-from-env"),
                "api key should be loaded from environment",
            )?;
            ensure(
                config.llm.tongyi.model.as_deref() == Some("qwen-max"),
                "model should come from the file",
            )?;
            ensure(
                config.llm.tongyi.timeout_secs == Some(0),
                "a zero provider timeout is kept and defaulted by the client",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_TONGYI_KEY"]);
        result
    }

    #[test]
    fn missing_interpolation_variable_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("buycar.toml");
        fs::write(&path, "[llm.openai]\napi_key = \"${BUYCAR_TEST_UNSET_KEY}\"\n")
            .map_err(|err| err.to_string())?;

        match AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() }) {
            Err(ConfigError::MissingEnvInterpolation { var }) => {
                ensure(var == "BUYCAR_TEST_UNSET_KEY", "error should name the variable")
            }
            other => Err(format!("expected interpolation failure, got {other:?}")),
        }
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("BUYCAR_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("BUYCAR_LLM_PROVIDER", "openai");
        env::set_var("BUYCAR_LLM_OPENAI_API_KEY", "sk-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("buycar.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[llm]
provider = "tongyi"

[llm.openai]
api_key = "sk-from-file"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.llm.provider == "openai", "env provider should win over file")?;
            ensure(
                config.llm.openai.api_key.as_ref().map(|key| key.expose_secret())
                    == Some("sk-from-env"),
                "env api key should win over file",
            )?;
            Ok(())
        })();

        clear_vars(&["BUYCAR_DATABASE_URL", "BUYCAR_LLM_PROVIDER", "BUYCAR_LLM_OPENAI_API_KEY"]);
        result
    }

    #[test]
    fn invalid_env_override_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("BUYCAR_LLM_ENABLED", "maybe");

        let result = match AppConfig::load(LoadOptions::default()) {
            Err(ConfigError::InvalidEnvOverride { key, .. }) => {
                ensure(key == "BUYCAR_LLM_ENABLED", "error should name the variable")
            }
            other => Err(format!("expected invalid override, got {other:?}")),
        };

        clear_vars(&["BUYCAR_LLM_ENABLED"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let error = match AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                generation_max_in_flight: Some(0),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }) {
            Ok(_) => {
                return Err("expected validation failure but config load succeeded".to_string())
            }
            Err(error) => error,
        };
        let has_message = matches!(
            error,
            ConfigError::Validation(ref message) if message.contains("generation.max_in_flight")
        );
        ensure(has_message, "validation failure should mention generation.max_in_flight")
    }

    #[test]
    fn oversized_generation_limit_is_rejected_from_env() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("BUYCAR_GENERATION_MAX_IN_FLIGHT", usize::MAX.to_string());

        let result = match AppConfig::load(LoadOptions::default()) {
            Err(ConfigError::Validation(message)) => ensure(
                message.contains("generation.max_in_flight"),
                "validation failure should mention generation.max_in_flight",
            ),
            other => Err(format!("expected validation failure, got {other:?}")),
        };

        clear_vars(&["BUYCAR_GENERATION_MAX_IN_FLIGHT"]);
        result
    }

    #[test]
    fn generation_limit_accepts_the_upper_bound() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                generation_max_in_flight: Some(MAX_IN_FLIGHT_LIMIT),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.generation.max_in_flight == MAX_IN_FLIGHT_LIMIT, "limit should be kept")
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("BUYCAR_LLM_TONGYI_API_KEY", "sk-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("sk-secret-value"), "debug output should not contain api key")
        })();

        clear_vars(&["BUYCAR_LLM_TONGYI_API_KEY"]);
        result
    }
}
