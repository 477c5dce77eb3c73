use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// What to do with an input that arrives while its session is busy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BusyPolicy {
    /// Defer the input and process it after the current run, in arrival
    /// order.
    Queue,
    /// Reject the input with a `SESSION_BUSY` error.
    Reject,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub openai_api_key: String,
    pub openai_api_base: String,
    pub chat_model: String,
    pub stt_api_url: String,
    pub tts_api_url: String,
    pub tts_audio_format: String,
    pub system_prompt_path: Option<PathBuf>,
    pub stage_timeout: Duration,
    pub responder_streaming: bool,
    pub busy_policy: BusyPolicy,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let openai_api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))?;
        let openai_api_base = std::env::var("OPENAI_API_BASE")
            .unwrap_or_else(|_| "https://api.openai.com/v1/".to_string());
        let chat_model = std::env::var("CHAT_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());

        let stt_api_url =
            std::env::var("STT_API_URL").unwrap_or_else(|_| "http://localhost:8000".to_string());
        let tts_api_url =
            std::env::var("TTS_API_URL").unwrap_or_else(|_| "http://localhost:9880".to_string());
        let tts_audio_format =
            std::env::var("TTS_AUDIO_FORMAT").unwrap_or_else(|_| "wav".to_string());

        let system_prompt_path = std::env::var("SYSTEM_PROMPT_PATH").map(PathBuf::from).ok();

        let stage_timeout_str =
            std::env::var("STAGE_TIMEOUT_SECS").unwrap_or_else(|_| "60".to_string());
        let stage_timeout = stage_timeout_str
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| {
                ConfigError::InvalidValue("STAGE_TIMEOUT_SECS".to_string(), e.to_string())
            })?;

        let responder_streaming_str =
            std::env::var("RESPONDER_STREAMING").unwrap_or_else(|_| "false".to_string());
        let responder_streaming = responder_streaming_str.parse::<bool>().map_err(|_| {
            ConfigError::InvalidValue(
                "RESPONDER_STREAMING".to_string(),
                format!("'{}' is not a boolean", responder_streaming_str),
            )
        })?;

        let busy_policy_str =
            std::env::var("BUSY_POLICY").unwrap_or_else(|_| "queue".to_string());
        let busy_policy = match busy_policy_str.to_lowercase().as_str() {
            "queue" => BusyPolicy::Queue,
            "reject" => BusyPolicy::Reject,
            other => {
                return Err(ConfigError::InvalidValue(
                    "BUSY_POLICY".to_string(),
                    format!("'{}' is neither 'queue' nor 'reject'", other),
                ));
            }
        };

        Ok(Self {
            bind_address,
            log_level,
            openai_api_key,
            openai_api_base,
            chat_model,
            stt_api_url,
            tts_api_url,
            tts_audio_format,
            system_prompt_path,
            stage_timeout,
            responder_streaming,
            busy_policy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tracing::Level;

    fn clear_env_vars() {
        unsafe {
            env::remove_var("BIND_ADDRESS");
            env::remove_var("RUST_LOG");
            env::remove_var("OPENAI_API_KEY");
            env::remove_var("OPENAI_API_BASE");
            env::remove_var("CHAT_MODEL");
            env::remove_var("STT_API_URL");
            env::remove_var("TTS_API_URL");
            env::remove_var("TTS_AUDIO_FORMAT");
            env::remove_var("SYSTEM_PROMPT_PATH");
            env::remove_var("STAGE_TIMEOUT_SECS");
            env::remove_var("RESPONDER_STREAMING");
            env::remove_var("BUSY_POLICY");
        }
    }

    fn set_minimal_env() {
        unsafe {
            env::set_var("OPENAI_API_KEY", "test-api-key");
        }
    }

    #[test]
    fn test_config_error_display() {
        let missing_var = ConfigError::MissingVar("TEST_VAR".to_string());
        assert_eq!(
            format!("{}", missing_var),
            "Missing environment variable: TEST_VAR"
        );

        let invalid_value =
            ConfigError::InvalidValue("TEST_VAR".to_string(), "bad_value".to_string());
        assert_eq!(
            format!("{}", invalid_value),
            "Invalid value for environment variable TEST_VAR: bad_value"
        );
    }

    #[test]
    #[serial]
    fn test_config_from_env_minimal() {
        clear_env_vars();
        set_minimal_env();

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "0.0.0.0:3000");
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.openai_api_key, "test-api-key");
        assert_eq!(config.openai_api_base, "https://api.openai.com/v1/");
        assert_eq!(config.chat_model, "gpt-4o");
        assert_eq!(config.stt_api_url, "http://localhost:8000");
        assert_eq!(config.tts_api_url, "http://localhost:9880");
        assert_eq!(config.tts_audio_format, "wav");
        assert_eq!(config.system_prompt_path, None);
        assert_eq!(config.stage_timeout, Duration::from_secs(60));
        assert!(!config.responder_streaming);
        assert_eq!(config.busy_policy, BusyPolicy::Queue);
    }

    #[test]
    #[serial]
    fn test_config_from_env_custom_values() {
        clear_env_vars();
        unsafe {
            env::set_var("BIND_ADDRESS", "127.0.0.1:8080");
            env::set_var("RUST_LOG", "debug");
            env::set_var("OPENAI_API_KEY", "custom-api-key");
            env::set_var("OPENAI_API_BASE", "https://api.deepseek.com/v1");
            env::set_var("CHAT_MODEL", "deepseek-chat");
            env::set_var("STT_API_URL", "http://stt.internal:7000");
            env::set_var("TTS_API_URL", "http://tts.internal:9880");
            env::set_var("TTS_AUDIO_FORMAT", "mp3");
            env::set_var("SYSTEM_PROMPT_PATH", "/etc/anchor/system_prompt.txt");
            env::set_var("STAGE_TIMEOUT_SECS", "15");
            env::set_var("RESPONDER_STREAMING", "true");
            env::set_var("BUSY_POLICY", "reject");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "127.0.0.1:8080");
        assert_eq!(config.log_level, Level::DEBUG);
        assert_eq!(config.openai_api_base, "https://api.deepseek.com/v1");
        assert_eq!(config.chat_model, "deepseek-chat");
        assert_eq!(config.stt_api_url, "http://stt.internal:7000");
        assert_eq!(config.tts_audio_format, "mp3");
        assert_eq!(
            config.system_prompt_path,
            Some(PathBuf::from("/etc/anchor/system_prompt.txt"))
        );
        assert_eq!(config.stage_timeout, Duration::from_secs(15));
        assert!(config.responder_streaming);
        assert_eq!(config.busy_policy, BusyPolicy::Reject);
    }

    #[test]
    #[serial]
    fn test_config_missing_api_key() {
        clear_env_vars();

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::MissingVar(var) => assert_eq!(var, "OPENAI_API_KEY"),
            _ => panic!("Expected MissingVar for OPENAI_API_KEY"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_bind_address() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("BIND_ADDRESS", "not-a-valid-address");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "BIND_ADDRESS"),
            _ => panic!("Expected InvalidValue for BIND_ADDRESS"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_stage_timeout() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("STAGE_TIMEOUT_SECS", "soon");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "STAGE_TIMEOUT_SECS"),
            _ => panic!("Expected InvalidValue for STAGE_TIMEOUT_SECS"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_busy_policy() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("BUSY_POLICY", "drop");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "BUSY_POLICY"),
            _ => panic!("Expected InvalidValue for BUSY_POLICY"),
        }
    }
}
