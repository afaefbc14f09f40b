//! Startup configuration, loaded entirely from environment variables
//! (spec §6: "nothing else affects behavior").

use std::env;
use std::fmt;

/// Endpoint + credential for one external streaming service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub url: String,
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub asr: ServiceConfig,
    pub llm: ServiceConfig,
    pub llm_model: String,
    pub tts: ServiceConfig,
    pub tts_voice: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn required_env(name: &str) -> Result<String, String> {
    env::var(name).map_err(|_| format!("{name} is not set"))
}

impl Config {
    /// Load configuration from the process environment. Missing/invalid
    /// required variables are collected, not returned on first failure, so
    /// `validate()` can report every problem at once (mirrors the teacher's
    /// `Config::validate()` -> `Vec<ConfigIssue>` pattern).
    pub fn from_env() -> (Config, Vec<ConfigIssue>) {
        let mut issues = Vec::new();

        let mut take = |name: &'static str| match required_env(name) {
            Ok(v) => v,
            Err(message) => {
                issues.push(ConfigIssue { field: name, message });
                String::new()
            }
        };

        let asr = ServiceConfig {
            url: take("VOICEAGENT_ASR_URL"),
            api_key: take("VOICEAGENT_ASR_API_KEY"),
        };
        let llm = ServiceConfig {
            url: take("VOICEAGENT_LLM_URL"),
            api_key: take("VOICEAGENT_LLM_API_KEY"),
        };
        let llm_model = take("VOICEAGENT_LLM_MODEL");
        let tts = ServiceConfig {
            url: take("VOICEAGENT_TTS_URL"),
            api_key: take("VOICEAGENT_TTS_API_KEY"),
        };
        let tts_voice = take("VOICEAGENT_TTS_VOICE");

        let host = env::var("VOICEAGENT_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("VOICEAGENT_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        (
            Config {
                asr,
                llm,
                llm_model,
                tts,
                tts_voice,
                host,
                port,
            },
            issues,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize tests that touch them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn missing_required_vars_are_collected() {
        let _guard = ENV_LOCK.lock().unwrap();
        for var in [
            "VOICEAGENT_ASR_URL",
            "VOICEAGENT_ASR_API_KEY",
            "VOICEAGENT_LLM_URL",
            "VOICEAGENT_LLM_API_KEY",
            "VOICEAGENT_LLM_MODEL",
            "VOICEAGENT_TTS_URL",
            "VOICEAGENT_TTS_API_KEY",
            "VOICEAGENT_TTS_VOICE",
        ] {
            env::remove_var(var);
        }
        let (_config, issues) = Config::from_env();
        assert_eq!(issues.len(), 8);
    }

    #[test]
    fn port_defaults_when_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::remove_var("VOICEAGENT_PORT");
        let (config, _) = Config::from_env();
        assert_eq!(config.port, 8080);
    }
}
