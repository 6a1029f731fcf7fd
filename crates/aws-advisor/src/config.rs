use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use advisor_common::assistant::AssistantConfig;

use crate::error::AppError;
use crate::pipeline::{Personas, Timeouts};

/// Application configuration loaded explicitly from environment variables.
///
/// Every setting has a default; a value that is set but malformed is a config error rather
/// than silently falling back.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address for the HTTP server.
    pub bind: SocketAddr,
    /// Directory holding one guideline file per service (`ec2.md`, `iam.md`, ...).
    pub guidelines_dir: PathBuf,
    /// File holding the user context.
    pub user_context_path: PathBuf,
    pub assistant: AssistantConfig,
    pub personas: Personas,
    pub timeouts: Timeouts,
    /// Whether any stderr output from the assistant fails the request.
    pub stderr_fatal: bool,
    pub cloudtrail_region: String,
    pub cloudtrail_max_results: i32,
}

impl Config {
    /// Optional:
    /// - `ADVISOR_BIND` (default: "0.0.0.0:5000")
    /// - `GUIDELINES_DIR` (default: "./guidelines")
    /// - `USER_CONTEXT_PATH` (default: "user-situation")
    /// - `ASSISTANT_BIN` (default: "q"), `ASSISTANT_ARGS` (default: "chat")
    /// - `CLASSIFY_TIMEOUT_SECS`, `ANALYSIS_TIMEOUT_SECS`, `PROMPT_TIMEOUT_SECS` (default: 120),
    ///   `CHAT_TIMEOUT_SECS` (default: 30)
    /// - `CLASSIFY_AGENT`, `SECURITY_ON_AGENT`, `SECURITY_OFF_AGENT`, `PROMPT_AGENT`
    /// - `ASSISTANT_STDERR_FATAL` (default: true)
    /// - `CLOUDTRAIL_REGION` (default: "us-east-1"), `CLOUDTRAIL_MAX_RESULTS` (default: 50)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let env = Env(lookup);

        let bind = env
            .string("ADVISOR_BIND", "0.0.0.0:5000")
            .parse::<SocketAddr>()
            .map_err(|e| AppError::Config(format!("ADVISOR_BIND is not a socket address: {e}")))?;

        let assistant = AssistantConfig {
            program: env.string("ASSISTANT_BIN", "q"),
            args: env
                .string("ASSISTANT_ARGS", "chat")
                .split_whitespace()
                .map(str::to_string)
                .collect(),
        };

        let defaults = Personas::default();
        let personas = Personas {
            classify: env.string("CLASSIFY_AGENT", &defaults.classify),
            security_on: env.string("SECURITY_ON_AGENT", &defaults.security_on),
            security_off: env.string("SECURITY_OFF_AGENT", &defaults.security_off),
            prompt: env.string("PROMPT_AGENT", &defaults.prompt),
        };

        let defaults = Timeouts::default();
        let timeouts = Timeouts {
            classify: env.secs("CLASSIFY_TIMEOUT_SECS", defaults.classify)?,
            analysis: env.secs("ANALYSIS_TIMEOUT_SECS", defaults.analysis)?,
            prompt: env.secs("PROMPT_TIMEOUT_SECS", defaults.prompt)?,
            chat: env.secs("CHAT_TIMEOUT_SECS", defaults.chat)?,
        };

        let cloudtrail_max_results: i32 = env.parsed("CLOUDTRAIL_MAX_RESULTS", 50)?;
        if !(1..=50).contains(&cloudtrail_max_results) {
            return Err(AppError::Config(
                "CLOUDTRAIL_MAX_RESULTS must be between 1 and 50".to_string(),
            ));
        }

        Ok(Self {
            bind,
            guidelines_dir: env.string("GUIDELINES_DIR", "./guidelines").into(),
            user_context_path: env.string("USER_CONTEXT_PATH", "user-situation").into(),
            assistant,
            personas,
            timeouts,
            stderr_fatal: env.parsed("ASSISTANT_STDERR_FATAL", true)?,
            cloudtrail_region: env.string("CLOUDTRAIL_REGION", "us-east-1"),
            cloudtrail_max_results,
        })
    }
}

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn string(&self, key: &str, default: &str) -> String {
        (self.0)(key)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| default.to_string())
    }

    fn parsed<T>(&self, key: &str, default: T) -> Result<T, AppError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match (self.0)(key).filter(|v| !v.trim().is_empty()) {
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .map_err(|e| AppError::Config(format!("{key}={raw:?} is invalid: {e}"))),
            None => Ok(default),
        }
    }

    fn secs(&self, key: &str, default: Duration) -> Result<Duration, AppError> {
        let secs = self.parsed(key, default.as_secs())?;
        if secs == 0 {
            return Err(AppError::Config(format!("{key} must be greater than zero")));
        }
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<Config, AppError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_match_the_deployed_service() {
        let config = config(&[]).unwrap();
        assert_eq!(config.bind.port(), 5000);
        assert_eq!(config.user_context_path, PathBuf::from("user-situation"));
        assert_eq!(config.assistant.program, "q");
        assert_eq!(config.assistant.args, ["chat"]);
        assert_eq!(config.personas.classify, "checkAction");
        assert_eq!(config.timeouts.analysis, Duration::from_secs(120));
        assert_eq!(config.timeouts.chat, Duration::from_secs(30));
        assert!(config.stderr_fatal);
        assert_eq!(config.cloudtrail_region, "us-east-1");
        assert_eq!(config.cloudtrail_max_results, 50);
    }

    #[test]
    fn overrides_are_applied() {
        let config = config(&[
            ("ASSISTANT_BIN", "/opt/q/bin/q"),
            ("ASSISTANT_ARGS", "chat --verbose"),
            ("CLASSIFY_TIMEOUT_SECS", "15"),
            ("ASSISTANT_STDERR_FATAL", "false"),
            ("SECURITY_ON_AGENT", "strict-reviewer"),
        ])
        .unwrap();
        assert_eq!(config.assistant.program, "/opt/q/bin/q");
        assert_eq!(config.assistant.args, ["chat", "--verbose"]);
        assert_eq!(config.timeouts.classify, Duration::from_secs(15));
        assert!(!config.stderr_fatal);
        assert_eq!(config.personas.security_on, "strict-reviewer");
    }

    #[test]
    fn malformed_values_are_rejected() {
        for vars in [
            [("ADVISOR_BIND", "localhost")],
            [("ANALYSIS_TIMEOUT_SECS", "soon")],
            [("CHAT_TIMEOUT_SECS", "0")],
            [("ASSISTANT_STDERR_FATAL", "yes")],
            [("CLOUDTRAIL_MAX_RESULTS", "500")],
        ] {
            assert!(
                matches!(config(&vars), Err(AppError::Config(_))),
                "{vars:?} should be rejected"
            );
        }
    }
}
