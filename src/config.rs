//! Startup configuration: raw TOML settings and the validated, immutable `Settings`

use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

use crate::error::{DeployError, Result};
use crate::resolver::{BRANCH_REF_PREFIX, BranchMatcher, BranchRule};

pub const DEFAULT_CONFIG_PATH: &str = "deployserver.toml";
pub const DEFAULT_LISTEN_HOST: &str = "0.0.0.0";
pub const DEFAULT_CALLBACK_PATH: &str = "/callback";
pub const DEFAULT_LEGACY_BRANCH: &str = "master";

/// Settings exactly as written in the TOML file.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RawConfig {
    pub server_address: Option<String>,
    pub listen_port: Option<u16>,
    pub listen_host: Option<String>,
    pub callback_path: Option<String>,
    pub legacy_deploy_command: Option<String>,
    pub legacy_branch: Option<String>,
    pub secret_token: Option<String>,
    pub log_directory: Option<PathBuf>,
    #[serde(default)]
    pub rules: Vec<RawRule>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RawRule {
    pub name: Option<String>,
    pub regexp: Option<String>,
    pub script: String,
}

impl RawConfig {
    /// Overrides file values with `DEPLOYSERVER_*` environment variables when set.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(host) = std::env::var("DEPLOYSERVER_LISTEN_HOST") {
            self.listen_host = Some(host);
        }
        if let Ok(port) = std::env::var("DEPLOYSERVER_LISTEN_PORT") {
            let port = port.parse::<u16>().map_err(|e| {
                DeployError::ConfigError(format!(
                    "DEPLOYSERVER_LISTEN_PORT '{}' is not a valid port: {}",
                    port, e
                ))
            })?;
            self.listen_port = Some(port);
        }
        if let Ok(secret) = std::env::var("DEPLOYSERVER_SECRET_TOKEN") {
            self.secret_token = Some(secret);
        }
        Ok(())
    }
}

/// The single-branch rule kept for configs that predate `[[rules]]`.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyRule {
    /// Fully-qualified, e.g. `refs/heads/master`.
    pub branch_ref: String,
    pub deploy_command: String,
}

/// Validated configuration. Built once at startup and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server_address: String,
    pub listen_host: String,
    pub listen_port: u16,
    pub callback_path: String,
    pub legacy_rule: Option<LegacyRule>,
    pub rules: Vec<BranchRule>,
    pub secret: Option<String>,
    pub log_directory: Option<PathBuf>,
}

impl Settings {
    pub fn from_raw(raw: RawConfig) -> Result<Self> {
        let server_address = raw
            .server_address
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| DeployError::ConfigError("'server_address' is required".into()))?;
        let listen_port = raw
            .listen_port
            .ok_or_else(|| DeployError::ConfigError("'listen_port' is required".into()))?;

        let callback_path = raw
            .callback_path
            .unwrap_or_else(|| DEFAULT_CALLBACK_PATH.to_string());
        if !callback_path.starts_with('/') {
            return Err(DeployError::ConfigError(format!(
                "'callback_path' must start with '/', got '{}'",
                callback_path
            )));
        }

        let legacy_branch = raw
            .legacy_branch
            .unwrap_or_else(|| DEFAULT_LEGACY_BRANCH.to_string());
        let legacy_rule = raw
            .legacy_deploy_command
            .filter(|cmd| !cmd.trim().is_empty())
            .map(|deploy_command| LegacyRule {
                branch_ref: normalize_branch_ref(&legacy_branch),
                deploy_command,
            });

        let rules = raw
            .rules
            .into_iter()
            .enumerate()
            .map(|(idx, rule)| build_rule(idx, rule))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            server_address: server_address.trim_end_matches('/').to_string(),
            listen_host: raw
                .listen_host
                .unwrap_or_else(|| DEFAULT_LISTEN_HOST.to_string()),
            listen_port,
            callback_path,
            legacy_rule,
            rules,
            secret: raw.secret_token.filter(|s| !s.is_empty()),
            log_directory: raw.log_directory,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.listen_host, self.listen_port)
    }

    /// The payload URL to register with the hosting provider.
    ///
    /// ngrok tunnels forward on the default port, so the port is left out for them.
    pub fn webhook_url(&self) -> String {
        if self.server_address.ends_with("ngrok.io") {
            format!("{}{}", self.server_address, self.callback_path)
        } else {
            format!(
                "{}:{}{}",
                self.server_address, self.listen_port, self.callback_path
            )
        }
    }

    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref()
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        Self {
            server_address: "http://localhost".to_string(),
            listen_host: DEFAULT_LISTEN_HOST.to_string(),
            listen_port: 2345,
            callback_path: DEFAULT_CALLBACK_PATH.to_string(),
            legacy_rule: None,
            rules: Vec::new(),
            secret: None,
            log_directory: None,
        }
    }
}

fn normalize_branch_ref(branch: &str) -> String {
    if branch.starts_with(BRANCH_REF_PREFIX) {
        branch.to_string()
    } else {
        format!("{}{}", BRANCH_REF_PREFIX, branch)
    }
}

fn build_rule(idx: usize, rule: RawRule) -> Result<BranchRule> {
    if rule.script.trim().is_empty() {
        return Err(DeployError::ConfigError(format!(
            "rule #{} has an empty 'script'",
            idx + 1
        )));
    }
    let matcher = match (rule.name, rule.regexp) {
        (Some(name), None) => BranchMatcher::ExactName(name),
        (None, Some(pattern)) => BranchMatcher::pattern(&pattern)?,
        (Some(_), Some(_)) => {
            return Err(DeployError::ConfigError(format!(
                "rule #{} sets both 'name' and 'regexp'",
                idx + 1
            )));
        }
        (None, None) => {
            return Err(DeployError::ConfigError(format!(
                "rule #{} needs either 'name' or 'regexp'",
                idx + 1
            )));
        }
    };
    Ok(BranchRule {
        matcher,
        deploy_command: rule.script,
    })
}

/// Parse a TOML document into validated settings, without consulting the environment.
pub fn parse_settings(config_str: &str) -> Result<Settings> {
    let raw: RawConfig = toml::from_str(config_str)?;
    Settings::from_raw(raw)
}

/// Load the configuration file, apply environment overrides and validate.
pub fn load_config(path: &str) -> Result<Settings> {
    let config_str = fs::read_to_string(path).map_err(|e| {
        DeployError::ConfigError(format!("Failed to read config file '{}': {}", path, e))
    })?;

    let mut raw: RawConfig = toml::from_str(&config_str)?;
    raw.apply_env_overrides()?;

    Settings::from_raw(raw)
}
