use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub harvest: HarvestConfig,
    /// Institutions keyed by a short name, e.g. `[institutions.uiuc]`.
    #[serde(default)]
    pub institutions: BTreeMap<String, InstitutionConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
    /// Route the protocol endpoint is mounted on.
    #[serde(default = "default_path")]
    pub path: String,
    /// Institution answering requests whose host matches no `fqdn`.
    #[serde(default)]
    pub default_institution: Option<String>,
}

fn default_path() -> String {
    "/oai-pmh".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct HarvestConfig {
    /// Records, headers or sets per list page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_page_size() -> usize {
    100
}
fn default_request_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct InstitutionConfig {
    /// Host name; also the namespace part of OAI identifiers.
    pub fqdn: String,
    pub repository_name: String,
    pub base_url: String,
    pub admin_email: String,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

/// Parses and validates a config document.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.harvest.page_size == 0 {
        anyhow::bail!("harvest.page_size must be > 0");
    }
    if config.harvest.request_timeout_secs == 0 {
        anyhow::bail!("harvest.request_timeout_secs must be > 0");
    }

    if !config.server.path.starts_with('/') {
        anyhow::bail!("server.path must start with '/': {}", config.server.path);
    }

    if config.institutions.is_empty() {
        anyhow::bail!("at least one [institutions.<key>] section is required");
    }

    let mut hosts: HashMap<String, &str> = HashMap::new();
    for (key, institution) in &config.institutions {
        if institution.fqdn.trim().is_empty() {
            anyhow::bail!("institutions.{}.fqdn must not be empty", key);
        }
        if let Some(other) = hosts.insert(institution.fqdn.to_ascii_lowercase(), key) {
            anyhow::bail!(
                "institutions.{} and institutions.{} share fqdn '{}'",
                other,
                key,
                institution.fqdn
            );
        }
        url::Url::parse(&institution.base_url)
            .with_context(|| format!("institutions.{}.base_url is not a valid URL", key))?;
    }

    if let Some(default) = &config.server.default_institution {
        if !config.institutions.contains_key(default) {
            anyhow::bail!(
                "server.default_institution '{}' is not a configured institution",
                default
            );
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[db]
path = "./data/oai.sqlite"

[server]
bind = "127.0.0.1:7410"

[institutions.demo]
fqdn = "demo.example.edu"
repository_name = "Demo Repository"
base_url = "https://demo.example.edu/oai-pmh"
admin_email = "admin@example.edu"
"#;

    #[test]
    fn test_defaults() {
        let config = parse_config(MINIMAL).unwrap();
        assert_eq!(config.server.path, "/oai-pmh");
        assert_eq!(config.harvest.page_size, 100);
        assert_eq!(config.harvest.request_timeout_secs, 30);
        assert!(config.server.default_institution.is_none());
        assert_eq!(config.institutions["demo"].fqdn, "demo.example.edu");
    }

    #[test]
    fn test_rejects_zero_page_size() {
        let content = format!("{}\n[harvest]\npage_size = 0\n", MINIMAL);
        let err = parse_config(&content).unwrap_err();
        assert!(err.to_string().contains("page_size"));
    }

    #[test]
    fn test_rejects_unknown_default_institution() {
        let content = MINIMAL.replace(
            "bind = \"127.0.0.1:7410\"",
            "bind = \"127.0.0.1:7410\"\ndefault_institution = \"other\"",
        );
        let err = parse_config(&content).unwrap_err();
        assert!(err.to_string().contains("other"));
    }

    #[test]
    fn test_rejects_missing_institutions() {
        let content = "[db]\npath = \"x.sqlite\"\n[server]\nbind = \"127.0.0.1:0\"\n";
        assert!(parse_config(content).is_err());
    }

    #[test]
    fn test_rejects_duplicate_fqdn() {
        let content = format!(
            "{}\n[institutions.copy]\nfqdn = \"Demo.Example.edu\"\nrepository_name = \"Copy\"\nbase_url = \"https://copy.example.edu/oai-pmh\"\nadmin_email = \"admin@example.edu\"\n",
            MINIMAL
        );
        let err = parse_config(&content).unwrap_err();
        assert!(err.to_string().contains("share fqdn"));
    }

    #[test]
    fn test_rejects_bad_base_url() {
        let content = MINIMAL.replace("https://demo.example.edu/oai-pmh", "not a url");
        assert!(parse_config(&content).is_err());
    }
}
