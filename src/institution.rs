//! Host-based institution resolution.
//!
//! One server answers for several institutions. The request's `Host` header
//! selects which institution's items, identifiers and `Identify` details a
//! response uses.

use std::collections::HashMap;

use crate::config::Config;
use crate::models::InstitutionScope;

/// Maps a request host to an institution.
pub trait InstitutionResolver: Send + Sync {
    /// `host` may carry a port; matching ignores it and is case-insensitive.
    fn resolve(&self, host: &str) -> Option<InstitutionScope>;
}

/// Institutions declared in `[institutions.*]`.
pub struct ConfiguredInstitutions {
    by_host: HashMap<String, InstitutionScope>,
    fallback: Option<InstitutionScope>,
}

impl ConfiguredInstitutions {
    pub fn from_config(config: &Config) -> Self {
        let scopes: Vec<InstitutionScope> = config
            .institutions
            .iter()
            .map(|(key, inst)| InstitutionScope {
                key: key.clone(),
                fqdn: inst.fqdn.clone(),
                repository_name: inst.repository_name.clone(),
                base_url: inst.base_url.clone(),
                admin_email: inst.admin_email.clone(),
            })
            .collect();

        let fallback = config
            .server
            .default_institution
            .as_ref()
            .and_then(|key| scopes.iter().find(|s| &s.key == key).cloned());

        Self::new(scopes, fallback)
    }

    pub fn new(scopes: Vec<InstitutionScope>, fallback: Option<InstitutionScope>) -> Self {
        let by_host = scopes
            .into_iter()
            .map(|scope| (scope.fqdn.to_ascii_lowercase(), scope))
            .collect();
        Self { by_host, fallback }
    }

    /// Looks an institution up by its configuration key.
    pub fn by_key(&self, key: &str) -> Option<InstitutionScope> {
        self.by_host.values().find(|s| s.key == key).cloned()
    }
}

impl InstitutionResolver for ConfiguredInstitutions {
    fn resolve(&self, host: &str) -> Option<InstitutionScope> {
        let host = strip_port(host).to_ascii_lowercase();
        self.by_host
            .get(&host)
            .cloned()
            .or_else(|| self.fallback.clone())
    }
}

fn strip_port(host: &str) -> &str {
    // Bracketed IPv6 literal: [::1]:8080
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(key: &str, fqdn: &str) -> InstitutionScope {
        InstitutionScope {
            key: key.to_string(),
            fqdn: fqdn.to_string(),
            repository_name: format!("{} repository", key),
            base_url: format!("https://{}/oai-pmh", fqdn),
            admin_email: format!("admin@{}", fqdn),
        }
    }

    #[test]
    fn test_resolve_ignores_port_and_case() {
        let institutions = ConfiguredInstitutions::new(
            vec![scope("a", "a.example.edu"), scope("b", "b.example.edu")],
            None,
        );
        assert_eq!(institutions.resolve("A.Example.edu:8080").unwrap().key, "a");
        assert_eq!(institutions.resolve("b.example.edu").unwrap().key, "b");
        assert!(institutions.resolve("c.example.edu").is_none());
    }

    #[test]
    fn test_fallback() {
        let a = scope("a", "a.example.edu");
        let institutions = ConfiguredInstitutions::new(vec![a.clone()], Some(a));
        assert_eq!(institutions.resolve("localhost:7410").unwrap().key, "a");
    }

    #[test]
    fn test_strip_port() {
        assert_eq!(strip_port("example.edu:80"), "example.edu");
        assert_eq!(strip_port("example.edu"), "example.edu");
        assert_eq!(strip_port("[::1]:8080"), "::1");
    }
}
