use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub frontend: FrontendConfig,
    pub policy: PolicySource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Location of the counter document for the file backend
    pub data_file: PathBuf,
    /// Bounded capacity of the write serializer queue
    pub write_queue_capacity: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    File,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontendConfig {
    /// Path to directory containing the public client assets
    /// If None, uses the embedded copies
    pub public_dir: Option<String>,
}

/// Counting policy consulted on every hit and stats request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterPolicy {
    #[serde(default = "CounterPolicy::default_allow_all")]
    pub allow_all: bool,
    #[serde(default)]
    pub allowed_root_domains: Vec<String>,
    #[serde(default)]
    pub anonymize_ip: bool,
}

impl Default for CounterPolicy {
    fn default() -> Self {
        Self {
            allow_all: true,
            allowed_root_domains: Vec::new(),
            anonymize_ip: false,
        }
    }
}

impl CounterPolicy {
    const fn default_allow_all() -> bool {
        true
    }

    /// Policy that only admits the given roots and their subdomains
    pub fn restricted(roots: Vec<String>, anonymize_ip: bool) -> Self {
        Self {
            allow_all: false,
            allowed_root_domains: roots,
            anonymize_ip,
        }
        .normalized()
    }

    /// Trim and lowercase roots, dropping empty entries
    pub fn normalized(mut self) -> Self {
        self.allowed_root_domains = self
            .allowed_root_domains
            .iter()
            .map(|root| root.trim().trim_start_matches('.').to_lowercase())
            .filter(|root| !root.is_empty())
            .collect();
        self
    }
}

/// Where the counter policy comes from
///
/// A `File` source is read again on every operation, so edits take effect
/// without a restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicySource {
    Static(CounterPolicy),
    File(PathBuf),
}

impl Default for PolicySource {
    fn default() -> Self {
        PolicySource::Static(CounterPolicy::default())
    }
}

impl PolicySource {
    /// Resolve the policy in effect right now
    ///
    /// A missing or unreadable policy file falls back to the permissive
    /// default; it never fails the request.
    pub async fn current(&self) -> CounterPolicy {
        match self {
            PolicySource::Static(policy) => policy.clone(),
            PolicySource::File(path) => match tokio::fs::read(path).await {
                Ok(bytes) => match serde_json::from_slice::<CounterPolicy>(&bytes) {
                    Ok(policy) => policy.normalized(),
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "invalid policy file, using permissive defaults"
                        );
                        CounterPolicy::default()
                    }
                },
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::debug!(path = %path.display(), "policy file absent, using permissive defaults");
                    CounterPolicy::default()
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "failed to read policy file, using permissive defaults"
                    );
                    CounterPolicy::default()
                }
            },
        }
    }
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "on"))
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8787".to_string())
            .parse::<u16>()
            .context("PORT must be a valid port number")?;

        let backend_str = std::env::var("STORAGE_BACKEND").unwrap_or_else(|_| "file".to_string());
        let backend = match backend_str.to_lowercase().as_str() {
            "memory" | "mem" => StorageBackend::Memory,
            "file" => StorageBackend::File,
            other => {
                tracing::warn!(
                    "Unknown STORAGE_BACKEND '{other}', falling back to 'file'. Supported values: file, memory"
                );
                StorageBackend::File
            }
        };

        let data_file = std::env::var("DATA_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./counts.json"));

        let write_queue_capacity = std::env::var("WRITE_QUEUE_CAPACITY")
            .ok()
            .map(|v| v.parse::<usize>())
            .transpose()
            .context("WRITE_QUEUE_CAPACITY must be a positive integer")?
            .unwrap_or(1024);

        let public_dir = std::env::var("PUBLIC_DIR").ok();

        Ok(Config {
            server: ServerConfig { host, port },
            storage: StorageConfig {
                backend,
                data_file,
                write_queue_capacity,
            },
            frontend: FrontendConfig { public_dir },
            policy: Self::policy_from_env(),
        })
    }

    fn policy_from_env() -> PolicySource {
        if let Ok(path) = std::env::var("POLICY_FILE") {
            return PolicySource::File(PathBuf::from(path));
        }

        let roots: Vec<String> = std::env::var("ALLOWED_ROOT_DOMAINS")
            .map(|v| v.split(',').map(str::to_string).collect())
            .unwrap_or_default();

        // A configured allow-list implies restriction unless ALLOW_ALL says otherwise.
        let allow_all = env_flag("ALLOW_ALL").unwrap_or(roots.is_empty());
        let anonymize_ip = env_flag("ANONYMIZE_IP").unwrap_or(false);

        PolicySource::Static(
            CounterPolicy {
                allow_all,
                allowed_root_domains: roots,
                anonymize_ip,
            }
            .normalized(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_policy_file_defaults() {
        let policy: CounterPolicy = serde_json::from_str("{}").unwrap();
        assert_eq!(policy, CounterPolicy::default());
    }

    #[test]
    fn test_policy_roots_are_normalized() {
        let policy = CounterPolicy::restricted(
            vec![" Example.COM ".to_string(), "".to_string(), ".localhost".to_string()],
            true,
        );
        assert!(!policy.allow_all);
        assert!(policy.anonymize_ip);
        assert_eq!(policy.allowed_root_domains, vec!["example.com", "localhost"]);
    }

    #[tokio::test]
    async fn test_policy_file_is_reread() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("policy.json");
        let source = PolicySource::File(path.clone());

        // Absent file: permissive.
        assert_eq!(source.current().await, CounterPolicy::default());

        std::fs::write(
            &path,
            r#"{"allowAll": false, "allowedRootDomains": ["Example.com"], "anonymizeIp": true}"#,
        )
        .unwrap();
        let policy = source.current().await;
        assert!(!policy.allow_all);
        assert_eq!(policy.allowed_root_domains, vec!["example.com"]);
        assert!(policy.anonymize_ip);

        std::fs::write(&path, "not json").unwrap();
        assert_eq!(source.current().await, CounterPolicy::default());
    }
}
