use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Socket address for the HTTP listener (e.g. `0.0.0.0:8418`).
    #[serde(default = "default_listen")]
    pub listen: String,
    pub repository: RepositoryConfig,
    #[serde(default)]
    pub access: AccessConfig,
    #[serde(default)]
    pub backend: BackendConfig,
}

fn default_listen() -> String {
    "0.0.0.0:8418".to_string()
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryConfig {
    /// Directory containing all servable repositories.  Must exist at startup;
    /// resolved to an absolute path during config load.
    pub root: PathBuf,
    /// When true, fetch/clone requires a reader credential.  Pushes always
    /// require a writer credential regardless of this flag.
    #[serde(default)]
    pub private: bool,
}

// ---------------------------------------------------------------------------
// Access tables
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccessConfig {
    /// Identity -> secret pairs allowed to fetch when the repository is private.
    #[serde(default)]
    pub readers: HashMap<String, String>,
    /// Identity -> secret pairs allowed to push.
    #[serde(default)]
    pub writers: HashMap<String, String>,
}

// ---------------------------------------------------------------------------
// Backend process
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Argv of the Git transport backend.
    #[serde(default = "default_backend_command")]
    pub command: Vec<String>,
    /// Kill the backend and answer 504 after this many seconds.  Unset means
    /// the gateway waits for the backend indefinitely.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            command: default_backend_command(),
            timeout_secs: None,
        }
    }
}

fn default_backend_command() -> Vec<String> {
    vec!["git".to_string(), "http-backend".to_string()]
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Load and validate a [`Config`] from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    let mut config: Config = serde_yaml::from_str(&contents)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;
    validate_config(&mut config)?;
    Ok(config)
}

/// Sanity checks that cannot be expressed purely with serde.  Resolves the
/// repository root to an absolute path; a missing root fails startup.
fn validate_config(config: &mut Config) -> Result<()> {
    anyhow::ensure!(
        !config.backend.command.is_empty(),
        "backend.command must not be empty"
    );

    let root = std::fs::canonicalize(&config.repository.root).with_context(|| {
        format!(
            "repository root does not exist: {}",
            config.repository.root.display()
        )
    })?;
    anyhow::ensure!(
        root.is_dir(),
        "repository root is not a directory: {}",
        root.display()
    );
    config.repository.root = root;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("config.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_minimal_config_with_defaults() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("repos");
        std::fs::create_dir(&root).unwrap();

        let path = write_config(
            &dir,
            &format!("repository:\n  root: {}\n", root.display()),
        );
        let config = load_config(path).unwrap();

        assert_eq!(config.listen, "0.0.0.0:8418");
        assert!(!config.repository.private);
        assert!(config.access.readers.is_empty());
        assert!(config.access.writers.is_empty());
        assert_eq!(config.backend.command, vec!["git", "http-backend"]);
        assert_eq!(config.backend.timeout_secs, None);
        assert!(config.repository.root.is_absolute());
    }

    #[test]
    fn test_full_config() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("repos");
        std::fs::create_dir(&root).unwrap();

        let yaml = format!(
            "listen: 127.0.0.1:9000\n\
             repository:\n\
             \x20 root: {}\n\
             \x20 private: true\n\
             access:\n\
             \x20 readers:\n\
             \x20   alice: secret1\n\
             \x20 writers:\n\
             \x20   bob: secret2\n\
             backend:\n\
             \x20 command: [git, http-backend]\n\
             \x20 timeout_secs: 30\n",
            root.display()
        );
        let path = write_config(&dir, &yaml);
        let config = load_config(path).unwrap();

        assert_eq!(config.listen, "127.0.0.1:9000");
        assert!(config.repository.private);
        assert_eq!(config.access.readers["alice"], "secret1");
        assert_eq!(config.access.writers["bob"], "secret2");
        assert_eq!(config.backend.timeout_secs, Some(30));
    }

    #[test]
    fn test_missing_repository_root_fails() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            &format!(
                "repository:\n  root: {}\n",
                dir.path().join("does-not-exist").display()
            ),
        );
        let err = load_config(path).unwrap_err();
        assert!(err.to_string().contains("repository root does not exist"));
    }

    #[test]
    fn test_root_resolved_to_absolute() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("repos");
        std::fs::create_dir(&root).unwrap();

        // Relative path resolved against the process cwd would be fragile in a
        // test; use a symlinked absolute path to exercise canonicalization.
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&root, &link).unwrap();

        let path = write_config(&dir, &format!("repository:\n  root: {}\n", link.display()));
        let config = load_config(path).unwrap();
        assert_eq!(config.repository.root, root.canonicalize().unwrap());
    }

    #[test]
    fn test_empty_backend_command_rejected() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("repos");
        std::fs::create_dir(&root).unwrap();

        let yaml = format!(
            "repository:\n  root: {}\nbackend:\n  command: []\n",
            root.display()
        );
        let path = write_config(&dir, &yaml);
        let err = load_config(path).unwrap_err();
        assert!(err.to_string().contains("backend.command"));
    }
}
