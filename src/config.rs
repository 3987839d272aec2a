//! Project configuration and scenario file loading.

use crate::runner::ScenarioFile;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Name of the environment variable selecting the environment.
pub const ENV_VARIABLE: &str = "API_ENV";

/// Default project configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = ".restqa.yml";

/// One target environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    pub name: String,
    /// Default API gateway.
    #[serde(default)]
    pub url: Option<String>,
    /// Accept invalid TLS certificates.
    #[serde(default)]
    pub insecure: bool,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Seeded into every scenario's dataset.
    #[serde(default)]
    pub secrets: BTreeMap<String, Value>,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            url: None,
            insecure: false,
            timeout: default_timeout(),
            secrets: BTreeMap::new(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub environments: Vec<Environment>,
}

impl ProjectConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from {}", path.display());
        let content = fs::read_to_string(path).context(format!(
            "Failed to read configuration file: {}",
            path.display()
        ))?;
        Self::from_yaml(&content).context(format!(
            "Failed to parse configuration from {}",
            path.display()
        ))
    }

    /// Pick an environment by case-insensitive name. Without a name the
    /// only environment is used.
    pub fn select(&self, name: Option<&str>) -> Result<Environment> {
        let available = || {
            self.environments
                .iter()
                .map(|e| e.name.as_str())
                .collect::<Vec<_>>()
                .join(" | ")
        };
        match name {
            Some(name) => self
                .environments
                .iter()
                .find(|e| e.name.eq_ignore_ascii_case(name))
                .cloned()
                .ok_or_else(|| {
                    anyhow!(
                        "unknown environment \"{name}\" (available: {})",
                        available()
                    )
                }),
            None => match self.environments.as_slice() {
                [only] => Ok(only.clone()),
                _ => Err(anyhow!(
                    "the environment variable \"{ENV_VARIABLE}\" needs to be defined ({})",
                    available()
                )),
            },
        }
    }
}

/// Loads scenario files from files and directories.
#[derive(Debug)]
pub struct ScenarioLoader {
    pub paths: Vec<PathBuf>,
}

impl ScenarioLoader {
    pub fn new() -> Self {
        Self {
            paths: vec![PathBuf::from("tests/scenarios")],
        }
    }

    pub fn with_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        Self {
            paths: paths
                .into_iter()
                .map(|p| p.as_ref().to_path_buf())
                .collect(),
        }
    }

    pub fn load_scenario<P: AsRef<Path>>(&self, path: P) -> Result<ScenarioFile> {
        let path = path.as_ref();
        info!("Loading scenario from {}", path.display());

        let content = fs::read_to_string(path).context(format!(
            "Failed to read scenario file: {}",
            path.display()
        ))?;
        let scenario = ScenarioFile::from_yaml(&content).context(format!(
            "Failed to parse YAML from {}",
            path.display()
        ))?;

        debug!("Successfully loaded scenario: {}", scenario.name);
        Ok(scenario)
    }

    /// Load every `.yaml`/`.yml` file in `dir`, sorted by file name.
    pub fn load_scenarios_from_dir<P: AsRef<Path>>(
        &self,
        dir: P,
    ) -> Result<Vec<ScenarioFile>> {
        let dir = dir.as_ref();
        info!("Loading scenarios from directory: {}", dir.display());

        let mut files = Vec::new();
        for entry in fs::read_dir(dir).context(format!(
            "Failed to read directory: {}",
            dir.display()
        ))? {
            let path = entry?.path();
            if path.is_file() && is_scenario_file(&path) {
                files.push(path);
            }
        }
        files.sort();

        let scenarios = files
            .iter()
            .map(|path| self.load_scenario(path))
            .collect::<Result<Vec<_>>>()?;

        info!(
            "Loaded {} scenarios from {}",
            scenarios.len(),
            dir.display()
        );
        Ok(scenarios)
    }

    /// Load every configured path, files and directories alike.
    pub fn load_all(&self) -> Result<Vec<ScenarioFile>> {
        let mut all = Vec::new();
        for path in &self.paths {
            if path.is_dir() {
                all.extend(self.load_scenarios_from_dir(path)?);
            } else if path.is_file() {
                all.push(self.load_scenario(path)?);
            } else {
                return Err(anyhow!(
                    "scenario path does not exist: {}",
                    path.display()
                ));
            }
        }
        info!("Loaded {} scenarios in total", all.len());
        Ok(all)
    }
}

impl Default for ScenarioLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn is_scenario_file(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext == "yaml" || ext == "yml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const CONFIG: &str = "\
name: shop
environments:
  - name: local
    url: http://localhost:8080
    secrets:
      api_key: s3cr3t
  - name: UAT
    url: https://uat.example.test
    insecure: true
    timeout: 5
";

    #[test]
    fn test_parse_project_config() {
        let config = ProjectConfig::from_yaml(CONFIG).unwrap();
        assert_eq!(config.name.as_deref(), Some("shop"));
        assert_eq!(config.environments.len(), 2);

        let local = &config.environments[0];
        assert_eq!(local.timeout, 30);
        assert!(!local.insecure);
        assert_eq!(local.secrets.get("api_key"), Some(&json!("s3cr3t")));
    }

    #[test]
    fn test_select_environment_case_insensitive() {
        let config = ProjectConfig::from_yaml(CONFIG).unwrap();
        let uat = config.select(Some("uat")).unwrap();
        assert_eq!(uat.url.as_deref(), Some("https://uat.example.test"));
        assert!(uat.insecure);
        assert_eq!(uat.timeout, 5);
    }

    #[test]
    fn test_select_requires_name_with_many_environments() {
        let config = ProjectConfig::from_yaml(CONFIG).unwrap();
        let err = config.select(None).unwrap_err().to_string();
        assert!(err.contains(ENV_VARIABLE));
        assert!(err.contains("local | UAT"));

        let err = config.select(Some("prod")).unwrap_err().to_string();
        assert!(err.contains("prod"));
    }

    #[test]
    fn test_select_single_environment_without_name() {
        let config = ProjectConfig::from_yaml(
            "environments:\n  - name: only\n    url: http://x.test\n",
        )
        .unwrap();
        assert_eq!(config.select(None).unwrap().name, "only");
    }

    #[test]
    fn test_load_config_file() {
        let dir = tempdir_with_files(&[(DEFAULT_CONFIG_FILE, CONFIG)]);
        let config =
            ProjectConfig::load(dir.path().join(DEFAULT_CONFIG_FILE)).unwrap();
        assert_eq!(config.environments.len(), 2);
        assert!(ProjectConfig::load(dir.path().join("missing.yml")).is_err());
    }

    #[test]
    fn test_is_scenario_file() {
        assert!(is_scenario_file(Path::new("a.yaml")));
        assert!(is_scenario_file(Path::new("dir/b.yml")));
        assert!(!is_scenario_file(Path::new("c.json")));
        assert!(!is_scenario_file(Path::new("README.md")));
    }

    #[test]
    fn test_load_scenarios_from_dir() {
        let dir = tempdir_with_files(&[
            (
                "b.yaml",
                "name: second\nsteps:\n  - step: gateway\n  - step: run\n",
            ),
            (
                "a.yml",
                "name: first\ntags: [smoke]\nsteps:\n  - step: path\n    path: /x\n",
            ),
            ("notes.md", "# not a scenario\n"),
        ]);

        let loader = ScenarioLoader::with_paths([dir.path()]);
        let scenarios = loader.load_all().unwrap();
        let names: Vec<&str> = scenarios.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["first", "second"]);
        assert_eq!(scenarios[0].tags, ["smoke"]);
        assert_eq!(scenarios[1].steps.len(), 2);
    }

    #[test]
    fn test_load_missing_path_fails() {
        let loader = ScenarioLoader::with_paths(["/definitely/not/here"]);
        assert!(loader.load_all().is_err());
    }

    fn tempdir_with_files(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in files {
            std::fs::write(dir.path().join(name), content).unwrap();
        }
        dir
    }
}
