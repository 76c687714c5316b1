//! Layered configuration.
//!
//! Sources, lowest precedence first: built-in defaults, `config.toml` then
//! `config.yaml` in the user's configuration directory, an explicitly given
//! file, and finally `ADDONS_*` environment variables (nested keys separated
//! by `__`, e.g. `ADDONS_CACHE__ROOT`).

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml, Yaml};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

const ENV_PREFIX: &str = "ADDONS_";
/// Files that survive a global cache clear: the dependency graph snapshots
/// and the directory's `.gitignore`.
pub const DEFAULT_KEEP: &str = r"(?i)^cache_graph_.*\.json|\.gitignore$";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("net", "supertuxkart", "addons")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// SQLite database file.
    pub database: PathBuf,
    pub cache: CacheConfig,
    pub feeds: FeedsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Absolute directory holding derived artifacts.
    pub root: PathBuf,
    /// Regular expression matched against file names that a global clear
    /// leaves alone.
    pub keep: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedsConfig {
    /// Program and arguments run after every catalog change.
    pub command: Option<Vec<String>>,
}

impl Default for Config {
    fn default() -> Self {
        let data = project_dirs().map_or_else(|| PathBuf::from("/var/lib/addons"), |d| d.data_dir().to_path_buf());
        Self {
            database: data.join("catalog.sqlite"),
            cache: CacheConfig { root: data.join("cache"), keep: DEFAULT_KEEP.to_string() },
            feeds: FeedsConfig::default(),
        }
    }
}

impl CacheConfig {
    pub fn keep_pattern(&self) -> Result<Regex> {
        Regex::new(&self.keep).or_raise(|| ErrorKind::Invalid(format!("cache.keep is not a valid pattern: {}", self.keep)))
    }
}

impl Config {
    /// Directory searched for `config.toml` and `config.yaml`.
    pub fn default_dir() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Every source except the environment, in precedence order.
    pub fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(dir) = Self::default_dir() {
            figment = figment.merge(Toml::file(dir.join("config.toml"))).merge(Yaml::file(dir.join("config.yaml")));
        }
        if let Some(file) = file {
            debug!(file = %file.display(), "Using configuration file");
            figment = match file.extension().and_then(|ext| ext.to_str()) {
                Some("yaml" | "yml") => figment.merge(Yaml::file_exact(file)),
                _ => figment.merge(Toml::file_exact(file)),
            };
        }
        figment
    }

    /// Load from every source, environment included, and validate.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        Self::from_figment(Self::figment(file).merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.as_os_str().is_empty() {
            exn::bail!(ErrorKind::Invalid("database path is empty".to_string()));
        }
        if !self.cache.root.is_absolute() {
            exn::bail!(ErrorKind::Invalid(format!("cache.root must be absolute: {}", self.cache.root.display())));
        }
        if self.feeds.command.as_ref().is_some_and(|argv| argv.first().is_none_or(String::is_empty)) {
            exn::bail!(ErrorKind::Invalid("feeds.command is empty".to_string()));
        }
        self.cache.keep_pattern()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::fs;

    fn defaults() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::from_figment(defaults()).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.feeds.command, None);
    }

    #[rstest]
    #[case("cache_graph_2.json", true)]
    #[case("CACHE_GRAPH_ALL.JSON", true)]
    #[case(".gitignore", true)]
    #[case("300--tux.png", false)]
    #[case("cache_graph.txt", false)]
    fn test_default_keep(#[case] name: &str, #[case] kept: bool) {
        let keep = Config::default().cache.keep_pattern().unwrap();
        assert_eq!(keep.is_match(name), kept);
    }

    #[test]
    fn test_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("addons.toml");
        fs::write(
            &path,
            r#"
database = "/srv/addons/catalog.sqlite"

[cache]
root = "/srv/addons/cache"

[feeds]
command = ["/usr/local/bin/generate-feeds", "--quiet"]
"#,
        )
        .unwrap();
        let config = Config::from_figment(defaults().merge(Toml::file_exact(&path))).unwrap();
        assert_eq!(config.database, PathBuf::from("/srv/addons/catalog.sqlite"));
        assert_eq!(config.cache.root, PathBuf::from("/srv/addons/cache"));
        assert_eq!(config.cache.keep, DEFAULT_KEEP);
        assert_eq!(config.feeds.command.unwrap().len(), 2);
    }

    #[test]
    fn test_yaml_overrides_toml() {
        let dir = tempfile::tempdir().unwrap();
        let toml = dir.path().join("config.toml");
        let yaml = dir.path().join("config.yaml");
        fs::write(&toml, "[cache]\nroot = \"/from/toml\"\nkeep = \"^keep$\"\n").unwrap();
        fs::write(&yaml, "cache:\n  root: /from/yaml\n").unwrap();
        let figment = defaults().merge(Toml::file(&toml)).merge(Yaml::file(&yaml));
        let config = Config::from_figment(figment).unwrap();
        assert_eq!(config.cache.root, PathBuf::from("/from/yaml"));
        assert_eq!(config.cache.keep, "^keep$");
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::from_figment(defaults().merge(Toml::file_exact(dir.path().join("nope.toml")))).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Load));
    }

    #[rstest]
    #[case("cache.root", "[cache]\nroot = \"relative/cache\"")]
    #[case("database", "database = \"\"")]
    #[case("feeds.command", "[feeds]\ncommand = []")]
    #[case("feeds.command", "[feeds]\ncommand = [\"\"]")]
    #[case("cache.keep", "[cache]\nkeep = \"(unclosed\"")]
    fn test_invalid(#[case] key: &str, #[case] toml: &str) {
        let err = Config::from_figment(defaults().merge(Toml::string(toml))).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid(msg) if msg.contains(key)), "{key}: {err:?}");
    }
}
