use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;

use crate::error::{Result, WormError};

/// Settings for the devlog output repository
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DevlogSettings {
   pub repo_path: PathBuf,
   pub remote:    String,
   pub branch:    String,
}

impl Default for DevlogSettings {
   fn default() -> Self {
      Self {
         repo_path: PathBuf::from("devlog"),
         remote:    String::new(),
         branch:    "main".to_string(),
      }
   }
}

/// Settings for the Ollama connection
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OllamaSettings {
   pub host:        String,
   pub port:        u16,
   pub model:       String,
   pub temperature: f32,
   pub num_ctx:     u32,
   pub num_predict: u32,
   pub keep_alive:  String,
}

impl OllamaSettings {
   pub fn base_url(&self) -> String {
      format!("http://{}:{}", self.host, self.port)
   }
}

impl Default for OllamaSettings {
   fn default() -> Self {
      Self {
         host:        "localhost".to_string(),
         port:        29999,
         model:       "qwen2.5:7b".to_string(),
         temperature: 0.2,
         num_ctx:     16384,
         num_predict: 4096,
         keep_alive:  "-1".to_string(),
      }
   }
}

/// Settings for human-like commit scheduling
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleSettings {
   pub enabled:             bool,
   pub min_commits_per_day: u32,
   pub max_commits_per_day: u32,
   /// IANA timezone name, e.g. `America/Los_Angeles`
   pub timezone:            String,
   pub prefer_hours:        Vec<u32>,
   pub avoid_hours:         Vec<u32>,
   pub weekend_reduction:   f64,
   pub min_gap_minutes:     u32,
}

impl Default for ScheduleSettings {
   fn default() -> Self {
      Self {
         enabled:             true,
         min_commits_per_day: 12,
         max_commits_per_day: 18,
         timezone:            "America/Los_Angeles".to_string(),
         prefer_hours:        vec![9, 10, 11, 14, 15, 16, 20, 21, 22],
         avoid_hours:         vec![3, 4, 5, 6, 7],
         weekend_reduction:   0.7,
         min_gap_minutes:     30,
      }
   }
}

/// Settings for code analysis and snippet selection
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalyzerSettings {
   pub min_complexity:   u32,
   pub min_lines:        usize,
   pub max_lines:        usize,
   pub include_patterns: Vec<String>,
   pub exclude_patterns: Vec<String>,
}

impl Default for AnalyzerSettings {
   fn default() -> Self {
      Self {
         min_complexity:   3,
         min_lines:        15,
         max_lines:        150,
         include_patterns: vec![
            "**/*.py".to_string(),
            "**/*.ts".to_string(),
            "**/*.tsx".to_string(),
            "**/*.js".to_string(),
            "**/*.go".to_string(),
            "**/*.rs".to_string(),
         ],
         exclude_patterns: vec![
            "**/test_*.py".to_string(),
            "**/*_test.py".to_string(),
            "**/*_test.go".to_string(),
            "**/*.spec.ts".to_string(),
            "**/*.test.ts".to_string(),
            "**/*.test.js".to_string(),
            "**/tests/**".to_string(),
            "**/test/**".to_string(),
            "**/__tests__/**".to_string(),
            "**/node_modules/**".to_string(),
            "**/vendor/**".to_string(),
            "**/venv/**".to_string(),
            "**/.venv/**".to_string(),
            "**/__pycache__/**".to_string(),
            "**/dist/**".to_string(),
            "**/build/**".to_string(),
            "**/.git/**".to_string(),
         ],
      }
   }
}

/// A source repository to scan
#[derive(Debug, Clone, Deserialize)]
pub struct RepoEntry {
   pub name:    String,
   pub path:    PathBuf,
   /// Selection weight, 1..=10
   #[serde(default = "default_repo_weight")]
   pub weight:  u32,
   #[serde(default = "default_true")]
   pub enabled: bool,
}

const fn default_repo_weight() -> u32 {
   5
}

const fn default_true() -> bool {
   true
}

/// Documentation flavor weights and cooldown policy
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DocumentationSettings {
   /// Weighted-random flavor map; iteration order is the fallback order
   pub type_weights:          IndexMap<String, u32>,
   pub redocument_after_days: i64,
}

impl Default for DocumentationSettings {
   fn default() -> Self {
      let mut type_weights = IndexMap::new();
      type_weights.insert("function_doc".to_string(), 10);
      type_weights.insert("file_doc".to_string(), 3);
      type_weights.insert("class_doc".to_string(), 3);
      type_weights.insert("module_doc".to_string(), 2);
      type_weights.insert("code_evolution".to_string(), 3);
      type_weights.insert("pattern_analysis".to_string(), 2);
      type_weights.insert("security_review".to_string(), 2);
      type_weights.insert("performance_analysis".to_string(), 2);
      type_weights.insert("til".to_string(), 3);
      Self { type_weights, redocument_after_days: 30 }
   }
}

/// Event fan-out settings; an empty URL disables publishing
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EventsSettings {
   pub redis_url: String,
}

/// Alerting settings for the operator-facing notifier
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
   /// Webhook receiving alert payloads; empty disables alerting
   pub webhook_url:          String,
   /// Consecutive failures before an alert fires
   pub alert_after_failures: u32,
}

impl Default for AlertSettings {
   fn default() -> Self {
      Self { webhook_url: String::new(), alert_after_failures: 4 }
   }
}

/// Root configuration, merged from defaults, YAML file and environment
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WormConfig {
   pub debug:         bool,
   pub data_dir:      PathBuf,
   pub devlog:        DevlogSettings,
   pub ollama:        OllamaSettings,
   pub schedule:      ScheduleSettings,
   pub analyzer:      AnalyzerSettings,
   pub repos:         Vec<RepoEntry>,
   pub documentation: DocumentationSettings,
   pub events:        EventsSettings,
   pub alerts:        AlertSettings,
}

impl Default for WormConfig {
   fn default() -> Self {
      Self {
         debug:         false,
         data_dir:      PathBuf::from("data"),
         devlog:        DevlogSettings::default(),
         ollama:        OllamaSettings::default(),
         schedule:      ScheduleSettings::default(),
         analyzer:      AnalyzerSettings::default(),
         repos:         Vec::new(),
         documentation: DocumentationSettings::default(),
         events:        EventsSettings::default(),
         alerts:        AlertSettings::default(),
      }
   }
}

impl WormConfig {
   /// Load config from `CODEWORM_CONFIG`, falling back to `codeworm.yaml` in
   /// the working directory, falling back to defaults. Environment variables
   /// override file values; `.env` is honored via dotenvy before this runs.
   pub fn load() -> Result<Self> {
      let config_path = std::env::var("CODEWORM_CONFIG")
         .map_or_else(|_| PathBuf::from("codeworm.yaml"), PathBuf::from);

      let mut config = if config_path.exists() {
         Self::from_file(&config_path)?
      } else {
         Self::default()
      };

      Self::apply_env_overrides(&mut config);
      config.validate()?;
      Ok(config)
   }

   /// Load config from a specific YAML file
   pub fn from_file(path: &Path) -> Result<Self> {
      let contents = std::fs::read_to_string(path).map_err(|e| {
         WormError::ConfigError(format!("Failed to read config {}: {e}", path.display()))
      })?;
      let mut config: Self = serde_yaml::from_str(&contents).map_err(|e| {
         WormError::ConfigError(format!("Failed to parse config {}: {e}", path.display()))
      })?;

      Self::apply_env_overrides(&mut config);
      config.validate()?;
      Ok(config)
   }

   /// Apply environment variable overrides (prefix `CODEWORM_`, nested
   /// sections delimited with `__`)
   fn apply_env_overrides(config: &mut Self) {
      if let Ok(debug) = std::env::var("CODEWORM_DEBUG") {
         config.debug = matches!(debug.as_str(), "1" | "true" | "yes");
      }
      if let Ok(dir) = std::env::var("CODEWORM_DATA_DIR") {
         config.data_dir = PathBuf::from(dir);
      }
      if let Ok(path) = std::env::var("CODEWORM_DEVLOG__REPO_PATH") {
         config.devlog.repo_path = PathBuf::from(path);
      }
      if let Ok(remote) = std::env::var("CODEWORM_DEVLOG__REMOTE") {
         config.devlog.remote = remote;
      }
      if let Ok(branch) = std::env::var("CODEWORM_DEVLOG__BRANCH") {
         config.devlog.branch = branch;
      }
      if let Ok(host) = std::env::var("CODEWORM_OLLAMA__HOST") {
         config.ollama.host = host;
      }
      if let Ok(port) = std::env::var("CODEWORM_OLLAMA__PORT")
         && let Ok(port) = port.parse()
      {
         config.ollama.port = port;
      }
      if let Ok(model) = std::env::var("CODEWORM_OLLAMA__MODEL") {
         config.ollama.model = model;
      }
      if let Ok(url) = std::env::var("CODEWORM_EVENTS__REDIS_URL") {
         config.events.redis_url = url;
      }
      if let Ok(url) = std::env::var("CODEWORM_ALERTS__WEBHOOK_URL") {
         config.alerts.webhook_url = url;
      }
   }

   /// Reject configurations the daemon cannot run with
   fn validate(&self) -> Result<()> {
      for repo in &self.repos {
         if !(1..=10).contains(&repo.weight) {
            return Err(WormError::ConfigError(format!(
               "Repo '{}' weight {} out of range 1..=10",
               repo.name, repo.weight
            )));
         }
      }
      if self.schedule.min_commits_per_day > self.schedule.max_commits_per_day {
         return Err(WormError::ConfigError(format!(
            "schedule.min_commits_per_day {} exceeds max_commits_per_day {}",
            self.schedule.min_commits_per_day, self.schedule.max_commits_per_day
         )));
      }
      if !(0.0..=1.0).contains(&self.schedule.weekend_reduction) {
         return Err(WormError::ConfigError(format!(
            "schedule.weekend_reduction {} out of range 0..=1",
            self.schedule.weekend_reduction
         )));
      }
      if self.analyzer.min_lines > self.analyzer.max_lines {
         return Err(WormError::ConfigError(format!(
            "analyzer.min_lines {} exceeds max_lines {}",
            self.analyzer.min_lines, self.analyzer.max_lines
         )));
      }
      Ok(())
   }

   /// Location of the persistent memory store
   pub fn db_path(&self) -> PathBuf {
      self.data_dir.join("state.db")
   }

   /// Enabled repos in configured order
   pub fn enabled_repos(&self) -> Vec<&RepoEntry> {
      self.repos.iter().filter(|r| r.enabled).collect()
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_defaults_are_valid() {
      let config = WormConfig::default();
      assert!(config.validate().is_ok());
      assert_eq!(config.ollama.base_url(), "http://localhost:29999");
      assert_eq!(config.documentation.redocument_after_days, 30);
      assert_eq!(config.alerts.alert_after_failures, 4);
   }

   #[test]
   fn test_db_path_under_data_dir() {
      let config = WormConfig { data_dir: PathBuf::from("/var/lib/codeworm"), ..Default::default() };
      assert_eq!(config.db_path(), PathBuf::from("/var/lib/codeworm/state.db"));
   }

   #[test]
   fn test_yaml_parse_partial_document() {
      let yaml = r"
debug: true
devlog:
  repo_path: /tmp/devlog
  remote: git@example.com:notes.git
repos:
  - name: demo
    path: /tmp/demo
    weight: 7
  - name: off
    path: /tmp/off
    enabled: false
";
      let config: WormConfig = serde_yaml::from_str(yaml).unwrap();
      assert!(config.debug);
      assert_eq!(config.devlog.repo_path, PathBuf::from("/tmp/devlog"));
      assert_eq!(config.devlog.branch, "main");
      assert_eq!(config.repos.len(), 2);
      assert_eq!(config.repos[0].weight, 7);
      assert!(config.repos[0].enabled);
      assert_eq!(config.enabled_repos().len(), 1);
      // Defaults survive partial documents
      assert_eq!(config.schedule.min_commits_per_day, 12);
   }

   #[test]
   fn test_validate_rejects_bad_weight() {
      let yaml = r"
repos:
  - name: demo
    path: /tmp/demo
    weight: 0
";
      let config: WormConfig = serde_yaml::from_str(yaml).unwrap();
      assert!(config.validate().is_err());
   }

   #[test]
   fn test_validate_rejects_inverted_commit_bounds() {
      let config = WormConfig {
         schedule: ScheduleSettings {
            min_commits_per_day: 9,
            max_commits_per_day: 3,
            ..Default::default()
         },
         ..Default::default()
      };
      assert!(config.validate().is_err());
   }

   #[test]
   fn test_type_weights_preserve_insertion_order() {
      let config = WormConfig::default();
      let first: Vec<&str> = config
         .documentation
         .type_weights
         .keys()
         .take(2)
         .map(String::as_str)
         .collect();
      assert_eq!(first, vec!["function_doc", "file_doc"]);
   }
}
