use std::{fmt, path::PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// === Languages ===

/// Source languages the analysis pipeline understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
   Python,
   Typescript,
   Tsx,
   Javascript,
   Go,
   Rust,
}

impl Language {
   /// Directory / template name for this language
   pub const fn as_str(self) -> &'static str {
      match self {
         Self::Python => "python",
         Self::Typescript => "typescript",
         Self::Tsx => "tsx",
         Self::Javascript => "javascript",
         Self::Go => "go",
         Self::Rust => "rust",
      }
   }

   /// Resolve a file extension (lowercase, with leading dot) to a language
   pub fn from_extension(ext: &str) -> Option<Self> {
      match ext {
         ".py" => Some(Self::Python),
         ".ts" => Some(Self::Typescript),
         ".tsx" => Some(Self::Tsx),
         ".js" | ".jsx" => Some(Self::Javascript),
         ".go" => Some(Self::Go),
         ".rs" => Some(Self::Rust),
         _ => None,
      }
   }

   /// Resolve a path's extension to a language
   pub fn from_path(path: &std::path::Path) -> Option<Self> {
      let ext = path.extension()?.to_str()?.to_lowercase();
      Self::from_extension(&format!(".{ext}"))
   }
}

impl fmt::Display for Language {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(self.as_str())
   }
}

// === Documentation flavors ===

/// The stylistic kind of documentation a cycle produces.
///
/// `WeeklySummary` and `MonthlySummary` are accepted in configuration but
/// never dispatched by the daemon; the router filters them out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
   FunctionDoc,
   SecurityReview,
   PerformanceAnalysis,
   Til,
   FileDoc,
   ClassDoc,
   ModuleDoc,
   CodeEvolution,
   PatternAnalysis,
   WeeklySummary,
   MonthlySummary,
}

impl DocType {
   pub const fn as_str(self) -> &'static str {
      match self {
         Self::FunctionDoc => "function_doc",
         Self::SecurityReview => "security_review",
         Self::PerformanceAnalysis => "performance_analysis",
         Self::Til => "til",
         Self::FileDoc => "file_doc",
         Self::ClassDoc => "class_doc",
         Self::ModuleDoc => "module_doc",
         Self::CodeEvolution => "code_evolution",
         Self::PatternAnalysis => "pattern_analysis",
         Self::WeeklySummary => "weekly_summary",
         Self::MonthlySummary => "monthly_summary",
      }
   }

   /// Parse a configuration key into a doc type
   pub fn parse(s: &str) -> Option<Self> {
      match s {
         "function_doc" => Some(Self::FunctionDoc),
         "security_review" => Some(Self::SecurityReview),
         "performance_analysis" => Some(Self::PerformanceAnalysis),
         "til" => Some(Self::Til),
         "file_doc" => Some(Self::FileDoc),
         "class_doc" => Some(Self::ClassDoc),
         "module_doc" => Some(Self::ModuleDoc),
         "code_evolution" => Some(Self::CodeEvolution),
         "pattern_analysis" => Some(Self::PatternAnalysis),
         "weekly_summary" => Some(Self::WeeklySummary),
         "monthly_summary" => Some(Self::MonthlySummary),
         _ => None,
      }
   }

   /// Summary flavors are recognized but not produced by the cycle loop
   pub const fn is_dispatchable(self) -> bool {
      !matches!(self, Self::WeeklySummary | Self::MonthlySummary)
   }
}

impl fmt::Display for DocType {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(self.as_str())
   }
}

// === Code snippets ===

/// A candidate unit of documentation extracted from a source file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeSnippet {
   pub repo:            String,
   pub file_path:       PathBuf,
   pub function_name:   Option<String>,
   pub class_name:      Option<String>,
   pub language:        Language,
   pub source:          String,
   pub start_line:      usize,
   pub end_line:        usize,
   #[serde(default)]
   pub complexity:      f64,
   #[serde(default)]
   pub nesting_depth:   u32,
   #[serde(default)]
   pub parameter_count: u32,
   #[serde(default)]
   pub interest_score:  f64,
   pub doc_type:        DocType,
}

impl CodeSnippet {
   /// Lines covered by this snippet, inclusive
   pub const fn line_count(&self) -> usize {
      self.end_line - self.start_line + 1
   }

   /// Human readable identity: `Class.method`, bare name, or file stem
   pub fn display_name(&self) -> String {
      match (&self.class_name, &self.function_name) {
         (Some(class), Some(func)) => format!("{class}.{func}"),
         (None, Some(func)) => func.clone(),
         (Some(class), None) => class.clone(),
         (None, None) => self
            .file_path
            .file_stem()
            .map_or_else(|| "unknown".to_string(), |s| s.to_string_lossy().into_owned()),
      }
   }
}

// === Persisted documentation records ===

/// Record of a snippet that has been documented and committed.
/// Write-once: rows are never mutated or deleted by the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentedSnippet {
   pub id:            String,
   pub source_repo:   String,
   pub source_file:   String,
   pub function_name: Option<String>,
   pub class_name:    Option<String>,
   pub code_hash:     String,
   pub documented_at: DateTime<Utc>,
   pub snippet_path:  String,
   pub git_commit:    Option<String>,
   pub doc_type:      DocType,
}

impl DocumentedSnippet {
   pub fn display_name(&self) -> String {
      match (&self.class_name, &self.function_name) {
         (Some(class), Some(func)) => format!("{class}.{func}"),
         (None, Some(func)) => func.clone(),
         (Some(class), None) => class.clone(),
         (None, None) => std::path::Path::new(&self.source_file)
            .file_stem()
            .map_or_else(|| "unknown".to_string(), |s| s.to_string_lossy().into_owned()),
      }
   }
}

// === Generation results ===

/// Result of one LLM generation request
#[derive(Debug, Clone)]
pub struct GenerationResult {
   pub text:              String,
   pub model:             String,
   pub prompt_tokens:     u64,
   pub completion_tokens: u64,
   pub total_duration_ms: u64,
   pub tokens_per_second: f64,
}

impl GenerationResult {
   pub const fn total_tokens(&self) -> u64 {
      self.prompt_tokens + self.completion_tokens
   }
}

/// Build the devlog-relative filename for a documented snippet:
/// slugged display name plus the first 8 hex chars of the code hash
pub fn snippet_filename(snippet: &CodeSnippet, code_hash: &str) -> String {
   let slug: String = snippet
      .display_name()
      .chars()
      .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
      .collect();
   let short = &code_hash[..code_hash.len().min(8)];
   format!("{slug}_{short}.md")
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_language_from_extension() {
      assert_eq!(Language::from_extension(".py"), Some(Language::Python));
      assert_eq!(Language::from_extension(".jsx"), Some(Language::Javascript));
      assert_eq!(Language::from_extension(".tsx"), Some(Language::Tsx));
      assert_eq!(Language::from_extension(".md"), None);
   }

   #[test]
   fn test_language_from_path() {
      assert_eq!(Language::from_path(std::path::Path::new("a/b/lib.RS")), Some(Language::Rust));
      assert_eq!(Language::from_path(std::path::Path::new("Makefile")), None);
   }

   #[test]
   fn test_doc_type_parse_roundtrip() {
      for doc_type in [
         DocType::FunctionDoc,
         DocType::SecurityReview,
         DocType::PerformanceAnalysis,
         DocType::Til,
         DocType::FileDoc,
         DocType::ClassDoc,
         DocType::ModuleDoc,
         DocType::CodeEvolution,
         DocType::PatternAnalysis,
         DocType::WeeklySummary,
         DocType::MonthlySummary,
      ] {
         assert_eq!(DocType::parse(doc_type.as_str()), Some(doc_type));
      }
      assert_eq!(DocType::parse("haiku"), None);
   }

   #[test]
   fn test_summary_flavors_not_dispatchable() {
      assert!(!DocType::WeeklySummary.is_dispatchable());
      assert!(!DocType::MonthlySummary.is_dispatchable());
      assert!(DocType::FunctionDoc.is_dispatchable());
   }

   fn snippet(function: Option<&str>, class: Option<&str>) -> CodeSnippet {
      CodeSnippet {
         repo:            "demo".to_string(),
         file_path:       PathBuf::from("/tmp/demo/util.py"),
         function_name:   function.map(str::to_string),
         class_name:      class.map(str::to_string),
         language:        Language::Python,
         source:          "def f():\n    pass\n".to_string(),
         start_line:      10,
         end_line:        24,
         complexity:      4.0,
         nesting_depth:   2,
         parameter_count: 1,
         interest_score:  40.0,
         doc_type:        DocType::FunctionDoc,
      }
   }

   #[test]
   fn test_display_name_composition() {
      assert_eq!(snippet(Some("save"), Some("Store")).display_name(), "Store.save");
      assert_eq!(snippet(Some("save"), None).display_name(), "save");
      assert_eq!(snippet(None, Some("Store")).display_name(), "Store");
      assert_eq!(snippet(None, None).display_name(), "util");
   }

   #[test]
   fn test_line_count_inclusive() {
      assert_eq!(snippet(None, None).line_count(), 15);
   }

   #[test]
   fn test_snippet_filename_policy() {
      let name = snippet_filename(&snippet(Some("parse-it"), None), "deadbeefcafe");
      assert_eq!(name, "parse_it_deadbeef.md");
   }

   #[test]
   fn test_documented_snippet_serde_roundtrip() {
      let record = DocumentedSnippet {
         id:            "5e1f".to_string(),
         source_repo:   "demo".to_string(),
         source_file:   "/tmp/demo/util.py".to_string(),
         function_name: Some("save".to_string()),
         class_name:    None,
         code_hash:     "abc123".to_string(),
         documented_at: Utc::now(),
         snippet_path:  "snippets/python/save_abc123.md".to_string(),
         git_commit:    Some("1a2b3c4d".to_string()),
         doc_type:      DocType::SecurityReview,
      };
      let json = serde_json::to_string(&record).unwrap();
      let back: DocumentedSnippet = serde_json::from_str(&json).unwrap();
      assert_eq!(record, back);
   }
}
