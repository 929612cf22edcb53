use std::{path::PathBuf, sync::LazyLock};

use parking_lot::Mutex;
use rust_embed::RustEmbed;
use tera::{Context, Tera};

use crate::{
   error::{Result, WormError},
   targets::DocumentationTarget,
   types::{DocType, Language},
};

/// Source is truncated to this many characters before template fill
const SOURCE_CAP: usize = 5000;
/// Documentation excerpt carried into the commit-message prompt
const COMMIT_DOC_CAP: usize = 500;
/// Commit messages are hard-capped at this length
pub const COMMIT_SUBJECT_LIMIT: usize = 72;

/// Embedded prompt templates (compiled into the binary)
#[derive(RustEmbed)]
#[folder = "prompts/"]
struct Prompts;

/// Global Tera instance for template rendering (Mutex for mutable access)
static TERA: LazyLock<Mutex<Tera>> = LazyLock::new(|| {
   let mut tera = Tera::default();
   // Prompt templates are markdown, never HTML
   tera.autoescape_on(vec![]);
   Mutex::new(tera)
});

/// A rendered `(system, user)` prompt pair
#[derive(Debug, Clone)]
pub struct PromptPair {
   pub system: String,
   pub user:   String,
}

/// Language-specific guidance appended to the system prompt
const fn language_hint(language: Language) -> &'static str {
   match language {
      Language::Python => "Focus on Pythonic patterns, type hints, decorators, and context managers",
      Language::Typescript => "Note TypeScript-specific types, generics, and async patterns",
      Language::Tsx => "Cover React component patterns, hooks usage, and prop types",
      Language::Javascript => "Highlight async/await patterns, closures, and module patterns",
      Language::Go => "Emphasize Go idioms like error handling, goroutines, and interfaces",
      Language::Rust => "Focus on ownership, borrowing, lifetimes, and Result/Option patterns",
   }
}

/// Determine the user prompts directory (~/.codeworm/prompts/) if a home
/// directory exists
fn get_user_prompts_dir() -> Option<PathBuf> {
   std::env::var("HOME")
      .or_else(|_| std::env::var("USERPROFILE"))
      .ok()
      .map(|home| PathBuf::from(home).join(".codeworm").join("prompts"))
}

/// Unpack embedded prompts into the user directory so operators can edit
/// them; files whose content already matches are left alone
pub fn ensure_prompts_dir() -> Result<()> {
   let Some(user_prompts_dir) = get_user_prompts_dir() else {
      // No HOME/USERPROFILE; fall back to the embedded prompts in-memory
      return Ok(());
   };

   for file in Prompts::iter() {
      let file_path = user_prompts_dir.join(file.as_ref());

      if let Some(parent) = file_path.parent() {
         std::fs::create_dir_all(parent).map_err(|e| {
            WormError::Other(format!("Failed to create directory {}: {}", parent.display(), e))
         })?;
      }

      if let Some(embedded_file) = Prompts::get(file.as_ref()) {
         let embedded_content = embedded_file.data;

         let should_write = match std::fs::read(&file_path) {
            Ok(existing) => existing != embedded_content.as_ref(),
            Err(_) => true,
         };

         if should_write {
            std::fs::write(&file_path, embedded_content.as_ref()).map_err(|e| {
               WormError::Other(format!("Failed to write file {}: {}", file_path.display(), e))
            })?;
         }
      }
   }

   Ok(())
}

/// Load a template, preferring a user-provided override over the embedded
/// default
fn load_template_file(category: &str, name: &str) -> Result<String> {
   if let Some(prompts_dir) = get_user_prompts_dir() {
      let template_path = prompts_dir.join(category).join(format!("{name}.md"));
      if template_path.exists() {
         return std::fs::read_to_string(&template_path).map_err(|e| {
            WormError::TemplateError(format!(
               "Failed to read template file {}: {}",
               template_path.display(),
               e
            ))
         });
      }
   }

   let embedded_key = format!("{category}/{name}.md");
   if let Some(bytes) = Prompts::get(&embedded_key) {
      return std::str::from_utf8(bytes.data.as_ref())
         .map(str::to_string)
         .map_err(|e| {
            WormError::TemplateError(format!("Embedded template {embedded_key} is not valid UTF-8: {e}"))
         });
   }

   Err(WormError::TemplateError(format!(
      "Template '{name}' in category '{category}' not found as user override or embedded default"
   )))
}

fn truncate_chars(s: &str, cap: usize) -> String {
   if s.chars().count() <= cap {
      s.to_string()
   } else {
      s.chars().take(cap).collect()
   }
}

fn render(template: &str, context: &Context, what: &str) -> Result<String> {
   let mut tera = TERA.lock();
   tera
      .render_str(template, context)
      .map_err(|e| WormError::TemplateError(format!("Failed to render {what} template: {e}")))
}

/// Flavors that document a single function and get decorator/async suffixes
const fn is_function_level(doc_type: DocType) -> bool {
   matches!(
      doc_type,
      DocType::FunctionDoc | DocType::SecurityReview | DocType::PerformanceAnalysis | DocType::Til
   )
}

fn target_context(target: &DocumentationTarget) -> Context {
   let snippet = &target.snippet;
   let file_path = target
      .metadata
      .get("relative_path")
      .and_then(|v| v.as_str())
      .map_or_else(|| snippet.file_path.to_string_lossy().into_owned(), str::to_string);

   let mut context = Context::new();
   context.insert("language", snippet.language.as_str());
   context.insert("source", &truncate_chars(&target.source_context, SOURCE_CAP));
   context.insert("name", &target.display_name());
   context.insert("file_path", &file_path);
   context.insert("repo", &snippet.repo);
   context.insert("complexity", &snippet.complexity);
   context.insert("line_count", &snippet.line_count());
   context
}

/// Build the `(system, user)` prompt pair for a documentation target.
/// The flavor picks the template pair; the language hint is appended to the
/// system prompt; function-level flavors note decorators and async.
pub fn build_documentation_prompt(target: &DocumentationTarget) -> Result<PromptPair> {
   let flavor = target.doc_type.as_str();
   let system_template = load_template_file("system", flavor)?;
   let user_template = load_template_file("user", flavor)?;

   let context = target_context(target);
   let mut system = render(&system_template, &context, flavor)?;
   let mut user = render(&user_template, &context, flavor)?;

   let hint = language_hint(target.snippet.language);
   if !hint.is_empty() {
      system.push_str("\n\nLanguage-specific guidance: ");
      system.push_str(hint);
   }

   if is_function_level(target.doc_type) {
      if let Some(decorators) = target.metadata.get("decorators").and_then(|v| v.as_array()) {
         let names: Vec<&str> = decorators.iter().filter_map(|d| d.as_str()).collect();
         if !names.is_empty() {
            user.push_str(&format!("\n\nDecorators present: {}", names.join(", ")));
         }
      }
      if target.metadata.get("is_async").and_then(serde_json::Value::as_bool) == Some(true) {
         user.push_str("\n\nThis is an async function.");
      }
   }

   Ok(PromptPair { system, user })
}

/// Build the secondary prompt that asks the model for a commit message
pub fn build_commit_message_prompt(
   documentation: &str,
   target: &DocumentationTarget,
) -> Result<PromptPair> {
   let system_template = load_template_file("system", "commit_message")?;
   let user_template = load_template_file("user", "commit_message")?;

   let mut context = Context::new();
   context.insert("documentation", &truncate_chars(documentation, COMMIT_DOC_CAP));
   context.insert("name", &target.display_name());
   context.insert("language", target.snippet.language.as_str());
   context.insert("repo", &target.snippet.repo);

   Ok(PromptPair {
      system: render(&system_template, &context, "commit_message")?,
      user:   render(&user_template, &context, "commit_message")?,
   })
}

/// Normalize raw model output into a usable commit subject: first line,
/// stripped of wrapping quotes/backticks, hard-capped at 72 chars
pub fn clean_commit_message(raw: &str) -> String {
   let first_line = raw.trim().lines().next().unwrap_or("").trim();
   let stripped = first_line
      .trim_matches(|c| c == '"' || c == '\'' || c == '`')
      .trim();

   if stripped.chars().count() <= COMMIT_SUBJECT_LIMIT {
      stripped.to_string()
   } else {
      stripped.chars().take(COMMIT_SUBJECT_LIMIT).collect()
   }
}

#[cfg(test)]
mod tests {
   use std::path::PathBuf;

   use serde_json::json;

   use super::*;
   use crate::types::CodeSnippet;

   fn target(doc_type: DocType) -> DocumentationTarget {
      let snippet = CodeSnippet {
         repo:            "demo".to_string(),
         file_path:       PathBuf::from("/tmp/demo/app.py"),
         function_name:   Some("compute".to_string()),
         class_name:      None,
         language:        Language::Python,
         source:          "def compute(x, y):\n    return x + y\n".to_string(),
         start_line:      10,
         end_line:        20,
         complexity:      8.0,
         nesting_depth:   3,
         parameter_count: 2,
         interest_score:  55.0,
         doc_type,
      };
      DocumentationTarget {
         doc_type,
         source_context: snippet.source.clone(),
         metadata: json!({
            "relative_path": "app.py",
            "decorators": ["@lru_cache"],
            "is_async": true,
         }),
         snippet,
      }
   }

   #[test]
   fn test_function_doc_prompt_interpolates_context() {
      let pair = build_documentation_prompt(&target(DocType::FunctionDoc)).unwrap();
      assert!(pair.user.contains("def compute(x, y):"));
      assert!(pair.user.contains("compute"));
      assert!(pair.user.contains("app.py"));
      assert!(pair.user.contains("demo"));
      assert!(pair.system.contains("Language-specific guidance"));
      assert!(pair.system.contains("Pythonic"));
   }

   #[test]
   fn test_function_level_suffixes() {
      let pair = build_documentation_prompt(&target(DocType::SecurityReview)).unwrap();
      assert!(pair.user.contains("Decorators present: @lru_cache"));
      assert!(pair.user.contains("This is an async function."));
   }

   #[test]
   fn test_non_function_flavors_skip_suffixes() {
      let pair = build_documentation_prompt(&target(DocType::FileDoc)).unwrap();
      assert!(!pair.user.contains("Decorators present"));
      assert!(!pair.user.contains("async function"));
   }

   #[test]
   fn test_every_dispatchable_flavor_has_templates() {
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
      ] {
         let pair = build_documentation_prompt(&target(doc_type)).unwrap();
         assert!(!pair.system.is_empty(), "{doc_type} system prompt empty");
         assert!(!pair.user.is_empty(), "{doc_type} user prompt empty");
      }
   }

   #[test]
   fn test_commit_message_prompt() {
      let pair =
         build_commit_message_prompt("Explains the compute helper.", &target(DocType::FunctionDoc))
            .unwrap();
      assert!(pair.user.contains("Explains the compute helper."));
      assert!(pair.user.contains("compute"));
      assert!(pair.system.contains("commit messages"));
   }

   #[test]
   fn test_source_truncated_before_fill() {
      let mut t = target(DocType::FunctionDoc);
      t.source_context = "x".repeat(20_000);
      let pair = build_documentation_prompt(&t).unwrap();
      assert!(pair.user.len() < 10_000);
   }

   #[test]
   fn test_clean_commit_message() {
      assert_eq!(clean_commit_message("\"Document compute helper\"\n"), "Document compute helper");
      assert_eq!(clean_commit_message("`Analyze parser`"), "Analyze parser");
      assert_eq!(
         clean_commit_message("Document the thing\nAnd a second line"),
         "Document the thing"
      );
      let long = format!("Document {}", "x".repeat(100));
      assert_eq!(clean_commit_message(&long).chars().count(), COMMIT_SUBJECT_LIMIT);
      assert_eq!(clean_commit_message("   "), "");
   }
}
