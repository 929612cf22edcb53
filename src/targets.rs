use std::{collections::HashSet, path::Path, process::Command};

use ignore::WalkBuilder;
use indexmap::IndexMap;
use rand::{
   Rng,
   distr::{Distribution, weighted::WeightedIndex},
};
use serde_json::json;

use crate::{
   analyzer::CodeAnalyzer,
   config::RepoEntry,
   parser::CodeExtractor,
   scanner::RepoScanner,
   types::{CodeSnippet, DocType, Language},
};

/// Snippet source carried on a target, in characters
const SNIPPET_CAP: usize = 4000;
/// Context handed to the prompt builder, in characters
const CONTEXT_CAP: usize = 6000;

/// A chosen code unit, ready to be handed to the LLM
#[derive(Debug, Clone)]
pub struct DocumentationTarget {
   pub doc_type:       DocType,
   pub snippet:        CodeSnippet,
   pub source_context: String,
   pub metadata:       serde_json::Value,
}

impl DocumentationTarget {
   pub const fn score(&self) -> f64 {
      self.snippet.interest_score
   }

   pub fn display_name(&self) -> String {
      self.snippet.display_name()
   }
}

fn truncate_chars(s: &str, cap: usize) -> String {
   if s.chars().count() <= cap {
      s.to_string()
   } else {
      s.chars().take(cap).collect()
   }
}

// === File-level targets ===

/// Finds files worth documenting as a whole
pub struct FileTargetFinder;

impl FileTargetFinder {
   pub fn find(
      scanner: &RepoScanner,
      repo: &RepoEntry,
      limit: usize,
   ) -> Vec<DocumentationTarget> {
      let mut targets = Vec::new();

      for file in scanner.scan_repo(&repo.path, &repo.name) {
         let Ok(source) = std::fs::read_to_string(&file.path) else {
            continue;
         };

         let line_count = source.lines().count().max(1);
         if line_count < 20 {
            continue;
         }

         let extractor = CodeExtractor::new(&source, file.language);
         let func_count = extractor.extract_functions().len();

         let score = 100.0_f64.min(
            (line_count as f64 / 200.0).min(1.0) * 30.0
               + (func_count as f64 / 8.0).min(1.0) * 30.0
               + (file.size_bytes as f64 / 5000.0).min(1.0) * 20.0
               + (source.matches("import ").count() as f64 / 10.0).min(1.0) * 20.0,
         );
         if score < 20.0 {
            continue;
         }

         let snippet = CodeSnippet {
            repo:            repo.name.clone(),
            file_path:       file.path.clone(),
            function_name:   None,
            class_name:      None,
            language:        file.language,
            source:          truncate_chars(&source, SNIPPET_CAP),
            start_line:      1,
            end_line:        line_count,
            complexity:      0.0,
            nesting_depth:   0,
            parameter_count: 0,
            interest_score:  score,
            doc_type:        DocType::FileDoc,
         };

         targets.push(DocumentationTarget {
            doc_type: DocType::FileDoc,
            snippet,
            source_context: truncate_chars(&source, CONTEXT_CAP),
            metadata: json!({
               "line_count": line_count,
               "function_count": func_count,
               "relative_path": file.relative_path.to_string_lossy(),
            }),
         });

         if targets.len() >= limit * 2 {
            break;
         }
      }

      rank(&mut targets, limit);
      targets
   }
}

// === Class-level targets ===

/// Finds classes worth documenting (Python classes, per the extractor)
pub struct ClassTargetFinder;

impl ClassTargetFinder {
   pub fn find(
      scanner: &RepoScanner,
      repo: &RepoEntry,
      limit: usize,
   ) -> Vec<DocumentationTarget> {
      let mut targets = Vec::new();

      'files: for file in scanner.scan_repo(&repo.path, &repo.name) {
         let Ok(source) = std::fs::read_to_string(&file.path) else {
            continue;
         };

         let extractor = CodeExtractor::new(&source, file.language);
         for class in extractor.extract_classes() {
            let line_count = class.end_line - class.start_line + 1;
            if line_count < 15 {
               continue;
            }

            let method_count = class.methods.len();
            let score = 100.0_f64.min(
               (method_count as f64 / 6.0).min(1.0) * 35.0
                  + (line_count as f64 / 100.0).min(1.0) * 25.0
                  + if class.docstring.is_some() { 10.0 } else { 0.0 }
                  + (class.decorators.len() as f64 * 5.0).min(15.0)
                  + 15.0,
            );

            let snippet = CodeSnippet {
               repo:            repo.name.clone(),
               file_path:       file.path.clone(),
               function_name:   None,
               class_name:      Some(class.name.clone()),
               language:        file.language,
               source:          truncate_chars(&class.source, SNIPPET_CAP),
               start_line:      class.start_line,
               end_line:        class.end_line,
               complexity:      0.0,
               nesting_depth:   0,
               parameter_count: 0,
               interest_score:  score,
               doc_type:        DocType::ClassDoc,
            };

            let method_names: Vec<&str> = class.methods.iter().map(|m| m.name.as_str()).collect();
            targets.push(DocumentationTarget {
               doc_type: DocType::ClassDoc,
               snippet,
               source_context: truncate_chars(&class.source, CONTEXT_CAP),
               metadata: json!({
                  "method_count": method_count,
                  "method_names": method_names,
                  "has_docstring": class.docstring.is_some(),
                  "relative_path": file.relative_path.to_string_lossy(),
               }),
            });

            if targets.len() >= limit * 2 {
               break 'files;
            }
         }
      }

      rank(&mut targets, limit);
      targets
   }
}

// === Module-level targets ===

/// Finds Python packages (`__init__.py`) and TS modules (`index.ts`)
pub struct ModuleTargetFinder;

impl ModuleTargetFinder {
   const SKIP_DIRS: &'static [&'static str] = &[
      "node_modules",
      ".git",
      "venv",
      ".venv",
      "__pycache__",
      "dist",
      "build",
      "vendor",
      "target",
      ".tox",
      ".mypy_cache",
   ];

   pub fn find(repo: &RepoEntry, limit: usize) -> Vec<DocumentationTarget> {
      let mut targets = Vec::new();
      if !repo.path.exists() {
         return targets;
      }

      Self::find_indexed(repo, "__init__.py", &["py"], Language::Python, limit, &mut targets);
      Self::find_indexed(repo, "index.ts", &["ts", "tsx"], Language::Typescript, limit, &mut targets);

      rank(&mut targets, limit);
      targets
   }

   fn find_indexed(
      repo: &RepoEntry,
      index_name: &str,
      sibling_exts: &[&str],
      language: Language,
      limit: usize,
      targets: &mut Vec<DocumentationTarget>,
   ) {
      let walker = WalkBuilder::new(&repo.path)
         .hidden(true)
         .git_ignore(true)
         .require_git(false)
         .build();

      let mut found = 0_usize;
      for entry in walker {
         let Ok(entry) = entry else { continue };
         let path = entry.path();
         if path.file_name().and_then(|n| n.to_str()) != Some(index_name) {
            continue;
         }

         let Some(pkg_dir) = path.parent() else { continue };
         let Ok(rel_dir) = pkg_dir.strip_prefix(&repo.path) else {
            continue;
         };
         if rel_dir
            .components()
            .any(|c| Self::SKIP_DIRS.contains(&c.as_os_str().to_string_lossy().as_ref()))
         {
            continue;
         }

         let mut siblings: Vec<String> = std::fs::read_dir(pkg_dir)
            .map(|entries| {
               entries
                  .filter_map(std::result::Result::ok)
                  .filter(|e| {
                     e.path()
                        .extension()
                        .and_then(|x| x.to_str())
                        .is_some_and(|x| sibling_exts.contains(&x))
                  })
                  .filter_map(|e| e.file_name().to_str().map(str::to_string))
                  .collect()
            })
            .unwrap_or_default();
         siblings.sort();

         let file_count = siblings.len();
         if file_count < 2 {
            continue;
         }

         let index_content = std::fs::read_to_string(path).unwrap_or_default();

         let file_listing: String =
            siblings.iter().map(|name| format!("  - {name}\n")).collect();
         let mut context = format!(
            "Module: {}\nFiles ({file_count}):\n{file_listing}",
            rel_dir.display()
         );
         if !index_content.trim().is_empty() {
            context.push_str(&format!(
               "\n{index_name}:\n{}",
               truncate_chars(&index_content, 2000)
            ));
         }

         let score = 100.0_f64.min(
            (file_count as f64 / 8.0).min(1.0) * 40.0
               + (index_content.len() as f64 / 500.0).min(1.0) * 30.0
               + 30.0,
         );

         let snippet = CodeSnippet {
            repo:            repo.name.clone(),
            file_path:       pkg_dir.to_path_buf(),
            function_name:   None,
            class_name:      None,
            language,
            source:          truncate_chars(&context, SNIPPET_CAP),
            start_line:      1,
            end_line:        1,
            complexity:      0.0,
            nesting_depth:   0,
            parameter_count: 0,
            interest_score:  score,
            doc_type:        DocType::ModuleDoc,
         };

         targets.push(DocumentationTarget {
            doc_type: DocType::ModuleDoc,
            snippet,
            source_context: truncate_chars(&context, CONTEXT_CAP),
            metadata: json!({
               "package_path": rel_dir.to_string_lossy(),
               "file_count": file_count,
               "file_names": siblings,
               "has_index_content": !index_content.trim().is_empty(),
            }),
         });

         found += 1;
         if found >= limit {
            break;
         }
      }
   }
}

// === Evolution targets ===

/// Finds recently changed files with their diffs from git history
pub struct EvolutionTargetFinder;

impl EvolutionTargetFinder {
   const COMMIT_WINDOW: usize = 20;
   const MIN_DIFF_BYTES: usize = 20;

   pub fn find(repo: &RepoEntry, limit: usize) -> Vec<DocumentationTarget> {
      let mut targets = Vec::new();

      let commits = Self::recent_commits(&repo.path);
      if commits.len() < 2 {
         return targets;
      }

      let mut seen_files: HashSet<String> = HashSet::new();

      'commits: for pair in commits.windows(2) {
         let (commit, parent) = (&pair[0], &pair[1]);

         for (status, file_path) in Self::changed_files(&repo.path, parent, commit) {
            if seen_files.contains(&file_path) {
               continue;
            }
            let Some(language) = Language::from_path(Path::new(&file_path)) else {
               continue;
            };
            seen_files.insert(file_path.clone());

            let diff_text = Self::file_diff(&repo.path, parent, commit, &file_path);
            if diff_text.len() < Self::MIN_DIFF_BYTES {
               continue;
            }

            let is_new_file = status == "A";
            let added_lines = diff_text
               .lines()
               .filter(|l| l.starts_with('+') && !l.starts_with("+++"))
               .count();

            let score = 100.0_f64.min(
               (diff_text.len() as f64 / 1000.0).min(1.0) * 40.0
                  + 30.0
                  + if is_new_file { 10.0 } else { 0.0 }
                  + (added_lines as f64 / 20.0).min(1.0) * 20.0,
            );

            let (subject, author) = Self::commit_subject(&repo.path, commit);
            let short_hash = &commit[..commit.len().min(8)];
            let context = format!(
               "Commit: {short_hash}\nMessage: {subject}\nAuthor: {author}\nFile: {file_path}\nChange type: {}\n\nDiff:\n{}",
               if is_new_file { "new file" } else { "modified" },
               truncate_chars(&diff_text, 5000)
            );

            let snippet = CodeSnippet {
               repo:            repo.name.clone(),
               file_path:       repo.path.join(&file_path),
               function_name:   None,
               class_name:      None,
               language,
               source:          truncate_chars(&diff_text, SNIPPET_CAP),
               start_line:      1,
               end_line:        1,
               complexity:      0.0,
               nesting_depth:   0,
               parameter_count: 0,
               interest_score:  score,
               doc_type:        DocType::CodeEvolution,
            };

            targets.push(DocumentationTarget {
               doc_type: DocType::CodeEvolution,
               snippet,
               source_context: truncate_chars(&context, CONTEXT_CAP),
               metadata: json!({
                  "commit_hash": short_hash,
                  "commit_message": truncate_chars(&subject, 100),
                  "is_new_file": is_new_file,
                  "relative_path": file_path,
               }),
            });

            if targets.len() >= limit {
               break 'commits;
            }
         }
      }

      rank(&mut targets, limit);
      targets
   }

   fn recent_commits(repo_path: &Path) -> Vec<String> {
      let Ok(output) = Command::new("git")
         .args(["log", &format!("-{}", Self::COMMIT_WINDOW), "--format=%H"])
         .current_dir(repo_path)
         .output()
      else {
         return Vec::new();
      };
      if !output.status.success() {
         return Vec::new();
      }
      String::from_utf8_lossy(&output.stdout)
         .lines()
         .map(str::to_string)
         .collect()
   }

   fn changed_files(repo_path: &Path, parent: &str, commit: &str) -> Vec<(String, String)> {
      let Ok(output) = Command::new("git")
         .args(["diff", "--name-status", parent, commit])
         .current_dir(repo_path)
         .output()
      else {
         return Vec::new();
      };
      if !output.status.success() {
         return Vec::new();
      }
      String::from_utf8_lossy(&output.stdout)
         .lines()
         .filter_map(|line| {
            let mut parts = line.split('\t');
            let status = parts.next()?.trim().to_string();
            let path = parts.next_back()?.trim().to_string();
            (!path.is_empty()).then_some((status, path))
         })
         .collect()
   }

   fn file_diff(repo_path: &Path, parent: &str, commit: &str, file: &str) -> String {
      let Ok(output) = Command::new("git")
         .args(["diff", parent, commit, "--", file])
         .current_dir(repo_path)
         .output()
      else {
         return String::new();
      };
      if !output.status.success() {
         return String::new();
      }
      String::from_utf8_lossy(&output.stdout).into_owned()
   }

   fn commit_subject(repo_path: &Path, commit: &str) -> (String, String) {
      let Ok(output) = Command::new("git")
         .args(["show", "-s", "--format=%s%x00%an", commit])
         .current_dir(repo_path)
         .output()
      else {
         return (String::new(), String::new());
      };
      let raw = String::from_utf8_lossy(&output.stdout);
      let mut parts = raw.trim().splitn(2, '\0');
      (
         parts.next().unwrap_or_default().to_string(),
         parts.next().unwrap_or_default().to_string(),
      )
   }
}

// === Pattern targets ===

/// Finds design-pattern usage by counting indicator tokens per file
pub struct PatternTargetFinder;

/// `(name, description, indicator tokens)` per recognized pattern
const PATTERN_SIGNATURES: &[(&str, &str, &[&str])] = &[
   ("singleton", "Singleton pattern", &["_instance", "__new__", "getInstance"]),
   ("factory", "Factory pattern", &["create_", "make_", "build_", "factory"]),
   (
      "observer",
      "Observer/Event pattern",
      &["subscribe", "notify", "on_event", "emit", "listener", "addEventListener"],
   ),
   (
      "decorator_pattern",
      "Decorator pattern",
      &["wrapper", "wraps", "functools.wraps", "@wraps"],
   ),
   ("strategy", "Strategy pattern", &["Strategy", "execute", "set_strategy", "algorithm"]),
   ("middleware", "Middleware/Pipeline pattern", &["middleware", "next()", "dispatch", "use("]),
   (
      "repository_pattern",
      "Repository pattern",
      &["Repository", "get_by_id", "find_all", "save(", "delete("],
   ),
];

impl PatternTargetFinder {
   const MIN_MATCHES: usize = 2;

   pub fn find(
      scanner: &RepoScanner,
      repo: &RepoEntry,
      limit: usize,
   ) -> Vec<DocumentationTarget> {
      let mut targets = Vec::new();

      'files: for file in scanner.scan_repo(&repo.path, &repo.name) {
         let Ok(source) = std::fs::read_to_string(&file.path) else {
            continue;
         };

         for (pattern, description, indicators) in PATTERN_SIGNATURES {
            let matches = indicators.iter().filter(|token| source.contains(**token)).count();
            if matches < Self::MIN_MATCHES {
               continue;
            }

            let score = 100.0_f64.min(matches as f64 * 15.0 + 30.0);
            let line_count = source.lines().count().max(1);

            let snippet = CodeSnippet {
               repo:            repo.name.clone(),
               file_path:       file.path.clone(),
               function_name:   Some((*pattern).to_string()),
               class_name:      None,
               language:        file.language,
               source:          truncate_chars(&source, SNIPPET_CAP),
               start_line:      1,
               end_line:        line_count,
               complexity:      0.0,
               nesting_depth:   0,
               parameter_count: 0,
               interest_score:  score,
               doc_type:        DocType::PatternAnalysis,
            };

            targets.push(DocumentationTarget {
               doc_type: DocType::PatternAnalysis,
               snippet,
               source_context: truncate_chars(&source, CONTEXT_CAP),
               metadata: json!({
                  "pattern": pattern,
                  "pattern_description": description,
                  "indicator_matches": matches,
                  "relative_path": file.relative_path.to_string_lossy(),
               }),
            });
         }

         if targets.len() >= limit * 2 {
            break 'files;
         }
      }

      rank(&mut targets, limit);
      targets
   }
}

// === Router ===

/// Routes a documentation flavor to the appropriate finder
pub struct TargetRouter {
   analyzer: CodeAnalyzer,
   scanner:  RepoScanner,
}

impl TargetRouter {
   pub fn new(analyzer: CodeAnalyzer, scanner: RepoScanner) -> Self {
      Self { analyzer, scanner }
   }

   pub fn find_targets(
      &mut self,
      doc_type: DocType,
      repo: &RepoEntry,
      limit: usize,
   ) -> Vec<DocumentationTarget> {
      match doc_type {
         DocType::FunctionDoc => self.function_targets(repo, DocType::FunctionDoc, limit),
         DocType::SecurityReview | DocType::PerformanceAnalysis | DocType::Til => {
            self.function_targets(repo, doc_type, limit)
         },
         DocType::FileDoc => FileTargetFinder::find(&self.scanner, repo, limit),
         DocType::ClassDoc => ClassTargetFinder::find(&self.scanner, repo, limit),
         DocType::ModuleDoc => ModuleTargetFinder::find(repo, limit),
         DocType::CodeEvolution => EvolutionTargetFinder::find(repo, limit),
         DocType::PatternAnalysis => PatternTargetFinder::find(&self.scanner, repo, limit),
         DocType::WeeklySummary | DocType::MonthlySummary => Vec::new(),
      }
   }

   /// Function candidates, re-tagged for the requested flavor. Security,
   /// performance and TIL flavors share the function heuristic and differ
   /// only in the prompt.
   fn function_targets(
      &mut self,
      repo: &RepoEntry,
      doc_type: DocType,
      limit: usize,
   ) -> Vec<DocumentationTarget> {
      self
         .analyzer
         .find_candidates(repo, limit)
         .into_iter()
         .map(|candidate| {
            let mut snippet = candidate.snippet;
            snippet.doc_type = doc_type;
            let source_context = snippet.source.clone();
            DocumentationTarget {
               doc_type,
               metadata: json!({
                  "complexity": snippet.complexity,
                  "nesting_depth": snippet.nesting_depth,
                  "parameter_count": snippet.parameter_count,
                  "relative_path": candidate.relative_path.to_string_lossy(),
                  "decorators": candidate.parsed_function.decorators,
                  "is_async": candidate.parsed_function.is_async,
               }),
               snippet,
               source_context,
            }
         })
         .collect()
   }
}

fn rank(targets: &mut Vec<DocumentationTarget>, limit: usize) {
   targets.sort_by(|a, b| b.score().total_cmp(&a.score()));
   targets.truncate(limit);
}

// === Flavor and repo selection ===

/// Weighted-random choice of a dispatchable documentation flavor.
/// Unknown keys and summary flavors are ignored; an empty map falls back to
/// function docs.
pub fn select_doc_type(weights: &IndexMap<String, u32>, rng: &mut impl Rng) -> DocType {
   let entries: Vec<(DocType, u32)> = dispatchable_doc_types(weights);

   if entries.is_empty() || entries.iter().all(|(_, w)| *w == 0) {
      return DocType::FunctionDoc;
   }

   let dist = match WeightedIndex::new(entries.iter().map(|(_, w)| *w)) {
      Ok(dist) => dist,
      Err(_) => return DocType::FunctionDoc,
   };
   entries[dist.sample(rng)].0
}

/// Dispatchable flavors in the map's iteration order, with their weights
pub fn dispatchable_doc_types(weights: &IndexMap<String, u32>) -> Vec<(DocType, u32)> {
   weights
      .iter()
      .filter_map(|(key, weight)| DocType::parse(key).map(|d| (d, *weight)))
      .filter(|(doc_type, _)| doc_type.is_dispatchable())
      .collect()
}

/// Selects repositories by configured weight
pub struct WeightedRepoSelector {
   repos: Vec<RepoEntry>,
}

impl WeightedRepoSelector {
   pub fn new(repos: &[RepoEntry]) -> Self {
      Self { repos: repos.iter().filter(|r| r.enabled).cloned().collect() }
   }

   pub const fn is_empty(&self) -> bool {
      self.repos.is_empty()
   }

   /// One weighted-random pick
   pub fn select(&self, rng: &mut impl Rng) -> Option<&RepoEntry> {
      if self.repos.is_empty() {
         return None;
      }
      let dist = WeightedIndex::new(self.repos.iter().map(|r| r.weight)).ok()?;
      self.repos.get(dist.sample(rng))
   }

   /// All enabled repos in weighted-random order without replacement; the
   /// daemon walks this until a cycle finds an eligible target
   pub fn shuffled(&self, rng: &mut impl Rng) -> Vec<RepoEntry> {
      let mut remaining: Vec<RepoEntry> = self.repos.clone();
      let mut ordered = Vec::with_capacity(remaining.len());

      while !remaining.is_empty() {
         let Ok(dist) = WeightedIndex::new(remaining.iter().map(|r| r.weight)) else {
            ordered.append(&mut remaining);
            break;
         };
         let idx = dist.sample(rng);
         ordered.push(remaining.swap_remove(idx));
      }

      ordered
   }
}

#[cfg(test)]
mod tests {
   use std::{fs, path::PathBuf};

   use rand::{SeedableRng, rngs::StdRng};

   use super::*;
   use crate::config::AnalyzerSettings;

   fn repo(dir: &Path) -> RepoEntry {
      RepoEntry { name: "demo".to_string(), path: dir.to_path_buf(), weight: 5, enabled: true }
   }

   fn scanner() -> RepoScanner {
      RepoScanner::from_settings(&AnalyzerSettings::default()).unwrap()
   }

   #[test]
   fn test_file_finder_scores_and_ranks() {
      let dir = tempfile::tempdir().unwrap();
      let mut big = String::from("import os\nimport sys\n");
      for i in 0..60 {
         big.push_str(&format!("def f{i}(a):\n    return a + {i}\n"));
      }
      fs::write(dir.path().join("big.py"), &big).unwrap();
      fs::write(dir.path().join("small.py"), "x = 1\ny = 2\nz = 3\n").unwrap();

      let targets = FileTargetFinder::find(&scanner(), &repo(dir.path()), 5);
      assert_eq!(targets.len(), 1);
      assert_eq!(targets[0].doc_type, DocType::FileDoc);
      assert!(targets[0].score() > 20.0);
      assert_eq!(targets[0].metadata["function_count"], 60);
   }

   #[test]
   fn test_class_finder_requires_fifteen_lines() {
      let dir = tempfile::tempdir().unwrap();
      let source = r#"class Engine:
    """Drives the pipeline."""

    def start(self):
        self.running = True
        return self.running

    def stop(self):
        self.running = False
        return self.running

    def restart(self):
        self.stop()
        self.start()
        return True


class Tiny:
    def one(self):
        return 1
"#;
      fs::write(dir.path().join("engine.py"), source).unwrap();

      let targets = ClassTargetFinder::find(&scanner(), &repo(dir.path()), 5);
      assert_eq!(targets.len(), 1);
      assert_eq!(targets[0].snippet.class_name.as_deref(), Some("Engine"));
      assert_eq!(targets[0].metadata["method_count"], 3);
      assert_eq!(targets[0].metadata["has_docstring"], true);
   }

   #[test]
   fn test_module_finder_needs_two_siblings() {
      let dir = tempfile::tempdir().unwrap();
      fs::create_dir_all(dir.path().join("pkg")).unwrap();
      fs::write(dir.path().join("pkg/__init__.py"), "from .core import run\n").unwrap();
      fs::write(dir.path().join("pkg/core.py"), "def run():\n    pass\n").unwrap();
      fs::write(dir.path().join("pkg/util.py"), "def helper():\n    pass\n").unwrap();

      fs::create_dir_all(dir.path().join("lonely")).unwrap();
      fs::write(dir.path().join("lonely/__init__.py"), "").unwrap();

      let targets = ModuleTargetFinder::find(&repo(dir.path()), 5);
      assert_eq!(targets.len(), 1);
      assert_eq!(targets[0].metadata["package_path"], "pkg");
      assert_eq!(targets[0].metadata["file_count"], 3);
      assert!(targets[0].source_context.contains("core.py"));
   }

   #[test]
   fn test_pattern_finder_observer_signature() {
      let dir = tempfile::tempdir().unwrap();
      let source = r"
class Bus:
    def subscribe(self, handler):
        self.handlers.append(handler)

    def emit(self, event):
        for handler in self.handlers:
            handler(event)
";
      fs::write(dir.path().join("bus.py"), source).unwrap();

      let targets = PatternTargetFinder::find(&scanner(), &repo(dir.path()), 5);
      let observer = targets
         .iter()
         .find(|t| t.metadata["pattern"] == "observer")
         .unwrap();
      assert_eq!(observer.doc_type, DocType::PatternAnalysis);
      assert!(observer.metadata["indicator_matches"].as_u64().unwrap() >= 2);
   }

   #[test]
   fn test_evolution_finder_reads_git_history() {
      let dir = tempfile::tempdir().unwrap();
      let run = |args: &[&str]| {
         let output = Command::new("git")
            .args([
               "-c",
               "user.email=dev@example.com",
               "-c",
               "user.name=dev",
               "-c",
               "commit.gpgsign=false",
            ])
            .args(args)
            .current_dir(dir.path())
            .output()
            .unwrap();
         assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
      };

      run(&["init", "-q", "-b", "main"]);
      fs::write(dir.path().join("app.py"), "def first():\n    return 1\n").unwrap();
      run(&["add", "."]);
      run(&["commit", "-q", "-m", "add app"]);
      fs::write(
         dir.path().join("app.py"),
         "def first():\n    return 1\n\n\ndef second():\n    return 2\n",
      )
      .unwrap();
      run(&["add", "."]);
      run(&["commit", "-q", "-m", "add second"]);

      let targets = EvolutionTargetFinder::find(&repo(dir.path()), 5);
      assert_eq!(targets.len(), 1);
      let target = &targets[0];
      assert_eq!(target.doc_type, DocType::CodeEvolution);
      assert_eq!(target.metadata["relative_path"], "app.py");
      assert_eq!(target.metadata["commit_message"], "add second");
      assert!(target.snippet.source.contains("+def second():"));
      assert!(target.source_context.starts_with("Commit: "));
   }

   #[test]
   fn test_router_retags_perspective_flavors() {
      let dir = tempfile::tempdir().unwrap();
      let source = "def process(a, b, c, d):\n    if a and b:\n        for i in a:\n            if i and d:\n                while c:\n                    c -= 1\n                return i\n    if b or c:\n        return d\n    for j in b:\n        if j:\n            return j\n    return a\n";
      fs::write(dir.path().join("proc.py"), source).unwrap();

      let settings = AnalyzerSettings { min_lines: 5, ..Default::default() };
      let analyzer = CodeAnalyzer::with_seed(settings.clone(), 3).unwrap();
      let mut router = TargetRouter::new(analyzer, RepoScanner::from_settings(&settings).unwrap());

      let targets = router.find_targets(DocType::SecurityReview, &repo(dir.path()), 5);
      assert!(!targets.is_empty());
      assert_eq!(targets[0].doc_type, DocType::SecurityReview);
      assert_eq!(targets[0].snippet.doc_type, DocType::SecurityReview);
      assert_eq!(targets[0].snippet.function_name.as_deref(), Some("process"));
   }

   #[test]
   fn test_router_never_dispatches_summaries() {
      let dir = tempfile::tempdir().unwrap();
      let settings = AnalyzerSettings::default();
      let analyzer = CodeAnalyzer::with_seed(settings.clone(), 3).unwrap();
      let mut router = TargetRouter::new(analyzer, RepoScanner::from_settings(&settings).unwrap());

      assert!(router.find_targets(DocType::WeeklySummary, &repo(dir.path()), 5).is_empty());
      assert!(router.find_targets(DocType::MonthlySummary, &repo(dir.path()), 5).is_empty());
   }

   #[test]
   fn test_select_doc_type_honors_weights() {
      let mut rng = StdRng::seed_from_u64(11);
      let mut weights = IndexMap::new();
      weights.insert("til".to_string(), 10_u32);
      for _ in 0..20 {
         assert_eq!(select_doc_type(&weights, &mut rng), DocType::Til);
      }
   }

   #[test]
   fn test_select_doc_type_filters_summaries_and_unknowns() {
      let mut rng = StdRng::seed_from_u64(11);
      let mut weights = IndexMap::new();
      weights.insert("weekly_summary".to_string(), 100_u32);
      weights.insert("monthly_summary".to_string(), 100_u32);
      weights.insert("limerick".to_string(), 100_u32);
      assert_eq!(select_doc_type(&weights, &mut rng), DocType::FunctionDoc);
   }

   #[test]
   fn test_repo_selector_skips_disabled() {
      let mut rng = StdRng::seed_from_u64(5);
      let repos = vec![
         RepoEntry {
            name:    "on".to_string(),
            path:    PathBuf::from("/tmp/on"),
            weight:  5,
            enabled: true,
         },
         RepoEntry {
            name:    "off".to_string(),
            path:    PathBuf::from("/tmp/off"),
            weight:  10,
            enabled: false,
         },
      ];
      let selector = WeightedRepoSelector::new(&repos);
      for _ in 0..10 {
         assert_eq!(selector.select(&mut rng).unwrap().name, "on");
      }

      let order = selector.shuffled(&mut rng);
      assert_eq!(order.len(), 1);
      assert_eq!(order[0].name, "on");
   }

   #[test]
   fn test_empty_selector_yields_nothing() {
      let mut rng = StdRng::seed_from_u64(5);
      let selector = WeightedRepoSelector::new(&[]);
      assert!(selector.is_empty());
      assert!(selector.select(&mut rng).is_none());
      assert!(selector.shuffled(&mut rng).is_empty());
   }
}
