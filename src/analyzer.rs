use std::path::{Path, PathBuf};

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
   complexity::{ComplexityAnalyzer, ComplexityMetrics},
   config::{AnalyzerSettings, RepoEntry},
   error::Result,
   parser::{CodeExtractor, ParsedFunction},
   scanner::{RepoScanner, ScannedFile},
   scoring::{GitStats, InterestScore, InterestScorer, collect_git_stats},
   types::{CodeSnippet, DocType},
};

/// Function names that never make interesting documentation on their own
const SKIP_NAMES: &[&str] = &["__init__", "__str__", "__repr__", "main", "setUp", "tearDown"];

/// Survival probability for single-leading-underscore helpers
const UNDERSCORE_SURVIVAL: f64 = 0.3;

/// A function-level documentation candidate with its full scoring context
#[derive(Debug, Clone)]
pub struct AnalysisCandidate {
   pub snippet:         CodeSnippet,
   pub parsed_function: ParsedFunction,
   pub complexity:      ComplexityMetrics,
   pub git_stats:       GitStats,
   pub interest_score:  InterestScore,
   pub relative_path:   PathBuf,
}

impl AnalysisCandidate {
   pub const fn score(&self) -> f64 {
      self.interest_score.total
   }

   /// Minimum thresholds for a candidate to be offered to the daemon
   pub fn is_worth_documenting(&self) -> bool {
      self.score() >= 25.0 && self.snippet.line_count() >= 10
   }
}

/// Main code analysis engine: scans a repository, extracts functions, scores
/// them, and ranks the results.
pub struct CodeAnalyzer {
   settings: AnalyzerSettings,
   scanner:  RepoScanner,
   rng:      StdRng,
}

impl CodeAnalyzer {
   pub fn new(settings: AnalyzerSettings) -> Result<Self> {
      let scanner = RepoScanner::from_settings(&settings)?;
      Ok(Self { settings, scanner, rng: StdRng::from_os_rng() })
   }

   /// Deterministic candidate selection for tests
   pub fn with_seed(settings: AnalyzerSettings, seed: u64) -> Result<Self> {
      let scanner = RepoScanner::from_settings(&settings)?;
      Ok(Self { settings, scanner, rng: StdRng::seed_from_u64(seed) })
   }

   pub const fn scanner(&self) -> &RepoScanner {
      &self.scanner
   }

   /// Analyze one scanned file, yielding all extracted function candidates
   pub fn analyze_file(&mut self, file: &ScannedFile, repo_root: &Path) -> Vec<AnalysisCandidate> {
      let Ok(source) = std::fs::read_to_string(&file.path) else {
         return Vec::new();
      };

      let extractor = CodeExtractor::new(&source, file.language);
      let git_stats = collect_git_stats(repo_root, &file.path);
      let mut candidates = Vec::new();

      for parsed_func in extractor.extract_functions() {
         if self.should_skip_function(&parsed_func) {
            continue;
         }

         let complexity = ComplexityAnalyzer::analyze_function(&parsed_func, file.language);
         let interest = InterestScorer::score(
            &complexity,
            &git_stats,
            &parsed_func.decorators,
            parsed_func.is_async,
            &parsed_func.source,
         );

         let snippet = CodeSnippet {
            repo:            file.repo_name.clone(),
            file_path:       file.path.clone(),
            function_name:   Some(parsed_func.name.clone()),
            class_name:      parsed_func.class_name.clone(),
            language:        file.language,
            source:          parsed_func.source.clone(),
            start_line:      parsed_func.start_line,
            end_line:        parsed_func.end_line,
            complexity:      f64::from(complexity.cyclomatic_complexity),
            nesting_depth:   complexity.max_nesting_depth,
            parameter_count: complexity.parameter_count,
            interest_score:  interest.total,
            doc_type:        DocType::FunctionDoc,
         };

         candidates.push(AnalysisCandidate {
            snippet,
            parsed_function: parsed_func,
            complexity,
            git_stats: git_stats.clone(),
            interest_score: interest,
            relative_path: file.relative_path.clone(),
         });
      }

      candidates
   }

   /// Skip rules: dunder/setup names always, single-underscore helpers with
   /// 30% survival, and anything outside the configured line bounds
   fn should_skip_function(&mut self, func: &ParsedFunction) -> bool {
      if func.name.starts_with('_') && !func.name.starts_with("__") {
         return self.rng.random::<f64>() > UNDERSCORE_SURVIVAL;
      }

      if SKIP_NAMES.contains(&func.name.as_str()) {
         return true;
      }

      let line_count = func.end_line - func.start_line + 1;
      line_count < self.settings.min_lines || line_count > self.settings.max_lines
   }

   /// Find ranked documentation candidates in a repository
   pub fn find_candidates(&mut self, repo: &RepoEntry, limit: usize) -> Vec<AnalysisCandidate> {
      let mut candidates: Vec<AnalysisCandidate> = Vec::new();

      let files: Vec<ScannedFile> = self.scanner.scan_repo(&repo.path, &repo.name).collect();
      'outer: for file in &files {
         for candidate in self.analyze_file(file, &repo.path) {
            if candidate.is_worth_documenting() {
               candidates.push(candidate);
            }
            if candidates.len() >= limit * 3 {
               break 'outer;
            }
         }
      }

      candidates.sort_by(|a, b| b.score().total_cmp(&a.score()));
      candidates.truncate(limit);
      candidates
   }
}

#[cfg(test)]
mod tests {
   use std::fs;

   use super::*;

   const INTERESTING_SOURCE: &str = r#"def resolve_order(items, rules, strict=True):
    """Topologically order items under the given rules."""
    resolved = []
    pending = set(items)
    while pending:
        progressed = False
        for item in sorted(pending):
            deps = rules.get(item, [])
            if all(d in resolved for d in deps):
                resolved.append(item)
                pending.discard(item)
                progressed = True
        if not progressed:
            if strict:
                raise ValueError("cycle detected")
            resolved.extend(sorted(pending))
            break
    return resolved
"#;

   fn settings() -> AnalyzerSettings {
      AnalyzerSettings { min_lines: 5, ..Default::default() }
   }

   fn repo(dir: &Path) -> RepoEntry {
      RepoEntry { name: "demo".to_string(), path: dir.to_path_buf(), weight: 5, enabled: true }
   }

   #[test]
   fn test_find_candidates_ranks_by_score() {
      let dir = tempfile::tempdir().unwrap();
      fs::write(dir.path().join("deep.py"), INTERESTING_SOURCE).unwrap();
      fs::write(
         dir.path().join("shallow.py"),
         "def tiny(a):\n    x = a\n    y = x\n    z = y\n    return z\n",
      )
      .unwrap();

      let mut analyzer = CodeAnalyzer::with_seed(settings(), 7).unwrap();
      let candidates = analyzer.find_candidates(&repo(dir.path()), 10);

      assert!(!candidates.is_empty());
      assert_eq!(candidates[0].snippet.function_name.as_deref(), Some("resolve_order"));
      for pair in candidates.windows(2) {
         assert!(pair[0].score() >= pair[1].score());
      }
      for candidate in &candidates {
         assert!(candidate.is_worth_documenting());
      }
   }

   #[test]
   fn test_skip_names_never_selected() {
      let dir = tempfile::tempdir().unwrap();
      let source = "def main():\n    a = 1\n    b = 2\n    c = 3\n    d = 4\n    return a\n";
      fs::write(dir.path().join("entry.py"), source).unwrap();

      let mut analyzer = CodeAnalyzer::with_seed(settings(), 7).unwrap();
      let candidates = analyzer.find_candidates(&repo(dir.path()), 10);
      assert!(candidates.is_empty());
   }

   #[test]
   fn test_line_bounds_filter() {
      let dir = tempfile::tempdir().unwrap();
      fs::write(dir.path().join("small.py"), "def two_liner(a):\n    return a\n").unwrap();

      let mut analyzer = CodeAnalyzer::with_seed(settings(), 7).unwrap();
      let candidates = analyzer.find_candidates(&repo(dir.path()), 10);
      assert!(candidates.is_empty());
   }

   #[test]
   fn test_underscore_survival_is_probabilistic() {
      let dir = tempfile::tempdir().unwrap();
      let mut source = String::new();
      for i in 0..40 {
         source.push_str(&format!(
            "def _helper_{i}(a, b):\n    if a:\n        return b\n    if b:\n        return a\n    return None\n\n"
         ));
      }
      fs::write(dir.path().join("helpers.py"), source).unwrap();

      let mut analyzer = CodeAnalyzer::with_seed(settings(), 42).unwrap();
      let repo_entry = repo(dir.path());
      let files: Vec<ScannedFile> =
         analyzer.scanner().scan_repo(&repo_entry.path, &repo_entry.name).collect();
      let mut survivors = 0;
      for file in &files {
         survivors += analyzer.analyze_file(file, &repo_entry.path).len();
      }

      // 30% survival: all 40 surviving or all skipped would mean the rule is
      // not being applied
      assert!(survivors > 0);
      assert!(survivors < 40);
   }
}
