use std::{
   io::Read,
   path::{Path, PathBuf},
};

use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use indexmap::IndexMap;

use crate::{
   config::AnalyzerSettings,
   error::{Result, WormError},
   types::Language,
};

/// A file discovered during repository scanning
#[derive(Debug, Clone)]
pub struct ScannedFile {
   pub path:          PathBuf,
   pub language:      Language,
   pub repo_name:     String,
   pub relative_path: PathBuf,
   pub size_bytes:    u64,
}

/// Aggregate statistics about a scanned repository
#[derive(Debug, Clone)]
pub struct RepoStats {
   pub name:              String,
   pub path:              PathBuf,
   pub total_files:       u64,
   pub files_by_language: IndexMap<Language, u64>,
   pub total_size_bytes:  u64,
   pub is_git_repo:       bool,
}

/// Walks a repository and emits source files that pass the include/exclude
/// globs, the repo's gitignore, and the size/binary gates.
pub struct RepoScanner {
   include: GlobSet,
   exclude: GlobSet,
}

impl RepoScanner {
   const MAX_FILE_SIZE: u64 = 1024 * 1024;
   const BINARY_CHECK_BYTES: usize = 8192;

   /// Extra ignore patterns applied on top of the repo's own gitignore
   const BUILTIN_IGNORES: &'static [&'static str] = &[
      "**/.git/**",
      "**/__pycache__/**",
      "**/*.pyc",
      "**/node_modules/**",
      "**/.venv/**",
      "**/venv/**",
      "**/.env",
      "**/*.egg-info/**",
   ];

   pub fn new(include_patterns: &[String], exclude_patterns: &[String]) -> Result<Self> {
      let include = Self::build_glob_set(include_patterns)?;

      let mut exclude_all: Vec<String> = exclude_patterns.to_vec();
      exclude_all.extend(Self::BUILTIN_IGNORES.iter().map(|s| (*s).to_string()));
      let exclude = Self::build_glob_set(&exclude_all)?;

      Ok(Self { include, exclude })
   }

   pub fn from_settings(settings: &AnalyzerSettings) -> Result<Self> {
      Self::new(&settings.include_patterns, &settings.exclude_patterns)
   }

   fn build_glob_set(patterns: &[String]) -> Result<GlobSet> {
      let mut builder = GlobSetBuilder::new();
      for pattern in patterns {
         let glob = Glob::new(pattern)
            .map_err(|e| WormError::ConfigError(format!("Bad glob '{pattern}': {e}")))?;
         builder.add(glob);
      }
      builder
         .build()
         .map_err(|e| WormError::ConfigError(format!("Failed to build glob set: {e}")))
   }

   /// Lazily walk `repo_path`, yielding eligible source files. Unreadable
   /// entries are skipped, never raised.
   pub fn scan_repo<'a>(
      &'a self,
      repo_path: &'a Path,
      repo_name: &'a str,
   ) -> impl Iterator<Item = ScannedFile> + 'a {
      let walker = WalkBuilder::new(repo_path)
         .hidden(true)
         .git_ignore(true)
         .require_git(false)
         .build();

      walker.filter_map(move |entry| {
         let entry = entry.ok()?;
         let path = entry.path();
         if !entry.file_type()?.is_file() {
            return None;
         }

         let relative_path = path.strip_prefix(repo_path).ok()?.to_path_buf();
         if !self.include.is_match(&relative_path) {
            return None;
         }
         if self.exclude.is_match(&relative_path) {
            return None;
         }

         let language = Language::from_path(path)?;

         let size_bytes = entry.metadata().ok()?.len();
         if size_bytes == 0 || size_bytes > Self::MAX_FILE_SIZE {
            return None;
         }
         if Self::is_binary(path) {
            return None;
         }

         Some(ScannedFile {
            path: path.to_path_buf(),
            language,
            repo_name: repo_name.to_string(),
            relative_path,
            size_bytes,
         })
      })
   }

   /// Binary heuristic: any NUL byte, or less than 70% printable ASCII plus
   /// whitespace, within the first 8 KiB. Unreadable files count as binary.
   fn is_binary(path: &Path) -> bool {
      let Ok(mut file) = std::fs::File::open(path) else {
         return true;
      };
      let mut chunk = vec![0_u8; Self::BINARY_CHECK_BYTES];
      let Ok(read) = file.read(&mut chunk) else {
         return true;
      };
      if read == 0 {
         return false;
      }
      let chunk = &chunk[..read];
      if chunk.contains(&0) {
         return true;
      }
      let text_chars = chunk
         .iter()
         .filter(|b| (32..=126).contains(*b) || matches!(b, 9 | 10 | 13))
         .count();
      (text_chars as f64) / (read as f64) < 0.7
   }

   /// Aggregate repository statistics for the `analyze` command
   pub fn repo_stats(&self, repo_path: &Path, repo_name: &str) -> RepoStats {
      let mut stats = RepoStats {
         name:              repo_name.to_string(),
         path:              repo_path.to_path_buf(),
         total_files:       0,
         files_by_language: IndexMap::new(),
         total_size_bytes:  0,
         is_git_repo:       repo_path.join(".git").exists(),
      };

      for file in self.scan_repo(repo_path, repo_name) {
         stats.total_files += 1;
         stats.total_size_bytes += file.size_bytes;
         *stats.files_by_language.entry(file.language).or_insert(0) += 1;
      }

      stats
   }
}

#[cfg(test)]
mod tests {
   use std::fs;

   use super::*;

   fn scanner() -> RepoScanner {
      RepoScanner::from_settings(&AnalyzerSettings::default()).unwrap()
   }

   fn write(root: &Path, rel: &str, contents: &[u8]) {
      let path = root.join(rel);
      fs::create_dir_all(path.parent().unwrap()).unwrap();
      fs::write(path, contents).unwrap();
   }

   #[test]
   fn test_scan_includes_known_languages_only() {
      let dir = tempfile::tempdir().unwrap();
      write(dir.path(), "app.py", b"def main():\n    pass\n");
      write(dir.path(), "lib.rs", b"fn main() {}\n");
      write(dir.path(), "notes.md", b"# notes\n");

      let found: Vec<_> = scanner().scan_repo(dir.path(), "demo").collect();
      let mut names: Vec<_> = found
         .iter()
         .map(|f| f.relative_path.to_string_lossy().into_owned())
         .collect();
      names.sort();
      assert_eq!(names, vec!["app.py", "lib.rs"]);
      assert!(found.iter().all(|f| f.repo_name == "demo"));
   }

   #[test]
   fn test_scan_applies_exclude_globs() {
      let dir = tempfile::tempdir().unwrap();
      write(dir.path(), "src/core.py", b"def core():\n    pass\n");
      write(dir.path(), "src/test_core.py", b"def test_core():\n    pass\n");
      write(dir.path(), "tests/helpers.py", b"def helper():\n    pass\n");
      write(dir.path(), "node_modules/pkg/index.js", b"module.exports = 1;\n");

      let names: Vec<_> = scanner()
         .scan_repo(dir.path(), "demo")
         .map(|f| f.relative_path.to_string_lossy().into_owned())
         .collect();
      assert_eq!(names, vec!["src/core.py"]);
   }

   #[test]
   fn test_scan_respects_gitignore() {
      let dir = tempfile::tempdir().unwrap();
      write(dir.path(), ".gitignore", b"generated/\n");
      write(dir.path(), "generated/out.py", b"def out():\n    pass\n");
      write(dir.path(), "kept.py", b"def kept():\n    pass\n");

      let names: Vec<_> = scanner()
         .scan_repo(dir.path(), "demo")
         .map(|f| f.relative_path.to_string_lossy().into_owned())
         .collect();
      assert_eq!(names, vec!["kept.py"]);
   }

   #[test]
   fn test_scan_skips_empty_and_binary_files() {
      let dir = tempfile::tempdir().unwrap();
      write(dir.path(), "empty.py", b"");
      write(dir.path(), "blob.py", b"\x00\x01\x02binary\x00");
      write(dir.path(), "ok.py", b"def ok():\n    pass\n");

      let names: Vec<_> = scanner()
         .scan_repo(dir.path(), "demo")
         .map(|f| f.relative_path.to_string_lossy().into_owned())
         .collect();
      assert_eq!(names, vec!["ok.py"]);
   }

   #[test]
   fn test_repo_stats_aggregates_by_language() {
      let dir = tempfile::tempdir().unwrap();
      write(dir.path(), "a.py", b"def a():\n    pass\n");
      write(dir.path(), "b.py", b"def b():\n    pass\n");
      write(dir.path(), "c.go", b"func c() {}\n");

      let stats = scanner().repo_stats(dir.path(), "demo");
      assert_eq!(stats.total_files, 3);
      assert_eq!(stats.files_by_language.get(&Language::Python), Some(&2));
      assert_eq!(stats.files_by_language.get(&Language::Go), Some(&1));
      assert!(!stats.is_git_repo);
   }
}
