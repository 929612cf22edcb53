use std::{collections::HashSet, path::Path, process::Command};

use chrono::{DateTime, Utc};

use crate::complexity::ComplexityMetrics;

/// Git-derived statistics for a file
#[derive(Debug, Clone, Default)]
pub struct GitStats {
   pub commit_count_30d: u32,
   pub commit_count_90d: u32,
   pub last_modified:    Option<DateTime<Utc>>,
   pub unique_authors:   u32,
   pub is_new:           bool,
}

impl GitStats {
   /// Days since last modification; 999 when history is unknown
   pub fn days_since_modified(&self) -> i64 {
      self.last_modified.map_or(999, |at| Utc::now().signed_duration_since(at).num_days())
   }

   /// Frequently modified hotspot
   pub const fn is_hot(&self) -> bool {
      self.commit_count_30d >= 3
   }

   pub fn is_recent(&self) -> bool {
      self.days_since_modified() <= 30
   }
}

/// Collect per-file churn/recency/author stats from `git log`. Any failure
/// (not a repo, file untracked, git missing) degrades to the zero stats.
pub fn collect_git_stats(repo_root: &Path, file_path: &Path) -> GitStats {
   let rel_path = file_path.strip_prefix(repo_root).unwrap_or(file_path);

   let Ok(output) = Command::new("git")
      .args(["log", "-100", "--format=%ct|%ae", "--"])
      .arg(rel_path)
      .current_dir(repo_root)
      .output()
   else {
      return GitStats::default();
   };
   if !output.status.success() {
      return GitStats::default();
   }

   let now = Utc::now();
   let mut stats = GitStats::default();
   let mut authors: HashSet<String> = HashSet::new();

   for line in String::from_utf8_lossy(&output.stdout).lines() {
      let Some((epoch, author)) = line.split_once('|') else {
         continue;
      };
      let Ok(epoch) = epoch.trim().parse::<i64>() else {
         continue;
      };
      let Some(commit_date) = DateTime::from_timestamp(epoch, 0) else {
         continue;
      };

      if stats.last_modified.is_none() {
         stats.last_modified = Some(commit_date);
      }
      let age_days = now.signed_duration_since(commit_date).num_days();
      if age_days <= 30 {
         stats.commit_count_30d += 1;
      }
      if age_days <= 90 {
         stats.commit_count_90d += 1;
      }
      authors.insert(author.trim().to_string());
   }

   stats.unique_authors = authors.len() as u32;
   stats.is_new = stats.commit_count_90d <= 2
      && stats.last_modified.is_some_and(|at| now.signed_duration_since(at).num_days() <= 14);
   stats
}

/// Computed interest score with per-factor breakdown. Factor fields hold the
/// already-weighted contribution to the total.
#[derive(Debug, Clone, Default)]
pub struct InterestScore {
   pub total:            f64,
   pub complexity_score: f64,
   pub length_score:     f64,
   pub nesting_score:    f64,
   pub parameter_score:  f64,
   pub churn_score:      f64,
   pub novelty_score:    f64,
   pub pattern_bonus:    f64,
}

impl InterestScore {
   pub fn rating(&self) -> &'static str {
      if self.total >= 70.0 {
         "highly_interesting"
      } else if self.total >= 50.0 {
         "interesting"
      } else if self.total >= 30.0 {
         "moderate"
      } else {
         "low"
      }
   }
}

/// Scores snippets on how interesting they are to document. Each factor is
/// normalized against a cap, weighted, and summed; textual pattern markers
/// add an uncapped bonus before the final clamp to 100.
pub struct InterestScorer;

impl InterestScorer {
   const WEIGHT_COMPLEXITY: f64 = 0.35;
   const WEIGHT_LENGTH: f64 = 0.15;
   const WEIGHT_NESTING: f64 = 0.15;
   const WEIGHT_PARAMETERS: f64 = 0.10;
   const WEIGHT_CHURN: f64 = 0.15;
   const WEIGHT_NOVELTY: f64 = 0.10;

   const COMPLEXITY_CAP: f64 = 20.0;
   const LENGTH_CAP: f64 = 100.0;
   const NESTING_CAP: f64 = 5.0;
   const PARAM_CAP: f64 = 7.0;
   const CHURN_CAP: f64 = 5.0;
   const NOVELTY_DAYS: f64 = 30.0;

   const BONUS_DECORATOR: f64 = 5.0;
   const BONUS_ASYNC: f64 = 5.0;
   const BONUS_CONTEXT_MANAGER: f64 = 10.0;
   const BONUS_GENERATOR: f64 = 8.0;
   const BONUS_CLASS_METHOD: f64 = 3.0;
   const BONUS_PROPERTY: f64 = 3.0;
   const BONUS_ABSTRACT: f64 = 8.0;
   const BONUS_DATACLASS: f64 = 7.0;

   pub fn score(
      metrics: &ComplexityMetrics,
      git_stats: &GitStats,
      decorators: &[String],
      is_async: bool,
      source: &str,
   ) -> InterestScore {
      let complexity_score =
         (f64::from(metrics.cyclomatic_complexity) / Self::COMPLEXITY_CAP).min(1.0) * 100.0;
      let length_score = (f64::from(metrics.nloc) / Self::LENGTH_CAP).min(1.0) * 100.0;
      let nesting_score =
         (f64::from(metrics.max_nesting_depth) / Self::NESTING_CAP).min(1.0) * 100.0;
      let param_score = (f64::from(metrics.parameter_count) / Self::PARAM_CAP).min(1.0) * 100.0;
      let churn_score = (f64::from(git_stats.commit_count_30d) / Self::CHURN_CAP).min(1.0) * 100.0;

      let days_old = git_stats.days_since_modified() as f64;
      let novelty_score = ((Self::NOVELTY_DAYS - days_old) / Self::NOVELTY_DAYS).max(0.0) * 100.0;

      let pattern_bonus = Self::pattern_bonus(decorators, is_async, source);

      let weighted_total = complexity_score * Self::WEIGHT_COMPLEXITY
         + length_score * Self::WEIGHT_LENGTH
         + nesting_score * Self::WEIGHT_NESTING
         + param_score * Self::WEIGHT_PARAMETERS
         + churn_score * Self::WEIGHT_CHURN
         + novelty_score * Self::WEIGHT_NOVELTY
         + pattern_bonus;

      InterestScore {
         total: weighted_total.min(100.0),
         complexity_score: complexity_score * Self::WEIGHT_COMPLEXITY,
         length_score: length_score * Self::WEIGHT_LENGTH,
         nesting_score: nesting_score * Self::WEIGHT_NESTING,
         parameter_score: param_score * Self::WEIGHT_PARAMETERS,
         churn_score: churn_score * Self::WEIGHT_CHURN,
         novelty_score: novelty_score * Self::WEIGHT_NOVELTY,
         pattern_bonus,
      }
   }

   fn pattern_bonus(decorators: &[String], is_async: bool, source: &str) -> f64 {
      let mut bonus = 0.0;

      if is_async {
         bonus += Self::BONUS_ASYNC;
      }

      if !decorators.is_empty() {
         bonus += decorators.len() as f64 * Self::BONUS_DECORATOR;

         let decorator_text = decorators.join(" ").to_lowercase();
         if decorator_text.contains("property") {
            bonus += Self::BONUS_PROPERTY;
         }
         if decorator_text.contains("classmethod") || decorator_text.contains("staticmethod") {
            bonus += Self::BONUS_CLASS_METHOD;
         }
         if decorator_text.contains("abstractmethod") {
            bonus += Self::BONUS_ABSTRACT;
         }
         if decorator_text.contains("dataclass") {
            bonus += Self::BONUS_DATACLASS;
         }
      }

      if source.contains("yield") {
         bonus += Self::BONUS_GENERATOR;
      }
      if source.contains("__enter__") || source.contains("__exit__") {
         bonus += Self::BONUS_CONTEXT_MANAGER;
      }

      bonus
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   fn metrics(cyclomatic: u32, nloc: u32, nesting: u32, params: u32) -> ComplexityMetrics {
      ComplexityMetrics {
         name: "sample".to_string(),
         cyclomatic_complexity: cyclomatic,
         nloc,
         parameter_count: params,
         start_line: 1,
         end_line: nloc as usize,
         max_nesting_depth: nesting,
      }
   }

   fn recent_stats(commits_30d: u32, days_old: i64) -> GitStats {
      GitStats {
         commit_count_30d: commits_30d,
         commit_count_90d: commits_30d,
         last_modified: Some(Utc::now() - chrono::Duration::days(days_old)),
         unique_authors: 1,
         is_new: false,
      }
   }

   #[test]
   fn test_total_bounded_even_at_extremes() {
      let score = InterestScorer::score(
         &metrics(200, 5000, 40, 30),
         &recent_stats(50, 0),
         &["@a".into(), "@b".into(), "@c".into(), "@dataclass".into()],
         true,
         "yield __enter__ __exit__",
      );
      assert!(score.total <= 100.0);
      assert!(score.total >= 99.0);
   }

   #[test]
   fn test_zero_inputs_score_zero() {
      let score = InterestScorer::score(&metrics(0, 0, 0, 0), &GitStats::default(), &[], false, "");
      assert_eq!(score.pattern_bonus, 0.0);
      assert_eq!(score.total, 0.0);
      assert_eq!(score.rating(), "low");
   }

   #[test]
   fn test_monotone_in_complexity() {
      let stats = GitStats::default();
      let low = InterestScorer::score(&metrics(2, 20, 1, 2), &stats, &[], false, "");
      let high = InterestScorer::score(&metrics(12, 20, 1, 2), &stats, &[], false, "");
      assert!(high.total > low.total);
   }

   #[test]
   fn test_monotone_decreasing_in_age() {
      let m = metrics(5, 20, 1, 2);
      let fresh = InterestScorer::score(&m, &recent_stats(0, 1), &[], false, "");
      let stale = InterestScorer::score(&m, &recent_stats(0, 29), &[], false, "");
      let ancient = InterestScorer::score(&m, &recent_stats(0, 400), &[], false, "");
      assert!(fresh.total > stale.total);
      assert!(stale.total > ancient.total);
   }

   #[test]
   fn test_caps_saturate() {
      let stats = GitStats::default();
      let at_cap = InterestScorer::score(&metrics(20, 20, 1, 2), &stats, &[], false, "");
      let over_cap = InterestScorer::score(&metrics(40, 20, 1, 2), &stats, &[], false, "");
      assert_eq!(at_cap.total, over_cap.total);
   }

   #[test]
   fn test_pattern_bonus_breakdown() {
      let score = InterestScorer::score(
         &metrics(1, 10, 0, 1),
         &GitStats::default(),
         &["@property".to_string()],
         true,
         "def gen():\n    yield 1\n",
      );
      // decorator 5 + property 3 + async 5 + generator 8
      assert_eq!(score.pattern_bonus, 21.0);
   }

   #[test]
   fn test_git_stats_defaults_when_not_a_repo() {
      let dir = tempfile::tempdir().unwrap();
      let stats = collect_git_stats(dir.path(), &dir.path().join("missing.py"));
      assert_eq!(stats.commit_count_30d, 0);
      assert_eq!(stats.days_since_modified(), 999);
      assert!(!stats.is_hot());
      assert!(!stats.is_recent());
   }
}
