use std::sync::LazyLock;

use regex::Regex;

use crate::{parser::ParsedFunction, types::Language};

/// Complexity metrics for a function or method
#[derive(Debug, Clone, Default)]
pub struct ComplexityMetrics {
   pub name:                  String,
   pub cyclomatic_complexity: u32,
   pub nloc:                  u32,
   pub parameter_count:       u32,
   pub start_line:            usize,
   pub end_line:              usize,
   pub max_nesting_depth:     u32,
}

impl ComplexityMetrics {
   /// Total lines including whitespace and comments
   pub const fn line_count(&self) -> usize {
      self.end_line - self.start_line + 1
   }

   /// Whether the function exceeds the usual attention thresholds
   pub const fn is_complex(&self) -> bool {
      self.cyclomatic_complexity > 10 || self.nloc > 50
   }

   pub const fn complexity_rating(&self) -> &'static str {
      match self.cyclomatic_complexity {
         0..=5 => "simple",
         6..=10 => "moderate",
         11..=20 => "complex",
         _ => "very_complex",
      }
   }
}

static PY_BRANCH: LazyLock<Regex> =
   LazyLock::new(|| Regex::new(r"\b(if|elif|for|while|except|case|assert)\b").unwrap());
static PY_BOOL_OP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(and|or)\b").unwrap());
static BRACE_BRANCH: LazyLock<Regex> =
   LazyLock::new(|| Regex::new(r"\b(if|for|while|case|catch|select)\b").unwrap());
static RS_BRANCH: LazyLock<Regex> =
   LazyLock::new(|| Regex::new(r"\b(if|for|while|match|loop)\b").unwrap());

/// Derives structural metrics from extracted function source. Counting is
/// textual: branch keywords plus boolean operators approximate the decision
/// count, indentation or brace depth approximates nesting.
pub struct ComplexityAnalyzer;

impl ComplexityAnalyzer {
   pub fn analyze_function(func: &ParsedFunction, language: Language) -> ComplexityMetrics {
      ComplexityMetrics {
         name:                  func.name.clone(),
         cyclomatic_complexity: Self::cyclomatic(&func.source, language),
         nloc:                  Self::nloc(&func.source, language),
         parameter_count:       func.parameters.len() as u32,
         start_line:            func.start_line,
         end_line:              func.end_line,
         max_nesting_depth:     Self::nesting_depth(&func.source, language),
      }
   }

   /// 1 + decision points
   fn cyclomatic(source: &str, language: Language) -> u32 {
      let mut count: u32 = 1;

      for line in source.lines() {
         let code = Self::strip_comment(line, language);
         count += match language {
            Language::Python => {
               PY_BRANCH.find_iter(code).count() as u32 + PY_BOOL_OP.find_iter(code).count() as u32
            },
            Language::Rust => {
               RS_BRANCH.find_iter(code).count() as u32
                  + code.matches("&&").count() as u32
                  + code.matches("||").count() as u32
            },
            _ => {
               BRACE_BRANCH.find_iter(code).count() as u32
                  + code.matches("&&").count() as u32
                  + code.matches("||").count() as u32
            },
         };
      }

      count
   }

   /// Non-blank, non-comment-only lines
   fn nloc(source: &str, language: Language) -> u32 {
      source
         .lines()
         .filter(|line| {
            let trimmed = line.trim();
            if trimmed.is_empty() {
               return false;
            }
            match language {
               Language::Python => !trimmed.starts_with('#'),
               _ => !trimmed.starts_with("//"),
            }
         })
         .count() as u32
   }

   fn nesting_depth(source: &str, language: Language) -> u32 {
      match language {
         Language::Python => {
            let base = source
               .lines()
               .next()
               .map_or(0, Self::indent_width);
            let max = source
               .lines()
               .skip(1)
               .filter(|l| !l.trim().is_empty())
               .map(Self::indent_width)
               .max()
               .unwrap_or(base);
            // Body sits one level in; levels beyond that are nesting
            ((max.saturating_sub(base) / 4).saturating_sub(1)) as u32
         },
         _ => {
            let mut depth: i32 = 0;
            let mut max: i32 = 0;
            for line in source.lines() {
               let code = Self::strip_comment(line, language);
               for ch in code.chars() {
                  match ch {
                     '{' => {
                        depth += 1;
                        max = max.max(depth);
                     },
                     '}' => depth -= 1,
                     _ => {},
                  }
               }
            }
            // The function body brace itself is not a nesting level
            max.saturating_sub(1).max(0) as u32
         },
      }
   }

   fn strip_comment(line: &str, language: Language) -> &str {
      let marker = match language {
         Language::Python => "#",
         _ => "//",
      };
      line.split(marker).next().unwrap_or(line)
   }

   fn indent_width(line: &str) -> usize {
      let mut width = 0;
      for ch in line.chars() {
         match ch {
            ' ' => width += 1,
            '\t' => width += 4,
            _ => break,
         }
      }
      width
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   fn func(source: &str) -> ParsedFunction {
      let line_count = source.lines().count();
      ParsedFunction {
         name:       "sample".to_string(),
         start_line: 1,
         end_line:   line_count,
         source:     source.to_string(),
         class_name: None,
         decorators: Vec::new(),
         parameters: vec!["a".to_string(), "b".to_string()],
         is_async:   false,
         docstring:  None,
      }
   }

   #[test]
   fn test_straight_line_python_is_simple() {
      let metrics = ComplexityAnalyzer::analyze_function(
         &func("def sample(a, b):\n    return a + b\n"),
         Language::Python,
      );
      assert_eq!(metrics.cyclomatic_complexity, 1);
      assert_eq!(metrics.parameter_count, 2);
      assert_eq!(metrics.complexity_rating(), "simple");
   }

   #[test]
   fn test_python_branches_counted() {
      let source = "def sample(a, b):
    if a and b:
        return a
    for item in b:
        if item:
            return item
    return None
";
      let metrics = ComplexityAnalyzer::analyze_function(&func(source), Language::Python);
      // if + and + for + if = 4 decisions
      assert_eq!(metrics.cyclomatic_complexity, 5);
      assert_eq!(metrics.max_nesting_depth, 2);
   }

   #[test]
   fn test_nloc_ignores_blank_and_comment_lines() {
      let source = "def sample():
    # setup
    x = 1

    return x
";
      let metrics = ComplexityAnalyzer::analyze_function(&func(source), Language::Python);
      assert_eq!(metrics.nloc, 3);
   }

   #[test]
   fn test_rust_branch_and_operator_counting() {
      let source = "fn sample(a: bool, b: bool) -> u32 {
   if a && b {
      return 1;
   }
   for i in 0..10 {
      if i > 5 || a {
         return i;
      }
   }
   0
}
";
      let metrics = ComplexityAnalyzer::analyze_function(&func(source), Language::Rust);
      // if + && + for + if + || = 5 decisions
      assert_eq!(metrics.cyclomatic_complexity, 6);
      assert_eq!(metrics.max_nesting_depth, 2);
   }

   #[test]
   fn test_comment_braces_not_counted() {
      let source = "fn sample() {
   // a stray { in a comment
   let x = 1;
   x;
}
";
      let metrics = ComplexityAnalyzer::analyze_function(&func(source), Language::Rust);
      assert_eq!(metrics.max_nesting_depth, 0);
   }
}
