use std::sync::LazyLock;

use regex::Regex;

use crate::types::Language;

/// A function or method extracted from source code
#[derive(Debug, Clone)]
pub struct ParsedFunction {
   pub name:       String,
   pub start_line: usize,
   pub end_line:   usize,
   pub source:     String,
   pub class_name: Option<String>,
   pub decorators: Vec<String>,
   pub parameters: Vec<String>,
   pub is_async:   bool,
   pub docstring:  Option<String>,
}

/// A class extracted from source code (Python only)
#[derive(Debug, Clone)]
pub struct ParsedClass {
   pub name:       String,
   pub start_line: usize,
   pub end_line:   usize,
   pub source:     String,
   pub methods:    Vec<ParsedFunction>,
   pub decorators: Vec<String>,
   pub docstring:  Option<String>,
}

static PY_DEF: LazyLock<Regex> =
   LazyLock::new(|| Regex::new(r"^(\s*)(async\s+)?def\s+([A-Za-z_]\w*)\s*\(").unwrap());
static PY_CLASS: LazyLock<Regex> =
   LazyLock::new(|| Regex::new(r"^(\s*)class\s+([A-Za-z_]\w*)").unwrap());
static PY_DECORATOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*@(\S.*)$").unwrap());

static JS_FUNC: LazyLock<Regex> = LazyLock::new(|| {
   Regex::new(r"^\s*(?:export\s+)?(?:default\s+)?(async\s+)?function\s*\*?\s*([A-Za-z_$]\w*)\s*\(")
      .unwrap()
});
static JS_ARROW: LazyLock<Regex> = LazyLock::new(|| {
   Regex::new(r"^\s*(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$]\w*)\s*=\s*(async\s+)?(?:\(|[A-Za-z_$]\w*\s*=>)")
      .unwrap()
});
static JS_METHOD: LazyLock<Regex> = LazyLock::new(|| {
   Regex::new(r"^\s*(?:public\s+|private\s+|protected\s+)?(?:static\s+)?(async\s+)?([A-Za-z_$]\w*)\s*\([^;{}]*\)\s*(?::[^{;]+)?\{")
      .unwrap()
});
static JS_CLASS: LazyLock<Regex> = LazyLock::new(|| {
   Regex::new(r"^\s*(?:export\s+)?(?:default\s+)?(?:abstract\s+)?class\s+([A-Za-z_$]\w*)").unwrap()
});

static GO_FUNC: LazyLock<Regex> = LazyLock::new(|| {
   Regex::new(r"^func\s+(?:\(\s*\w+\s+\*?([A-Za-z_]\w*)\s*\)\s+)?([A-Za-z_]\w*)\s*\(").unwrap()
});

static RS_FN: LazyLock<Regex> = LazyLock::new(|| {
   Regex::new(r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:const\s+)?(?:unsafe\s+)?(async\s+)?fn\s+([A-Za-z_]\w*)")
      .unwrap()
});
static RS_IMPL: LazyLock<Regex> = LazyLock::new(|| {
   Regex::new(r"^\s*impl(?:\s*<[^>]*>)?\s+(?:[\w:]+(?:<[^>]*>)?\s+for\s+)?([A-Za-z_]\w*)").unwrap()
});

/// Names that look like functions in brace languages but are control flow
const BRACE_KEYWORDS: &[&str] = &[
   "if", "else", "for", "while", "switch", "catch", "return", "match", "loop", "constructor",
];

/// Extracts functions and classes from one source file using line-level
/// heuristics. Good enough for candidate selection; not a real parser.
pub struct CodeExtractor<'a> {
   source:   &'a str,
   lines:    Vec<&'a str>,
   language: Language,
}

impl<'a> CodeExtractor<'a> {
   pub fn new(source: &'a str, language: Language) -> Self {
      Self { source, lines: source.lines().collect(), language }
   }

   pub fn extract_functions(&self) -> Vec<ParsedFunction> {
      match self.language {
         Language::Python => self.extract_python_functions(),
         Language::Typescript | Language::Tsx | Language::Javascript => self.extract_js_functions(),
         Language::Go => self.extract_go_functions(),
         Language::Rust => self.extract_rust_functions(),
      }
   }

   /// Class extraction is Python-only; other languages return nothing
   pub fn extract_classes(&self) -> Vec<ParsedClass> {
      match self.language {
         Language::Python => self.extract_python_classes(),
         _ => Vec::new(),
      }
   }

   // === Python ===

   fn extract_python_functions(&self) -> Vec<ParsedFunction> {
      let mut functions = Vec::new();
      let mut class_stack: Vec<(usize, String)> = Vec::new();
      let mut decorators: Vec<String> = Vec::new();
      let mut i = 0;

      while i < self.lines.len() {
         let line = self.lines[i];

         if !line.trim().is_empty() {
            let indent = indent_width(line);
            while let Some((class_indent, _)) = class_stack.last() {
               if indent <= *class_indent && !PY_CLASS.is_match(line) {
                  class_stack.pop();
               } else {
                  break;
               }
            }
         }

         if let Some(caps) = PY_DECORATOR.captures(line) {
            decorators.push(format!("@{}", caps[1].trim()));
            i += 1;
            continue;
         }

         if let Some(caps) = PY_CLASS.captures(line) {
            class_stack.push((indent_width(line), caps[2].to_string()));
            decorators.clear();
            i += 1;
            continue;
         }

         if let Some(caps) = PY_DEF.captures(line) {
            let indent = caps[1].len();
            let name = caps[3].to_string();
            let end = python_block_end(&self.lines, i, indent);
            let parameters = extract_params(&self.lines, i, line.find('(').unwrap_or(0));
            let class_name = class_stack
               .iter()
               .rev()
               .find(|(class_indent, _)| *class_indent < indent)
               .map(|(_, n)| n.clone());

            functions.push(ParsedFunction {
               name,
               start_line: i + 1,
               end_line: end + 1,
               source: self.lines[i..=end].join("\n"),
               class_name,
               decorators: std::mem::take(&mut decorators),
               parameters,
               is_async: caps.get(2).is_some(),
               docstring: python_docstring(&self.lines, i + 1, end),
            });

            i = end + 1;
            continue;
         }

         decorators.clear();
         i += 1;
      }

      functions
   }

   fn extract_python_classes(&self) -> Vec<ParsedClass> {
      let all_methods = self.extract_python_functions();
      let mut classes = Vec::new();
      let mut decorators: Vec<String> = Vec::new();

      for (i, line) in self.lines.iter().enumerate() {
         if let Some(caps) = PY_DECORATOR.captures(line) {
            decorators.push(format!("@{}", caps[1].trim()));
            continue;
         }

         if let Some(caps) = PY_CLASS.captures(line) {
            let indent = caps[1].len();
            let name = caps[2].to_string();
            let end = python_block_end(&self.lines, i, indent);
            let methods: Vec<ParsedFunction> = all_methods
               .iter()
               .filter(|m| m.class_name.as_deref() == Some(name.as_str()))
               .cloned()
               .collect();

            classes.push(ParsedClass {
               name,
               start_line: i + 1,
               end_line: end + 1,
               source: self.lines[i..=end].join("\n"),
               methods,
               decorators: std::mem::take(&mut decorators),
               docstring: python_docstring(&self.lines, i + 1, end),
            });
            continue;
         }

         if !line.trim().is_empty() {
            decorators.clear();
         }
      }

      classes
   }

   // === JavaScript / TypeScript ===

   fn extract_js_functions(&self) -> Vec<ParsedFunction> {
      let class_ranges = self.js_class_ranges();
      let mut functions = Vec::new();
      let mut i = 0;

      while i < self.lines.len() {
         let line = self.lines[i];

         if let Some(caps) = JS_FUNC.captures(line) {
            if let Some(func) = self.brace_function(i, &caps[2], caps.get(1).is_some(), None) {
               i = func.end_line;
               functions.push(func);
               continue;
            }
         } else if let Some(caps) = JS_ARROW.captures(line) {
            let name = caps[1].to_string();
            if let Some(func) = self.brace_function(i, &name, caps.get(2).is_some(), None) {
               i = func.end_line;
               functions.push(func);
               continue;
            }
         } else if let Some(class_name) = enclosing_class(&class_ranges, i)
            && let Some(caps) = JS_METHOD.captures(line)
         {
            let name = caps[2].to_string();
            if !BRACE_KEYWORDS.contains(&name.as_str())
               && let Some(func) =
                  self.brace_function(i, &name, caps.get(1).is_some(), Some(class_name))
            {
               i = func.end_line;
               functions.push(func);
               continue;
            }
         }

         i += 1;
      }

      functions
   }

   fn js_class_ranges(&self) -> Vec<(usize, usize, String)> {
      let mut ranges = Vec::new();
      for (i, line) in self.lines.iter().enumerate() {
         if let Some(caps) = JS_CLASS.captures(line)
            && let Some(end) = brace_block_end(&self.lines, i)
         {
            ranges.push((i, end, caps[1].to_string()));
         }
      }
      ranges
   }

   // === Go ===

   fn extract_go_functions(&self) -> Vec<ParsedFunction> {
      let mut functions = Vec::new();
      let mut i = 0;

      while i < self.lines.len() {
         if let Some(caps) = GO_FUNC.captures(self.lines[i]) {
            let receiver = caps.get(1).map(|m| m.as_str().to_string());
            let name = caps[2].to_string();
            if let Some(func) = self.brace_function(i, &name, false, receiver) {
               i = func.end_line;
               functions.push(func);
               continue;
            }
         }
         i += 1;
      }

      functions
   }

   // === Rust ===

   fn extract_rust_functions(&self) -> Vec<ParsedFunction> {
      let impl_ranges = self.rust_impl_ranges();
      let mut functions = Vec::new();
      let mut i = 0;

      while i < self.lines.len() {
         if let Some(caps) = RS_FN.captures(self.lines[i]) {
            let name = caps[2].to_string();
            let class_name = enclosing_class(&impl_ranges, i);
            if let Some(func) = self.brace_function(i, &name, caps.get(1).is_some(), class_name) {
               i = func.end_line;
               functions.push(func);
               continue;
            }
         }
         i += 1;
      }

      functions
   }

   fn rust_impl_ranges(&self) -> Vec<(usize, usize, String)> {
      let mut ranges = Vec::new();
      for (i, line) in self.lines.iter().enumerate() {
         if RS_FN.is_match(line) {
            continue;
         }
         if let Some(caps) = RS_IMPL.captures(line)
            && let Some(end) = brace_block_end(&self.lines, i)
         {
            ranges.push((i, end, caps[1].to_string()));
         }
      }
      ranges
   }

   /// Common brace-language extraction: header at `start`, body delimited by
   /// the first opening brace and its match. Single-line bodies (expression
   /// arrows, trait signatures) fall back to the header line itself.
   fn brace_function(
      &self,
      start: usize,
      name: &str,
      is_async: bool,
      class_name: Option<String>,
   ) -> Option<ParsedFunction> {
      let end = brace_block_end(&self.lines, start).unwrap_or(start);
      // Search after the name so a Go receiver's parens are not mistaken for
      // the parameter list
      let name_pos = self.lines[start].find(name).unwrap_or(0);
      let open = self.lines[start][name_pos..].find('(').map(|p| p + name_pos)?;
      let parameters = extract_params(&self.lines, start, open);

      Some(ParsedFunction {
         name: name.to_string(),
         start_line: start + 1,
         end_line: end + 1,
         source: self.lines[start..=end].join("\n"),
         class_name,
         decorators: Vec::new(),
         parameters,
         is_async,
         docstring: None,
      })
   }

   /// Full source, for file-level candidates
   pub const fn source(&self) -> &str {
      self.source
   }
}

/// Innermost recorded `(start, end, name)` range strictly containing `line`
fn enclosing_class(ranges: &[(usize, usize, String)], line: usize) -> Option<String> {
   ranges
      .iter()
      .rev()
      .find(|(start, end, _)| line > *start && line < *end)
      .map(|(_, _, name)| name.clone())
}

/// Leading whitespace width, tabs counted as four columns
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

/// Last line (0-based) of the indentation block opened at `start`
fn python_block_end(lines: &[&str], start: usize, indent: usize) -> usize {
   let mut end = start;
   for (i, line) in lines.iter().enumerate().skip(start + 1) {
      if line.trim().is_empty() {
         continue;
      }
      if indent_width(line) <= indent {
         break;
      }
      end = i;
   }
   end
}

/// Triple-quoted docstring opening the body between `body_start` and `end`
fn python_docstring(lines: &[&str], body_start: usize, end: usize) -> Option<String> {
   let first = (body_start..=end.min(lines.len().saturating_sub(1)))
      .find(|i| !lines[*i].trim().is_empty())?;
   let trimmed = lines[first].trim();
   let quote = if trimmed.starts_with("\"\"\"") {
      "\"\"\""
   } else if trimmed.starts_with("'''") {
      "'''"
   } else {
      return None;
   };

   let inner = &trimmed[3..];
   if let Some(close) = inner.find(quote) {
      return Some(inner[..close].trim().to_string());
   }

   let mut parts = vec![inner.trim().to_string()];
   for line in lines.iter().take(end + 1).skip(first + 1) {
      if let Some(close) = line.find(quote) {
         parts.push(line[..close].trim().to_string());
         break;
      }
      parts.push(line.trim().to_string());
   }
   Some(parts.join("\n").trim().to_string())
}

/// Line index (0-based) where the brace block opened at/after `start` closes
fn brace_block_end(lines: &[&str], start: usize) -> Option<usize> {
   let mut depth: i32 = 0;
   let mut seen_open = false;

   for (i, line) in lines.iter().enumerate().skip(start) {
      // Line comments routinely contain unbalanced braces
      let code = line.split("//").next().unwrap_or(line);
      for ch in code.chars() {
         match ch {
            '{' => {
               depth += 1;
               seen_open = true;
            },
            '}' => depth -= 1,
            _ => {},
         }
      }
      if seen_open && depth <= 0 {
         return Some(i);
      }
      // Header lines that never open a block (expression-bodied arrows)
      if !seen_open && i > start + 2 {
         return None;
      }
   }
   None
}

/// Parameters of the paren group opening at `lines[start][open]`, split on
/// top-level commas
fn extract_params(lines: &[&str], start: usize, open: usize) -> Vec<String> {
   let mut params = Vec::new();
   let mut current = String::new();
   let mut depth: i32 = 0;
   let mut bracket_depth: i32 = 0;

   'outer: for (i, line) in lines.iter().enumerate().skip(start) {
      let text: &str = if i == start { &line[open..] } else { line };
      for ch in text.chars() {
         match ch {
            '(' => {
               depth += 1;
               if depth > 1 {
                  current.push(ch);
               }
            },
            ')' => {
               depth -= 1;
               if depth == 0 {
                  break 'outer;
               }
               current.push(ch);
            },
            '[' | '{' | '<' => {
               bracket_depth += 1;
               current.push(ch);
            },
            ']' | '}' | '>' => {
               bracket_depth -= 1;
               current.push(ch);
            },
            ',' if depth == 1 && bracket_depth <= 0 => {
               params.push(current.trim().to_string());
               current.clear();
            },
            _ => current.push(ch),
         }
      }
      current.push(' ');
   }

   if !current.trim().is_empty() {
      params.push(current.trim().to_string());
   }
   params.retain(|p| !p.is_empty());
   params
}
