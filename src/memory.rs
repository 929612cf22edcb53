use std::{
   path::{Path, PathBuf},
   time::Duration,
};

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use rusqlite::{Connection, OptionalExtension, params};
use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;

use crate::{
   error::Result,
   types::{CodeSnippet, DocType, DocumentedSnippet},
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS documented_snippets (
    id TEXT PRIMARY KEY,
    source_repo TEXT NOT NULL,
    source_file TEXT NOT NULL,
    function_name TEXT,
    class_name TEXT,
    code_hash TEXT NOT NULL,
    documented_at TIMESTAMP NOT NULL,
    snippet_path TEXT NOT NULL,
    git_commit TEXT,
    doc_type TEXT NOT NULL DEFAULT 'function_doc'
);

CREATE INDEX IF NOT EXISTS idx_code_hash ON documented_snippets(code_hash);
CREATE INDEX IF NOT EXISTS idx_source ON documented_snippets(source_repo, source_file);
";

/// Created after migration so legacy stores gain `doc_type` first
const ENTITY_INDEX: &str = "
CREATE INDEX IF NOT EXISTS idx_entity
    ON documented_snippets(source_file, function_name, class_name, doc_type);
";

/// Statistics over the documented-snippet store
#[derive(Debug, Clone)]
pub struct MemoryStats {
   pub total_documented: u64,
   pub by_repo:          IndexMap<String, u64>,
   pub last_7_days:      u64,
}

/// The daemon's persistent memory: which `(entity, doc type)` pairs have
/// already been documented, and when.
///
/// Single-writer by convention. Connections are opened per operation with a
/// busy timeout so the read-only dashboard never evicts the daemon.
pub struct Memory {
   db_path: PathBuf,
}

impl Memory {
   const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

   /// Open (and if needed create + migrate) the store at `db_path`
   pub fn open(db_path: &Path) -> Result<Self> {
      if let Some(parent) = db_path.parent() {
         std::fs::create_dir_all(parent)?;
      }

      let memory = Self { db_path: db_path.to_path_buf() };
      let conn = memory.connect()?;
      conn.execute_batch(SCHEMA)?;
      Self::migrate(&conn)?;
      conn.execute_batch(ENTITY_INDEX)?;
      Ok(memory)
   }

   fn connect(&self) -> Result<Connection> {
      let conn = Connection::open(&self.db_path)?;
      conn.busy_timeout(Self::BUSY_TIMEOUT)?;
      Ok(conn)
   }

   /// One-shot forward migration: stores created before flavors existed lack
   /// the `doc_type` column. Presence of the column is the only version
   /// marker.
   fn migrate(conn: &Connection) -> Result<()> {
      let mut stmt = conn.prepare("PRAGMA table_info(documented_snippets)")?;
      let has_doc_type = stmt
         .query_map([], |row| row.get::<_, String>(1))?
         .filter_map(std::result::Result::ok)
         .any(|name| name == "doc_type");
      drop(stmt);

      if !has_doc_type {
         conn.execute_batch(
            "ALTER TABLE documented_snippets
                ADD COLUMN doc_type TEXT NOT NULL DEFAULT 'function_doc';",
         )?;
         info!("memory store migrated: added doc_type column");
      }
      Ok(())
   }

   /// SHA-256 hex digest of snippet source, the deduplication key
   pub fn hash_code(source: &str) -> String {
      let digest = Sha256::digest(source.as_bytes());
      format!("{digest:x}")
   }

   fn timestamp(when: DateTime<Utc>) -> String {
      // Fixed-width so lexicographic comparison in SQL is chronological
      when.to_rfc3339_opts(SecondsFormat::Micros, true)
   }

   /// Whether this exact source has been documented under any flavor
   pub fn is_documented(&self, snippet: &CodeSnippet) -> Result<bool> {
      let code_hash = Self::hash_code(&snippet.source);
      let conn = self.connect()?;
      let row: Option<i64> = conn
         .query_row(
            "SELECT 1 FROM documented_snippets WHERE code_hash = ?1 LIMIT 1",
            params![code_hash],
            |row| row.get(0),
         )
         .optional()?;
      Ok(row.is_some())
   }

   /// Newest record for the snippet's entity identity under `doc_type`
   pub fn get_existing_doc(
      &self,
      snippet: &CodeSnippet,
      doc_type: DocType,
   ) -> Result<Option<DocumentedSnippet>> {
      let conn = self.connect()?;
      let record = conn
         .query_row(
            "SELECT id, source_repo, source_file, function_name, class_name,
                    code_hash, documented_at, snippet_path, git_commit, doc_type
             FROM documented_snippets
             WHERE source_file = ?1 AND function_name IS ?2 AND class_name IS ?3
               AND doc_type = ?4
             ORDER BY documented_at DESC LIMIT 1",
            params![
               snippet.file_path.to_string_lossy().into_owned(),
               snippet.function_name,
               snippet.class_name,
               doc_type.as_str()
            ],
            Self::row_to_record,
         )
         .optional()?;
      Ok(record)
   }

   /// Decide whether a snippet is eligible for documentation right now.
   ///
   /// Returns false if either the exact `(code_hash, doc_type)` pair exists
   /// (the model already saw this text under this flavor) or the newest
   /// record for the entity identity is younger than the cooldown. A changed
   /// hash alone is not enough while the cooldown holds.
   pub fn should_document(
      &self,
      snippet: &CodeSnippet,
      doc_type: DocType,
      redocument_after_days: i64,
   ) -> Result<bool> {
      let code_hash = Self::hash_code(&snippet.source);
      let conn = self.connect()?;

      let exact: Option<i64> = conn
         .query_row(
            "SELECT 1 FROM documented_snippets
             WHERE code_hash = ?1 AND doc_type = ?2 LIMIT 1",
            params![code_hash, doc_type.as_str()],
            |row| row.get(0),
         )
         .optional()?;
      if exact.is_some() {
         return Ok(false);
      }

      let newest: Option<String> = conn
         .query_row(
            "SELECT documented_at FROM documented_snippets
             WHERE source_file = ?1 AND function_name IS ?2 AND class_name IS ?3
               AND doc_type = ?4
             ORDER BY documented_at DESC LIMIT 1",
            params![
               snippet.file_path.to_string_lossy().into_owned(),
               snippet.function_name,
               snippet.class_name,
               doc_type.as_str()
            ],
            |row| row.get(0),
         )
         .optional()?;

      if let Some(raw) = newest
         && let Ok(last) = DateTime::parse_from_rfc3339(&raw)
      {
         let age = Utc::now().signed_duration_since(last.with_timezone(&Utc));
         if age < chrono::Duration::days(redocument_after_days) {
            return Ok(false);
         }
      }

      Ok(true)
   }

   /// Insert a new record for a committed snippet. Called exactly once per
   /// successful cycle; no idempotence is provided.
   pub fn record_documentation(
      &self,
      snippet: &CodeSnippet,
      snippet_path: &str,
      git_commit: Option<&str>,
      doc_type: DocType,
   ) -> Result<DocumentedSnippet> {
      let record = DocumentedSnippet {
         id: Uuid::new_v4().to_string(),
         source_repo: snippet.repo.clone(),
         source_file: snippet.file_path.to_string_lossy().into_owned(),
         function_name: snippet.function_name.clone(),
         class_name: snippet.class_name.clone(),
         code_hash: Self::hash_code(&snippet.source),
         documented_at: Utc::now(),
         snippet_path: snippet_path.to_string(),
         git_commit: git_commit.map(str::to_string),
         doc_type,
      };

      let conn = self.connect()?;
      conn.execute(
         "INSERT INTO documented_snippets
          (id, source_repo, source_file, function_name, class_name,
           code_hash, documented_at, snippet_path, git_commit, doc_type)
          VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
         params![
            record.id,
            record.source_repo,
            record.source_file,
            record.function_name,
            record.class_name,
            record.code_hash,
            Self::timestamp(record.documented_at),
            record.snippet_path,
            record.git_commit,
            record.doc_type.as_str()
         ],
      )?;

      Ok(record)
   }

   /// Aggregate statistics for the CLI and the stats channel
   pub fn get_stats(&self) -> Result<MemoryStats> {
      let conn = self.connect()?;

      let total_documented: u64 = conn
         .query_row("SELECT COUNT(*) FROM documented_snippets", [], |row| row.get::<_, i64>(0))?
         as u64;

      let mut by_repo = IndexMap::new();
      let mut stmt = conn.prepare(
         "SELECT source_repo, COUNT(*) FROM documented_snippets
          GROUP BY source_repo ORDER BY COUNT(*) DESC",
      )?;
      let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
      for row in rows {
         let (repo, count) = row?;
         by_repo.insert(repo, count as u64);
      }
      drop(stmt);

      let cutoff = Self::timestamp(Utc::now() - chrono::Duration::days(7));
      let last_7_days: u64 = conn.query_row(
         "SELECT COUNT(*) FROM documented_snippets WHERE documented_at > ?1",
         params![cutoff],
         |row| row.get::<_, i64>(0),
      )? as u64;

      Ok(MemoryStats { total_documented, by_repo, last_7_days })
   }

   fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<DocumentedSnippet> {
      let raw_at: String = row.get(6)?;
      let documented_at = DateTime::parse_from_rfc3339(&raw_at)
         .map(|at| at.with_timezone(&Utc))
         .unwrap_or_default();
      let raw_type: String = row.get(9)?;

      Ok(DocumentedSnippet {
         id: row.get(0)?,
         source_repo: row.get(1)?,
         source_file: row.get(2)?,
         function_name: row.get(3)?,
         class_name: row.get(4)?,
         code_hash: row.get(5)?,
         documented_at,
         snippet_path: row.get(7)?,
         git_commit: row.get(8)?,
         doc_type: DocType::parse(&raw_type).unwrap_or(DocType::FunctionDoc),
      })
   }
}

#[cfg(test)]
mod tests {
   use std::path::PathBuf;

   use super::*;
   use crate::types::Language;

   fn snippet(source: &str) -> CodeSnippet {
      CodeSnippet {
         repo:            "demo".to_string(),
         file_path:       PathBuf::from("/tmp/demo/foo.py"),
         function_name:   Some("compute".to_string()),
         class_name:      None,
         language:        Language::Python,
         source:          source.to_string(),
         start_line:      1,
         end_line:        30,
         complexity:      8.0,
         nesting_depth:   3,
         parameter_count: 2,
         interest_score:  55.0,
         doc_type:        DocType::FunctionDoc,
      }
   }

   fn open_memory() -> (tempfile::TempDir, Memory) {
      let dir = tempfile::tempdir().unwrap();
      let memory = Memory::open(&dir.path().join("state.db")).unwrap();
      (dir, memory)
   }

   #[test]
   fn test_hash_code_deterministic() {
      let a = Memory::hash_code("def compute(x, y):\n    return x + y\n");
      let b = Memory::hash_code("def compute(x, y):\n    return x + y\n");
      let c = Memory::hash_code("def compute(x, y):\n    return x - y\n");
      assert_eq!(a, b);
      assert_ne!(a, c);
      assert_eq!(a.len(), 64);
   }

   #[test]
   fn test_record_blocks_same_flavor_regardless_of_cooldown() {
      let (_dir, memory) = open_memory();
      let snip = snippet("def compute(x, y):\n    return x + y\n");

      assert!(memory.should_document(&snip, DocType::FunctionDoc, 90).unwrap());
      memory
         .record_documentation(&snip, "snippets/python/compute_x.md", Some("abc123"), DocType::FunctionDoc)
         .unwrap();

      for cooldown in [0, 1, 90, 10_000] {
         assert!(!memory.should_document(&snip, DocType::FunctionDoc, cooldown).unwrap());
      }
   }

   #[test]
   fn test_record_does_not_block_other_flavors() {
      let (_dir, memory) = open_memory();
      let snip = snippet("def compute(x, y):\n    return x + y\n");

      memory
         .record_documentation(&snip, "snippets/python/compute_x.md", None, DocType::FunctionDoc)
         .unwrap();

      assert!(memory.should_document(&snip, DocType::SecurityReview, 90).unwrap());
      assert!(memory.should_document(&snip, DocType::Til, 90).unwrap());
   }

   #[test]
   fn test_changed_source_blocked_by_cooldown() {
      let (_dir, memory) = open_memory();
      let original = snippet("def compute(x, y):\n    return x + y\n");
      memory
         .record_documentation(&original, "snippets/python/compute_x.md", None, DocType::FunctionDoc)
         .unwrap();

      // Same entity, new hash: blocked while the record is younger than the
      // cooldown, eligible once the cooldown is zero
      let edited = snippet("def compute(x, y):\n    return x * y\n");
      assert!(!memory.should_document(&edited, DocType::FunctionDoc, 90).unwrap());
      assert!(memory.should_document(&edited, DocType::FunctionDoc, 0).unwrap());
   }

   #[test]
   fn test_entity_identity_distinguishes_class_name() {
      let (_dir, memory) = open_memory();
      let free_fn = snippet("def compute(x):\n    return x\n");
      memory
         .record_documentation(&free_fn, "snippets/python/compute_x.md", None, DocType::FunctionDoc)
         .unwrap();

      let mut method = snippet("def compute(self, x):\n    return x\n");
      method.class_name = Some("Calc".to_string());
      // Different entity: cooldown on the free function does not apply
      assert!(memory.should_document(&method, DocType::FunctionDoc, 90).unwrap());
   }

   #[test]
   fn test_get_existing_doc_returns_newest() {
      let (_dir, memory) = open_memory();
      let snip = snippet("def compute(x):\n    return x\n");
      memory
         .record_documentation(&snip, "snippets/python/first.md", None, DocType::FunctionDoc)
         .unwrap();
      let second = memory
         .record_documentation(&snip, "snippets/python/second.md", Some("fff000"), DocType::FunctionDoc)
         .unwrap();

      let found = memory.get_existing_doc(&snip, DocType::FunctionDoc).unwrap().unwrap();
      assert_eq!(found.id, second.id);
      assert_eq!(found.snippet_path, "snippets/python/second.md");
      assert_eq!(found.git_commit.as_deref(), Some("fff000"));
      assert_eq!(found.doc_type, DocType::FunctionDoc);
   }

   #[test]
   fn test_stats_counts_by_repo_and_window() {
      let (_dir, memory) = open_memory();
      let mut snip = snippet("def a():\n    pass\n");
      memory.record_documentation(&snip, "a.md", None, DocType::FunctionDoc).unwrap();
      snip.repo = "other".to_string();
      snip.source = "def b():\n    pass\n".to_string();
      memory.record_documentation(&snip, "b.md", None, DocType::FileDoc).unwrap();

      let stats = memory.get_stats().unwrap();
      assert_eq!(stats.total_documented, 2);
      assert_eq!(stats.by_repo.get("demo"), Some(&1));
      assert_eq!(stats.by_repo.get("other"), Some(&1));
      assert_eq!(stats.last_7_days, 2);
   }

   #[test]
   fn test_migration_adds_doc_type_column() {
      let dir = tempfile::tempdir().unwrap();
      let db_path = dir.path().join("state.db");

      // Simulate a store created before flavors existed
      let conn = Connection::open(&db_path).unwrap();
      conn
         .execute_batch(
            "CREATE TABLE documented_snippets (
                id TEXT PRIMARY KEY,
                source_repo TEXT NOT NULL,
                source_file TEXT NOT NULL,
                function_name TEXT,
                class_name TEXT,
                code_hash TEXT NOT NULL,
                documented_at TIMESTAMP NOT NULL,
                snippet_path TEXT NOT NULL,
                git_commit TEXT
            );
            INSERT INTO documented_snippets VALUES
                ('old-id', 'demo', '/tmp/demo/foo.py', 'compute', NULL,
                 'cafebabe', '2024-01-01T00:00:00.000000Z', 'old.md', NULL);",
         )
         .unwrap();
      drop(conn);

      let memory = Memory::open(&db_path).unwrap();
      let snip = snippet("anything");
      // Legacy row now reads back as function_doc
      let found = memory.get_existing_doc(&snip, DocType::FunctionDoc).unwrap().unwrap();
      assert_eq!(found.id, "old-id");
      assert_eq!(found.doc_type, DocType::FunctionDoc);
   }
}
