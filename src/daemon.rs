use std::{
   collections::{HashSet, VecDeque},
   sync::{
      Arc,
      atomic::{AtomicBool, Ordering},
   },
   thread,
   time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use crossbeam_channel::RecvTimeoutError;
use parking_lot::Mutex;
use rand::{SeedableRng, rngs::StdRng};
use serde_json::json;
use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
use tracing::{debug, error, info, warn};

use crate::{
   analyzer::CodeAnalyzer,
   config::WormConfig,
   error::{Result, WormError},
   events::EventPublisher,
   gitops::{DevlogRepository, is_secret_rejection},
   llm::OllamaClient,
   memory::Memory,
   notifier::Notifier,
   prompts,
   scanner::RepoScanner,
   scheduler::Scheduler,
   targets::{DocumentationTarget, TargetRouter, WeightedRepoSelector, dispatchable_doc_types, select_doc_type},
   types::snippet_filename,
};

/// Hard ceiling for one documentation cycle
const CYCLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);
/// Dead man's switch wake interval
const WATCHDOG_INTERVAL: Duration = Duration::from_secs(5 * 60);
/// Quiet period after which the dead man's switch trips
const WATCHDOG_THRESHOLD: Duration = Duration::from_secs(45 * 60);
/// Log lines included in a watchdog alert
const WATCHDOG_LOG_TAIL: usize = 20;
/// Candidates requested from the router per (repo, flavor) attempt
const TARGETS_PER_QUERY: usize = 20;
/// LLM retry policy for in-cycle generation
const GENERATE_RETRIES: u32 = 3;
const GENERATE_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Ollama-wait backoff: 10s doubling per consecutive failure, capped at 300s
pub fn ollama_wait_seconds(consecutive_failures: u32) -> u64 {
   let failures = consecutive_failures.max(1);
   let exp = (failures - 1).min(10);
   (10_u64 << exp).min(300)
}

/// Pre-cycle backoff after repeated failures: nothing for the first failure,
/// then 30s doubling, capped at 300s
pub fn cycle_backoff_seconds(consecutive_failures: u32) -> u64 {
   if consecutive_failures <= 1 {
      return 0;
   }
   let exp = (consecutive_failures - 1).min(10);
   (30_u64 << exp).min(300)
}

/// Whether a push failure should alert right now
pub fn push_failure_alerts(message: &str, consecutive_push_failures: u32, alert_after: u32) -> bool {
   is_secret_rejection(message) || consecutive_push_failures >= alert_after
}

/// Whether the dead man's switch should trip
pub fn watchdog_tripped(
   now: DateTime<Utc>,
   start_time: DateTime<Utc>,
   last_success: Option<DateTime<Utc>>,
) -> bool {
   let reference = last_success.map_or(start_time, |at| at.max(start_time));
   now.signed_duration_since(reference).num_seconds() > WATCHDOG_THRESHOLD.as_secs() as i64
}

// === Cycle statistics ===

/// Daemon-lifetime counters and streaks
#[derive(Debug, Default)]
pub struct CycleStats {
   pub total_cycles:                u64,
   pub successful_cycles:           u64,
   pub failed_cycles:               u64,
   pub skipped_cycles:              u64,
   pub consecutive_failures:        u32,
   pub consecutive_ollama_failures: u32,
   pub consecutive_push_failures:   u32,
   pub last_success:                Option<DateTime<Utc>>,
   pub last_failure:                Option<DateTime<Utc>>,
   pub repos_exhausted:             HashSet<String>,
}

impl CycleStats {
   /// A success resets the failure streak and the exhausted set
   pub fn record_success(&mut self) {
      self.total_cycles += 1;
      self.successful_cycles += 1;
      self.last_success = Some(Utc::now());
      self.consecutive_failures = 0;
      self.repos_exhausted.clear();
   }

   pub fn record_failure(&mut self) {
      self.total_cycles += 1;
      self.failed_cycles += 1;
      self.last_failure = Some(Utc::now());
      self.consecutive_failures += 1;
   }

   pub fn record_skip(&mut self) {
      self.total_cycles += 1;
      self.skipped_cycles += 1;
   }

   pub fn snapshot(&self) -> serde_json::Value {
      json!({
         "total_cycles": self.total_cycles,
         "successful_cycles": self.successful_cycles,
         "failed_cycles": self.failed_cycles,
         "skipped_cycles": self.skipped_cycles,
         "consecutive_failures": self.consecutive_failures,
         "consecutive_ollama_failures": self.consecutive_ollama_failures,
         "consecutive_push_failures": self.consecutive_push_failures,
         "last_success": self.last_success.map(|t| t.to_rfc3339()),
         "last_failure": self.last_failure.map(|t| t.to_rfc3339()),
         "repos_exhausted": self.repos_exhausted.iter().collect::<Vec<_>>(),
      })
   }
}

/// In-memory ring of recent log lines, feeding watchdog alerts
pub struct RecentLog {
   lines: Mutex<VecDeque<String>>,
}

impl RecentLog {
   const CAPACITY: usize = 200;

   pub fn new() -> Self {
      Self { lines: Mutex::new(VecDeque::with_capacity(Self::CAPACITY)) }
   }

   pub fn push(&self, line: String) {
      let mut lines = self.lines.lock();
      if lines.len() == Self::CAPACITY {
         lines.pop_front();
      }
      lines.push_back(line);
   }

   pub fn tail(&self, count: usize) -> String {
      let lines = self.lines.lock();
      let skip = lines.len().saturating_sub(count);
      lines.iter().skip(skip).cloned().collect::<Vec<_>>().join("\n")
   }
}

impl Default for RecentLog {
   fn default() -> Self {
      Self::new()
   }
}

/// Outcome of one cycle, before stats accounting
enum CycleOutcome {
   Committed,
   DryRun,
   Skipped,
}

// === Daemon ===

/// The supervisor: owns every collaborator exclusively and serializes all
/// cycles on the thread that calls [`Daemon::run`].
pub struct Daemon {
   config:        WormConfig,
   memory:        Memory,
   llm:           OllamaClient,
   router:        TargetRouter,
   repo_selector: WeightedRepoSelector,
   devlog:        DevlogRepository,
   publisher:     Option<EventPublisher>,
   notifier:      Option<Notifier>,
   stats:         Arc<Mutex<CycleStats>>,
   recent_log:    Arc<RecentLog>,
   rng:           StdRng,
   shutdown:      Arc<AtomicBool>,
   interrupted:   Arc<AtomicBool>,
   reload:        Arc<AtomicBool>,
   start_time:    DateTime<Utc>,
   dry_run:       bool,
}

impl Daemon {
   pub fn new(config: WormConfig, dry_run: bool) -> Result<Self> {
      let memory = Memory::open(&config.db_path())?;
      let llm = OllamaClient::new(&config.ollama);
      let analyzer = CodeAnalyzer::new(config.analyzer.clone())?;
      let scanner = RepoScanner::from_settings(&config.analyzer)?;
      let router = TargetRouter::new(analyzer, scanner);
      let repo_selector = WeightedRepoSelector::new(&config.repos);
      let devlog = DevlogRepository::new(&config.devlog);

      let publisher = if config.events.redis_url.is_empty() {
         None
      } else {
         EventPublisher::connect(&config.events.redis_url)
      };
      let notifier = Notifier::new(&config.alerts);

      Ok(Self {
         config,
         memory,
         llm,
         router,
         repo_selector,
         devlog,
         publisher,
         notifier,
         stats: Arc::new(Mutex::new(CycleStats::default())),
         recent_log: Arc::new(RecentLog::new()),
         rng: StdRng::from_os_rng(),
         shutdown: Arc::new(AtomicBool::new(false)),
         interrupted: Arc::new(AtomicBool::new(false)),
         reload: Arc::new(AtomicBool::new(false)),
         start_time: Utc::now(),
         dry_run,
      })
   }

   fn is_running(&self) -> bool {
      !self.shutdown.load(Ordering::Relaxed)
   }

   /// INT and TERM request shutdown; HUP logs a reload intent. Handlers are
   /// flag-only, so they are async-signal-safe.
   fn install_signal_handlers(&self) -> Result<()> {
      signal_hook::flag::register(SIGTERM, Arc::clone(&self.shutdown))
         .map_err(|e| WormError::Other(format!("Failed to install SIGTERM handler: {e}")))?;
      signal_hook::flag::register(SIGINT, Arc::clone(&self.shutdown))
         .map_err(|e| WormError::Other(format!("Failed to install SIGINT handler: {e}")))?;
      signal_hook::flag::register(SIGINT, Arc::clone(&self.interrupted))
         .map_err(|e| WormError::Other(format!("Failed to install SIGINT handler: {e}")))?;
      signal_hook::flag::register(SIGHUP, Arc::clone(&self.reload))
         .map_err(|e| WormError::Other(format!("Failed to install SIGHUP handler: {e}")))?;
      Ok(())
   }

   /// Record a line in the watchdog ring buffer and mirror it to the logs
   /// channel
   fn note(&self, line: String) {
      if let Some(publisher) = &self.publisher {
         publisher.publish_log(json!({
            "timestamp": Utc::now().to_rfc3339(),
            "message": line,
         }));
      }
      self.recent_log.push(format!("{} {line}", Utc::now().format("%H:%M:%S")));
   }

   fn emit_event(&self, event_type: &str, data: serde_json::Value) {
      // Best-effort by construction: the publisher swallows its own errors
      if let Some(publisher) = &self.publisher {
         publisher.publish_event(event_type, data);
      }
   }

   fn alert(&self, title: &str, last_error: Option<&str>, details: Option<&str>) {
      if let Some(notifier) = &self.notifier {
         notifier.send_alert(title, last_error, details);
      }
   }

   /// Sleep in one-second slices, observing shutdown within a second
   fn interruptible_sleep(&self, seconds: u64) -> bool {
      for _ in 0..seconds {
         if !self.is_running() {
            return false;
         }
         thread::sleep(Duration::from_secs(1));
      }
      self.is_running()
   }

   /// Block until Ollama answers its health probe, with exponential backoff
   /// per consecutive failure. Returns false when shutdown was requested
   /// while waiting.
   fn wait_for_ollama(&mut self) -> bool {
      loop {
         if !self.is_running() {
            return false;
         }

         if self.llm.health_check() {
            let mut stats = self.stats.lock();
            if stats.consecutive_ollama_failures > 0 {
               info!(
                  failures = stats.consecutive_ollama_failures,
                  "Ollama reachable again"
               );
               self.note("ollama recovered".to_string());
            }
            stats.consecutive_ollama_failures = 0;
            return true;
         }

         let failures = {
            let mut stats = self.stats.lock();
            stats.consecutive_ollama_failures += 1;
            stats.consecutive_ollama_failures
         };

         let wait = ollama_wait_seconds(failures);
         warn!(failures, wait_seconds = wait, "Ollama unreachable, backing off");
         self.note(format!("ollama unreachable (attempt {failures}), waiting {wait}s"));

         if failures == self.config.alerts.alert_after_failures {
            self.alert(
               "Ollama unreachable",
               Some(&format!("{failures} consecutive health check failures")),
               Some(&format!("backing off {wait}s; model {}", self.config.ollama.model)),
            );
         }

         if !self.interruptible_sleep(wait) {
            return false;
         }
      }
   }

   /// Find an eligible target: the weighted-random flavor first, then the
   /// remaining flavors in configuration order, across repos in
   /// weighted-random order. Repos yielding nothing get marked exhausted.
   /// A memory error (lock timeout) is fatal for the cycle.
   fn find_target(&mut self) -> Result<Option<DocumentationTarget>> {
      let selected = select_doc_type(&self.config.documentation.type_weights, &mut self.rng);
      let mut flavors = vec![selected];
      for (flavor, _) in dispatchable_doc_types(&self.config.documentation.type_weights) {
         if !flavors.contains(&flavor) {
            flavors.push(flavor);
         }
      }

      let cooldown = self.config.documentation.redocument_after_days;
      let repos = self.repo_selector.shuffled(&mut self.rng);

      for repo in &repos {
         self.emit_event("analyzing", json!({ "repo": repo.name }));

         for flavor in &flavors {
            let targets = self.router.find_targets(*flavor, repo, TARGETS_PER_QUERY);
            for target in targets {
               if self.memory.should_document(&target.snippet, *flavor, cooldown)? {
                  debug!(
                     repo = %repo.name,
                     flavor = %flavor,
                     name = %target.display_name(),
                     score = target.score(),
                     "target selected"
                  );
                  return Ok(Some(target));
               }
            }
         }

         self.stats.lock().repos_exhausted.insert(repo.name.clone());
         debug!(repo = %repo.name, "repo exhausted for this cycle");
      }

      Ok(None)
   }

   /// One full documentation cycle. Any error is converted to a recorded
   /// failure by the caller; nothing propagates to the main loop.
   fn execute_cycle(&mut self) -> Result<CycleOutcome> {
      let deadline = Instant::now() + CYCLE_TIMEOUT;
      let cycle_no = self.stats.lock().total_cycles + 1;

      self.emit_event("cycle_starting", json!({ "cycle": cycle_no }));
      self.note(format!("cycle {cycle_no} starting"));

      // 1. LLM must be ready; outages re-enter the wait protocol
      if !self.llm.health_check() && !self.wait_for_ollama() {
         return Ok(CycleOutcome::Skipped);
      }

      // 2. Pick a target
      let Some(target) = self.find_target()? else {
         info!("no eligible documentation target this cycle");
         self.note("no eligible target, cycle skipped".to_string());
         return Ok(CycleOutcome::Skipped);
      };

      let display_name = target.display_name();
      let language = target.snippet.language;
      info!(
         name = %display_name,
         flavor = %target.doc_type,
         repo = %target.snippet.repo,
         score = target.score(),
         "generating documentation"
      );

      // 3. Generate the documentation text
      self.emit_event(
         "generating",
         json!({ "name": display_name, "doc_type": target.doc_type.as_str() }),
      );
      let doc_prompt = prompts::build_documentation_prompt(&target)?;
      let generated = self.llm.generate_with_retry(
         &doc_prompt.user,
         Some(&doc_prompt.system),
         GENERATE_RETRIES,
         GENERATE_RETRY_DELAY,
      )?;

      if Instant::now() > deadline {
         return Err(WormError::CycleTimeout(CYCLE_TIMEOUT.as_secs()));
      }

      if self.dry_run {
         info!(
            name = %display_name,
            tokens = generated.total_tokens(),
            "dry run: would commit documentation"
         );
         println!("{}", generated.text);
         return Ok(CycleOutcome::DryRun);
      }

      // 4. Ask the model for a commit message, with a deterministic fallback
      let commit_message = match prompts::build_commit_message_prompt(&generated.text, &target)
         .and_then(|pair| {
            self.llm.generate_with_retry(
               &pair.user,
               Some(&pair.system),
               GENERATE_RETRIES,
               GENERATE_RETRY_DELAY,
            )
         }) {
         Ok(result) => {
            let cleaned = prompts::clean_commit_message(&result.text);
            if cleaned.is_empty() { format!("Document {display_name}") } else { cleaned }
         },
         Err(e) => {
            warn!(error = %e, "commit message generation failed, using fallback");
            format!("Document {display_name}")
         },
      };

      if Instant::now() > deadline {
         return Err(WormError::CycleTimeout(CYCLE_TIMEOUT.as_secs()));
      }

      // 5. Write, commit, record, push
      let code_hash = Memory::hash_code(&target.snippet.source);
      let filename = snippet_filename(&target.snippet, &code_hash);
      let content = render_snippet_markdown(&target, &generated.text);
      let file_path = self.devlog.write_snippet(&content, &filename, language.as_str())?;
      let snippet_path = format!("snippets/{}/{filename}", language.as_str());

      let commit = self.devlog.commit(&commit_message, std::slice::from_ref(&file_path))?;
      self.memory.record_documentation(
         &target.snippet,
         &snippet_path,
         Some(&commit.commit_hash),
         target.doc_type,
      )?;

      self.handle_push();

      info!(
         name = %display_name,
         path = %snippet_path,
         commit = %commit.commit_hash,
         "documentation committed"
      );
      self.note(format!("committed {snippet_path} ({})", commit.commit_hash));
      self.emit_event(
         "documentation_committed",
         json!({
            "name": display_name,
            "doc_type": target.doc_type.as_str(),
            "repo": target.snippet.repo,
            "snippet_path": snippet_path,
            "commit": commit.commit_hash,
         }),
      );

      Ok(CycleOutcome::Committed)
   }

   /// Push failures never fail the cycle: the commit is already durable
   /// locally. Secret-scanner rejections alert immediately; other failures
   /// alert once the consecutive counter reaches the configured threshold.
   fn handle_push(&mut self) {
      match self.devlog.push() {
         Ok(_) => {
            self.stats.lock().consecutive_push_failures = 0;
         },
         Err(e) => {
            let message = e.to_string();
            let failures = {
               let mut stats = self.stats.lock();
               stats.consecutive_push_failures += 1;
               stats.consecutive_push_failures
            };
            warn!(error = %message, failures, "push failed; commit remains local");
            self.note(format!("push failed ({failures} consecutive)"));

            if push_failure_alerts(&message, failures, self.config.alerts.alert_after_failures) {
               if is_secret_rejection(&message) {
                  self.alert(
                     "Devlog push blocked by secret scanning",
                     Some(&message),
                     Some("The remote rejected the push; inspect the devlog history before retrying"),
                  );
               } else {
                  self.alert(
                     "Devlog push failing",
                     Some(&message),
                     Some(&format!("{failures} consecutive push failures")),
                  );
               }
            }
         },
      }
   }

   /// Run one cycle and account for its outcome. Errors become recorded
   /// failures; Ollama outages skip the cycle instead of failing it.
   fn run_cycle(&mut self) {
      let outcome = self.execute_cycle();

      match outcome {
         Ok(CycleOutcome::Committed | CycleOutcome::DryRun) => {
            let mut stats = self.stats.lock();
            stats.record_success();
            let snapshot = stats.snapshot();
            drop(stats);
            if let Some(publisher) = &self.publisher {
               publisher.publish_stats(snapshot);
            }
         },
         // The exhausted set survives skips; only a success clears it
         Ok(CycleOutcome::Skipped) => {
            self.stats.lock().record_skip();
         },
         Err(e) if e.is_outage() => {
            warn!(error = %e, "LLM outage mid-cycle, skipping");
            self.stats.lock().record_skip();
         },
         Err(e) => {
            error!(error = %e, "cycle failed");
            self.note(format!("cycle failed: {e}"));
            let failures = {
               let mut stats = self.stats.lock();
               stats.record_failure();
               stats.consecutive_failures
            };
            if failures >= self.config.alerts.alert_after_failures {
               self.alert(
                  "Documentation cycles failing",
                  Some(&e.to_string()),
                  Some(&format!("{failures} consecutive failures")),
               );
            }
         },
      }

      self.emit_event("next_cycle", json!({}));
   }

   /// Passive watchdog: wakes every five minutes and alerts (once, until the
   /// next success) when nothing has succeeded for 45 minutes. It only
   /// notifies; it never forces an action.
   fn spawn_watchdog(&self) -> thread::JoinHandle<()> {
      let shutdown = Arc::clone(&self.shutdown);
      let stats = Arc::clone(&self.stats);
      let recent_log = Arc::clone(&self.recent_log);
      let notifier_settings = self.config.alerts.clone();
      let start_time = self.start_time;

      thread::spawn(move || {
         let notifier = Notifier::new(&notifier_settings);
         let mut latched = false;
         let mut last_seen_success: Option<DateTime<Utc>> = None;

         while !shutdown.load(Ordering::Relaxed) {
            // 1-second polls so shutdown is observed promptly
            for _ in 0..WATCHDOG_INTERVAL.as_secs() {
               if shutdown.load(Ordering::Relaxed) {
                  return;
               }
               thread::sleep(Duration::from_secs(1));
            }

            let last_success = stats.lock().last_success;
            if last_success != last_seen_success {
               last_seen_success = last_success;
               latched = false;
            }

            if !latched && watchdog_tripped(Utc::now(), start_time, last_success) {
               warn!("no successful cycle in over 45 minutes");
               if let Some(notifier) = &notifier {
                  notifier.send_alert(
                     "No successful documentation cycle in 45 minutes",
                     None,
                     Some(&recent_log.tail(WATCHDOG_LOG_TAIL)),
                  );
               }
               latched = true;
            }
         }
      })
   }

   /// Startup sequence then the main loop: wait for scheduler fires, apply
   /// failure backoff, run serialized cycles. Returns the process exit code.
   pub fn run(&mut self) -> Result<i32> {
      self.install_signal_handlers()?;

      info!(
         repos = self.config.repos.len(),
         debug = self.config.debug,
         dry_run = self.dry_run,
         "daemon starting"
      );

      if self.repo_selector.is_empty() {
         return Err(WormError::ConfigError("no enabled repositories configured".to_string()));
      }

      self.devlog.ensure_repo()?;
      self.devlog.ensure_directory_structure()?;
      prompts::ensure_prompts_dir()?;

      let memory_stats = self.memory.get_stats()?;
      info!(
         total_documented = memory_stats.total_documented,
         last_7_days = memory_stats.last_7_days,
         "memory loaded"
      );

      if !self.wait_for_ollama() {
         info!("shutdown requested before Ollama became ready");
         return Ok(self.exit_code());
      }
      self.llm.prewarm();

      let (fire_tx, fire_rx) = crossbeam_channel::bounded::<()>(1);
      let mut scheduler = Scheduler::new(&self.config.schedule);
      scheduler.start(fire_tx)?;

      let watchdog = self.spawn_watchdog();

      while self.is_running() {
         if self.reload.swap(false, Ordering::Relaxed) {
            info!("SIGHUP received; configuration reload is not applied at runtime");
         }

         match fire_rx.recv_timeout(Duration::from_secs(1)) {
            Ok(()) => {
               let backoff = cycle_backoff_seconds(self.stats.lock().consecutive_failures);
               if backoff > 0 {
                  info!(backoff_seconds = backoff, "backing off before next cycle");
                  if !self.interruptible_sleep(backoff) {
                     break;
                  }
               }
               self.run_cycle();
            },
            Err(RecvTimeoutError::Timeout) => {},
            Err(RecvTimeoutError::Disconnected) => break,
         }
      }

      info!("shutting down");
      scheduler.stop();
      self.shutdown.store(true, Ordering::Relaxed);
      watchdog.join().ok();
      info!("daemon stopped");

      Ok(self.exit_code())
   }

   /// Execute a single cycle immediately, bypassing the scheduler
   pub fn run_once(&mut self) -> Result<i32> {
      self.install_signal_handlers()?;
      self.devlog.ensure_repo()?;
      self.devlog.ensure_directory_structure()?;
      prompts::ensure_prompts_dir()?;

      if !self.wait_for_ollama() {
         return Ok(self.exit_code());
      }
      self.llm.prewarm();
      self.run_cycle();

      let stats = self.stats.lock();
      if stats.failed_cycles > 0 {
         return Err(WormError::Other("cycle failed; see logs".to_string()));
      }
      drop(stats);
      Ok(self.exit_code())
   }

   fn exit_code(&self) -> i32 {
      if self.interrupted.load(Ordering::Relaxed) { 130 } else { 0 }
   }

   /// Current statistics snapshot, for the CLI
   pub fn stats_snapshot(&self) -> serde_json::Value {
      self.stats.lock().snapshot()
   }
}

/// Markdown layout for a committed snippet
fn render_snippet_markdown(target: &DocumentationTarget, text: &str) -> String {
   let snippet = &target.snippet;
   format!(
      "# {}\n\n- Repository: `{}`\n- File: `{}`\n- Kind: {}\n- Lines: {}-{}\n\n{}\n",
      target.display_name(),
      snippet.repo,
      snippet.file_path.display(),
      target.doc_type,
      snippet.start_line,
      snippet.end_line,
      text.trim()
   )
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_cycle_stats_invariant() {
      let mut stats = CycleStats::default();
      stats.record_success();
      stats.record_failure();
      stats.record_failure();
      stats.record_skip();
      stats.record_success();

      assert_eq!(
         stats.total_cycles,
         stats.successful_cycles + stats.failed_cycles + stats.skipped_cycles
      );
      assert_eq!(stats.total_cycles, 5);
   }

   #[test]
   fn test_success_resets_failure_streak_and_exhausted() {
      let mut stats = CycleStats::default();
      stats.record_failure();
      stats.record_failure();
      stats.repos_exhausted.insert("demo".to_string());
      assert_eq!(stats.consecutive_failures, 2);

      stats.record_success();
      assert_eq!(stats.consecutive_failures, 0);
      assert!(stats.repos_exhausted.is_empty());
      assert!(stats.last_success.is_some());
   }

   #[test]
   fn test_ollama_wait_interval_sequence() {
      let waits: Vec<u64> = (1..=8).map(ollama_wait_seconds).collect();
      assert_eq!(waits, vec![10, 20, 40, 80, 160, 300, 300, 300]);
   }

   #[test]
   fn test_cycle_backoff_sequence() {
      assert_eq!(cycle_backoff_seconds(0), 0);
      assert_eq!(cycle_backoff_seconds(1), 0);
      assert_eq!(cycle_backoff_seconds(2), 60);
      assert_eq!(cycle_backoff_seconds(3), 120);
      assert_eq!(cycle_backoff_seconds(4), 240);
      assert_eq!(cycle_backoff_seconds(5), 300);
      assert_eq!(cycle_backoff_seconds(9), 300);
   }

   #[test]
   fn test_push_failure_alert_policy() {
      // Secret scanning alerts immediately, regardless of streak
      assert!(push_failure_alerts("remote: GH013: repository rule violation", 1, 4));
      assert!(push_failure_alerts("a secret was detected", 1, 4));
      // Ordinary failures alert only once the streak reaches the threshold
      assert!(!push_failure_alerts("connection reset by peer", 3, 4));
      assert!(push_failure_alerts("connection reset by peer", 4, 4));
   }

   #[test]
   fn test_watchdog_threshold() {
      let start = Utc::now() - chrono::Duration::hours(2);

      // Fresh success holds the switch
      let recent = Some(Utc::now() - chrono::Duration::minutes(10));
      assert!(!watchdog_tripped(Utc::now(), start, recent));

      // Stale success trips it
      let stale = Some(Utc::now() - chrono::Duration::minutes(50));
      assert!(watchdog_tripped(Utc::now(), start, stale));

      // No success at all measures from start time
      assert!(watchdog_tripped(Utc::now(), start, None));
      assert!(!watchdog_tripped(Utc::now(), Utc::now() - chrono::Duration::minutes(5), None));
   }

   #[test]
   fn test_recent_log_tail() {
      let log = RecentLog::new();
      for i in 0..250 {
         log.push(format!("line {i}"));
      }
      let tail = log.tail(3);
      assert_eq!(tail, "line 247\nline 248\nline 249");
      // Capacity bounded
      assert!(!log.tail(500).contains("line 0\n"));
   }

   #[test]
   fn test_snapshot_shape() {
      let mut stats = CycleStats::default();
      stats.record_success();
      let snapshot = stats.snapshot();
      assert_eq!(snapshot["total_cycles"], 1);
      assert_eq!(snapshot["successful_cycles"], 1);
      assert!(snapshot["last_success"].is_string());
      assert!(snapshot["last_failure"].is_null());
   }
}
