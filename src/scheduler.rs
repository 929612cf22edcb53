use std::{
   sync::{
      Arc,
      atomic::{AtomicBool, Ordering},
   },
   thread::{self, JoinHandle},
   time::Duration as StdDuration,
};

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use crossbeam_channel::Sender;
use rand::{
   Rng, SeedableRng,
   distr::{Distribution, weighted::WeightedIndex},
   rngs::StdRng,
};
use tracing::{debug, info, warn};

use crate::{
   config::ScheduleSettings,
   error::{Result, WormError},
};

/// Base per-hour commit propensity over a day. Low overnight, zero in the
/// small hours, peaks mid-morning and mid-afternoon with a second evening
/// bump.
const HOUR_WEIGHTS: [f64; 24] = [
   0.02, 0.01, 0.005, 0.0, 0.0, 0.0, 0.01, 0.03, 0.08, 0.12, 0.15, 0.14, 0.08, 0.10, 0.14, 0.15,
   0.14, 0.10, 0.06, 0.05, 0.10, 0.12, 0.10, 0.05,
];

/// Weight multiplier for hours in `prefer_hours`
const PREFER_MULTIPLIER: f64 = 1.5;

/// Weekend schedules never drop below this many commits
const WEEKEND_FLOOR: u32 = 3;

/// Stateful trigger producing fire times whose distribution mimics a human
/// committer: hour-weighted, gap-constrained, thinner on weekends.
///
/// Holds a cached schedule for the current local day and regenerates it when
/// the date rolls over or the slots are drained. Generation is deterministic
/// given the RNG stream; tests construct with [`HumanLikeTrigger::with_seed`].
pub struct HumanLikeTrigger {
   settings:    ScheduleSettings,
   tz:          Tz,
   rng:         StdRng,
   current_day: Option<NaiveDate>,
   daily_times: Vec<DateTime<Tz>>,
}

impl HumanLikeTrigger {
   pub fn new(settings: &ScheduleSettings) -> Result<Self> {
      Self::build(settings, StdRng::from_os_rng())
   }

   pub fn with_seed(settings: &ScheduleSettings, seed: u64) -> Result<Self> {
      Self::build(settings, StdRng::seed_from_u64(seed))
   }

   fn build(settings: &ScheduleSettings, rng: StdRng) -> Result<Self> {
      let tz: Tz = settings.timezone.parse().map_err(|_| {
         WormError::ConfigError(format!("Unknown timezone '{}'", settings.timezone))
      })?;
      Ok(Self {
         settings: settings.clone(),
         tz,
         rng,
         current_day: None,
         daily_times: Vec::new(),
      })
   }

   /// Next fire time strictly after `now`, regenerating the daily schedule
   /// when the local date has rolled over or today's slots are drained
   pub fn next_fire_time(&mut self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
      let now_local = now.with_timezone(&self.tz);
      let today = now_local.date_naive();

      if self.current_day != Some(today) || self.daily_times.is_empty() {
         self.daily_times = self.generate_daily_schedule(today);
         self.current_day = Some(today);
      }

      if let Some(slot) = self.daily_times.iter().find(|slot| **slot > now_local) {
         return Some(slot.with_timezone(&Utc));
      }

      let tomorrow = today.succ_opt()?;
      self.daily_times = self.generate_daily_schedule(tomorrow);
      self.current_day = Some(tomorrow);
      self.daily_times.first().map(|slot| slot.with_timezone(&Utc))
   }

   /// Generate commit times for one calendar day
   fn generate_daily_schedule(&mut self, day: NaiveDate) -> Vec<DateTime<Tz>> {
      let is_weekend = day.weekday().num_days_from_monday() >= 5;
      let mut count = self
         .rng
         .random_range(self.settings.min_commits_per_day..=self.settings.max_commits_per_day);

      if is_weekend {
         count =
            ((f64::from(count) * self.settings.weekend_reduction).round() as u32).max(WEEKEND_FLOOR);
      }

      let times = self.generate_times(day, count as usize);
      debug!(
         date = %day,
         commit_count = times.len(),
         is_weekend,
         "daily schedule generated"
      );
      times
   }

   /// Rejection sampling: hour by weight, minute/second uniform, candidates
   /// within `min_gap_minutes` of an accepted slot rejected. Gives up after
   /// 10x the requested count; a partial schedule just means fewer fires.
   fn generate_times(&mut self, day: NaiveDate, count: usize) -> Vec<DateTime<Tz>> {
      let weights = self.build_hour_weights();
      let Ok(dist) = WeightedIndex::new(weights) else {
         warn!("all hours weighted zero, no schedule for {day}");
         return Vec::new();
      };

      let mut times: Vec<DateTime<Tz>> = Vec::with_capacity(count);
      let mut attempts = 0;
      let max_attempts = count * 10;

      while times.len() < count && attempts < max_attempts {
         attempts += 1;

         let hour = dist.sample(&mut self.rng) as u32;
         let minute = self.rng.random_range(0..60);
         let second = self.rng.random_range(0..60);

         let Some(naive) = day.and_hms_opt(hour, minute, second) else {
            continue;
         };
         // DST folds take the earliest mapping; nonexistent local times are
         // rejected like any other bad sample
         let Some(candidate) = self.tz.from_local_datetime(&naive).earliest() else {
            continue;
         };

         if self.is_valid_time(candidate, &times) {
            times.push(candidate);
         }
      }

      times.sort_unstable();
      times
   }

   fn build_hour_weights(&self) -> [f64; 24] {
      let mut weights = HOUR_WEIGHTS;

      for hour in &self.settings.prefer_hours {
         if let Some(w) = weights.get_mut(*hour as usize) {
            *w *= PREFER_MULTIPLIER;
         }
      }
      for hour in &self.settings.avoid_hours {
         if let Some(w) = weights.get_mut(*hour as usize) {
            *w = 0.0;
         }
      }

      weights
   }

   fn is_valid_time(&self, candidate: DateTime<Tz>, existing: &[DateTime<Tz>]) -> bool {
      let min_gap = chrono::Duration::minutes(i64::from(self.settings.min_gap_minutes));
      existing
         .iter()
         .all(|slot| (candidate - *slot).abs() >= min_gap)
   }

   /// Regenerate schedules for `[today, today + days)` without touching the
   /// fire-time cache, returning the flat sorted sequence
   pub fn preview_from(&mut self, now: DateTime<Utc>, days: u32) -> Vec<DateTime<Tz>> {
      let start = now.with_timezone(&self.tz).date_naive();
      let mut all = Vec::new();

      let mut day = start;
      for _ in 0..days {
         all.extend(self.generate_daily_schedule(day));
         let Some(next) = day.succ_opt() else { break };
         day = next;
      }

      all.sort_unstable();
      all
   }
}

/// Owns the trigger on a background thread and forwards fires to the daemon
/// over a bounded channel. The channel holds at most one pending fire, so
/// fires landing while a cycle is still running coalesce.
pub struct Scheduler {
   settings: ScheduleSettings,
   shutdown: Arc<AtomicBool>,
   handle:   Option<JoinHandle<()>>,
}

impl Scheduler {
   pub fn new(settings: &ScheduleSettings) -> Self {
      Self {
         settings: settings.clone(),
         shutdown: Arc::new(AtomicBool::new(false)),
         handle:   None,
      }
   }

   /// Start the trigger thread. Fires are sent with `try_send`; a full
   /// channel means a cycle is still running and the fire is dropped.
   pub fn start(&mut self, fire_tx: Sender<()>) -> Result<()> {
      if !self.settings.enabled {
         info!("scheduler disabled");
         return Ok(());
      }

      let mut trigger = HumanLikeTrigger::new(&self.settings)?;
      let shutdown = Arc::clone(&self.shutdown);

      self.handle = Some(thread::spawn(move || {
         while !shutdown.load(Ordering::Relaxed) {
            let Some(next) = trigger.next_fire_time(Utc::now()) else {
               thread::sleep(StdDuration::from_secs(60));
               continue;
            };

            debug!(next = %next, "waiting for next fire time");
            loop {
               if shutdown.load(Ordering::Relaxed) {
                  return;
               }
               let remaining = next.signed_duration_since(Utc::now());
               if remaining <= chrono::Duration::zero() {
                  break;
               }
               let sleep_for = remaining
                  .to_std()
                  .unwrap_or(StdDuration::from_secs(1))
                  .min(StdDuration::from_secs(1));
               thread::sleep(sleep_for);
            }

            if fire_tx.try_send(()).is_err() {
               debug!("previous cycle still running, fire coalesced");
            }
         }
      }));

      info!(
         min_commits = self.settings.min_commits_per_day,
         max_commits = self.settings.max_commits_per_day,
         timezone = %self.settings.timezone,
         "scheduler started"
      );
      Ok(())
   }

   /// Signal the trigger thread to stop and wait for it to exit
   pub fn stop(&mut self) {
      self.shutdown.store(true, Ordering::Relaxed);
      if let Some(handle) = self.handle.take() {
         handle.join().ok();
         info!("scheduler stopped");
      }
   }

   /// Schedule preview for the CLI; uses a fresh trigger so the live cache
   /// is untouched
   pub fn preview(&self, days: u32) -> Result<Vec<DateTime<Tz>>> {
      let mut trigger = HumanLikeTrigger::new(&self.settings)?;
      Ok(trigger.preview_from(Utc::now(), days))
   }
}

impl Drop for Scheduler {
   fn drop(&mut self) {
      self.stop();
   }
}
