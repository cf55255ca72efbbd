// The task scheduler: evaluates every configured task against the current
// time, the task's constraints, and the run ledger; fires eligible tasks
// through the process launcher, strictly sequentially within a tick.

use crate::process_launcher::{LaunchError, Launcher};
use crate::run_ledger::{FireMarker, RunLedger};
use crate::schedule::{ScheduleConfig, ScheduledTime, TaskSchedule, TaskSpec};
use crate::throttler::MessageThrottler;

use bkpmon_common::constants::defaults;
use bkpmon_common::host_context::HostContext;
use bkpmon_common::tracing::Tracing;

use chrono::{Datelike, Duration as TimeDelta, NaiveDateTime};
use std::sync::Arc;

/// Evaluates tasks and owns the run ledger.
///
/// "Now" is passed into every tick so single ticks can be evaluated in
/// isolation; the ledger lives only in memory and is rebuilt from scratch on
/// restart, which re-arms time-of-day slots for the current window and
/// intervals immediately.
pub struct TaskScheduler {
    trace: Tracing,
    launcher: Arc<dyn Launcher>,
    ledger: RunLedger,
    waiting: MessageThrottler,
    tolerance: TimeDelta,
}

impl TaskScheduler {
    pub fn new(context: &Arc<HostContext>, launcher: Arc<dyn Launcher>) -> Self {
        Self {
            trace: context.get_trace("TaskScheduler"),
            launcher,
            ledger: RunLedger::new(),
            waiting: MessageThrottler::with_interval(defaults::WAITING_LOG_INTERVAL),
            tolerance: TimeDelta::minutes(defaults::TOLERANCE_MINUTES),
        }
    }

    /// The ledger, for inspection.
    pub fn ledger(&self) -> &RunLedger {
        &self.ledger
    }

    /// Evaluate every task in `config`, in document order.
    ///
    /// Task processes are awaited one at a time: one task's exit gates the
    /// evaluation of the next, and a hung executable stalls only the rest of
    /// this tick.
    pub async fn run_tick(
        &mut self,
        config: &ScheduleConfig,
        now: NaiveDateTime,
        host_role: &str,
    ) {
        for task in &config.tasks {
            self.evaluate_task(task, now, host_role).await;
        }
    }

    async fn evaluate_task(&mut self, task: &TaskSpec, now: NaiveDateTime, host_role: &str) {
        if !task.active {
            self.trace
                .verbose(&format!("Task '{}' is inactive; skipping", task.name));
            return;
        }

        if !task.allowed_roles.is_empty()
            && !task
                .allowed_roles
                .iter()
                .any(|role| role.trim().eq_ignore_ascii_case(host_role))
        {
            self.trace.verbose(&format!(
                "Task '{}' is not eligible for role '{}'",
                task.name, host_role
            ));
            return;
        }

        if !task.months.is_empty() && !task.months.contains(&now.date().month()) {
            return;
        }
        if !task.days.is_empty() && !task.days.contains(&now.date().day()) {
            return;
        }

        let Some(schedule) = task.schedule(&self.trace) else {
            return;
        };

        match schedule {
            TaskSchedule::Daily {
                times,
                repeat_every_days,
            } => {
                self.evaluate_daily(task, &times, repeat_every_days, now)
                    .await;
            }
            TaskSchedule::Interval { minutes } => {
                self.evaluate_interval(task, minutes, now).await;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Time-of-day mode
    // -----------------------------------------------------------------------

    async fn evaluate_daily(
        &mut self,
        task: &TaskSpec,
        times: &[ScheduledTime],
        repeat_every_days: Option<i64>,
        now: NaiveDateTime,
    ) {
        let matched = times.iter().find(|slot| {
            let target = now.date().and_time(slot.time);
            target <= now && now <= target + self.tolerance
        });

        let Some(slot) = matched else {
            for slot in times {
                let throttle_key = format!("{}|{}", task.name, slot.label);
                if self.waiting.should_emit(&throttle_key) {
                    self.trace.info(&format!(
                        "Task '{}' waiting for window {}",
                        task.name, slot.label
                    ));
                }
            }
            return;
        };

        let key = match repeat_every_days {
            Some(cycle_days) => {
                let key = RunLedger::cycle_key(&task.name, &slot.label);
                if let Some(FireMarker::Day(last_fired)) = self.ledger.get(&key) {
                    let elapsed_days = (now.date() - last_fired).num_days();
                    if elapsed_days < cycle_days {
                        self.trace.verbose(&format!(
                            "Task '{}' fired {} day(s) ago, within its {}-day cycle",
                            task.name, elapsed_days, cycle_days
                        ));
                        return;
                    }
                }
                key
            }
            None => {
                let key = RunLedger::daily_key(&task.name, &slot.label, now.date());
                if self.ledger.contains(&key) {
                    self.trace.verbose(&format!(
                        "Task '{}' already fired for slot {} today",
                        task.name, slot.label
                    ));
                    return;
                }
                key
            }
        };

        let path = match self.launcher.resolve(&task.name, task.location.as_deref()) {
            Ok(path) => path,
            Err(e) => {
                // Resolution failure leaves the slot unmarked: the
                // executable may appear later within the window.
                self.trace
                    .warning(&format!("Task '{}' cannot fire: {}", task.name, e));
                return;
            }
        };

        self.trace.info(&format!(
            "Firing task '{}' for slot {}",
            task.name, slot.label
        ));

        let result = self.launcher.launch_and_wait(&path, true).await;

        // The slot is marked once a launch was attempted, even when the
        // spawn failed: re-spawning on every tick inside the window would be
        // a launch storm against a transiently locked file.
        self.ledger.mark_day(key, now.date());

        match result {
            Ok(code) => self.trace.info(&format!(
                "Task '{}' finished with code {}",
                task.name, code
            )),
            Err(e) => self
                .trace
                .warning(&format!("Task '{}' launch failed: {}", task.name, e)),
        }
    }

    // -----------------------------------------------------------------------
    // Interval mode
    // -----------------------------------------------------------------------

    async fn evaluate_interval(&mut self, task: &TaskSpec, minutes: i64, now: NaiveDateTime) {
        let key = RunLedger::interval_key(&task.name);

        let due = match self.ledger.get(&key) {
            None => true,
            Some(FireMarker::At(last_fired)) => now - last_fired >= TimeDelta::minutes(minutes),
            Some(FireMarker::Day(_)) => true,
        };

        if !due {
            return;
        }

        let path = match self.launcher.resolve(&task.name, task.location.as_deref()) {
            Ok(path) => path,
            Err(e) => {
                self.trace
                    .warning(&format!("Task '{}' cannot fire: {}", task.name, e));
                return;
            }
        };

        self.trace.info(&format!(
            "Firing task '{}' (every {} min)",
            task.name, minutes
        ));

        match self.launcher.launch_and_wait(&path, true).await {
            Ok(code) => {
                // Interval tasks re-arm from the last successful dispatch; a
                // failed launch is retried on the next eligible tick.
                self.ledger.mark_at(key, now);
                self.trace.info(&format!(
                    "Task '{}' finished with code {}",
                    task.name, code
                ));
            }
            Err(e) => {
                self.trace
                    .warning(&format!("Task '{}' launch failed: {}", task.name, e));
            }
        }
    }
}
