// The remote schedule document: wire types and per-task schedule validation.
//
// Wire names follow the fleet's legacy document format (`versao`, `arquivos`,
// `executar`, ...). The document is replaced wholesale on every successful
// fetch; a tick either sees the previous document or the new one.

use bkpmon_common::tracing::Tracing;

use chrono::NaiveTime;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::{DeserializeOwned, Deserializer};
use serde::Deserialize;

static TIME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d{1,2}):(\d{2})\s*$").unwrap());

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// The remote schedule document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleConfig {
    /// The remote software version (dot-separated numeric components).
    #[serde(rename = "versao", default)]
    pub version: String,

    /// Forces the update flow to run even when the versions match.
    #[serde(default)]
    pub download: bool,

    /// Files kept in sync by the update flow.
    #[serde(rename = "arquivos", default, deserialize_with = "lenient_list")]
    pub files: Vec<FileSpec>,

    /// Tasks evaluated by the scheduler, in document order.
    #[serde(rename = "executar", default, deserialize_with = "lenient_list")]
    pub tasks: Vec<TaskSpec>,
}

impl ScheduleConfig {
    /// Parse a raw document. Malformed `arquivos`/`executar` entries are
    /// skipped individually; only a structurally broken document fails.
    pub fn parse(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

/// A file kept in sync on this terminal.
#[derive(Debug, Clone, Deserialize)]
pub struct FileSpec {
    /// The file name, also the default destination name.
    #[serde(rename = "nome")]
    pub name: String,

    /// The download URL.
    pub url: String,

    /// Destination override: absolute file, absolute directory, or a
    /// directory relative to the installation root.
    #[serde(rename = "destino", default)]
    pub destination: Option<String>,
}

/// A scheduled task.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskSpec {
    /// The executable name; also the unique ledger key component.
    #[serde(rename = "nome")]
    pub name: String,

    /// Inactive tasks are skipped without evaluation.
    #[serde(rename = "ativo", default = "default_active")]
    pub active: bool,

    /// Time-of-day schedule: a single `"HH:MM"` or a list of them.
    #[serde(rename = "horario", default)]
    pub times: Option<StringOrList>,

    /// Interval schedule, in minutes.
    #[serde(rename = "intervalo", default)]
    pub interval_minutes: Option<i64>,

    /// Throttles time-of-day recurrence to once every N days.
    #[serde(rename = "intervalo_dias", default)]
    pub repeat_every_days: Option<i64>,

    /// Day-of-month filter; empty means every day.
    #[serde(rename = "dia", default)]
    pub days: Vec<u32>,

    /// Month filter; empty means every month.
    #[serde(rename = "mes", default)]
    pub months: Vec<u32>,

    /// Host-role allow-list; empty means all roles.
    #[serde(rename = "terminal", default)]
    pub allowed_roles: Vec<String>,

    /// Executable location override (same resolution rules as `destino`).
    #[serde(rename = "local", default)]
    pub location: Option<String>,
}

fn default_active() -> bool {
    true
}

/// A field that accepts either a single string or a list of strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StringOrList {
    One(String),
    Many(Vec<String>),
}

impl StringOrList {
    /// View the value as a slice of strings.
    pub fn as_slice(&self) -> &[String] {
        match self {
            StringOrList::One(s) => std::slice::from_ref(s),
            StringOrList::Many(v) => v.as_slice(),
        }
    }
}

/// Deserialize a list, skipping entries that fail to deserialize instead of
/// rejecting the whole document.
fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw: Vec<serde_json::Value> = Vec::deserialize(deserializer)?;
    let mut out = Vec::with_capacity(raw.len());
    for (index, value) in raw.into_iter().enumerate() {
        match serde_json::from_value::<T>(value) {
            Ok(entry) => out.push(entry),
            Err(e) => {
                tracing::warn!("Skipping malformed config entry #{}: {}", index, e);
            }
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Validated schedule
// ---------------------------------------------------------------------------

/// A single validated time-of-day target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTime {
    /// The normalized `HH:MM` label used in ledger keys and diagnostics.
    pub label: String,
    pub time: NaiveTime,
}

/// The validated scheduling mode of a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskSchedule {
    /// Fire at fixed times of day, within a tolerance window.
    Daily {
        times: Vec<ScheduledTime>,
        /// When set, recurrence is throttled to once every N days.
        repeat_every_days: Option<i64>,
    },
    /// Fire every N minutes.
    Interval { minutes: i64 },
}

impl TaskSpec {
    /// Validate this task's scheduling mode.
    ///
    /// When both `horario` and `intervalo` are present, `horario` takes
    /// precedence and `intervalo` is ignored. A task with no usable schedule
    /// returns `None` and is skipped by the scheduler.
    pub fn schedule(&self, trace: &Tracing) -> Option<TaskSchedule> {
        if let Some(ref raw_times) = self.times {
            if self.interval_minutes.is_some() {
                trace.warning(&format!(
                    "Task '{}' declares both 'horario' and 'intervalo'; using 'horario'",
                    self.name
                ));
            }

            let mut times = Vec::new();
            for raw in raw_times.as_slice() {
                match parse_time(raw) {
                    Some(time) => times.push(ScheduledTime {
                        label: time.format("%H:%M").to_string(),
                        time,
                    }),
                    None => trace.warning(&format!(
                        "Task '{}' has an invalid time entry '{}'; skipping it",
                        self.name, raw
                    )),
                }
            }

            if times.is_empty() {
                trace.warning(&format!(
                    "Task '{}' has no valid time entries; skipping task",
                    self.name
                ));
                return None;
            }

            return Some(TaskSchedule::Daily {
                times,
                repeat_every_days: self.repeat_every_days,
            });
        }

        match self.interval_minutes {
            Some(minutes) if minutes > 0 => Some(TaskSchedule::Interval { minutes }),
            Some(minutes) => {
                trace.warning(&format!(
                    "Task '{}' has a non-positive interval ({}); skipping task",
                    self.name, minutes
                ));
                None
            }
            None => {
                trace.warning(&format!(
                    "Task '{}' declares neither 'horario' nor 'intervalo'; skipping task",
                    self.name
                ));
                None
            }
        }
    }
}

/// Parse a `"HH:MM"` string. Hours may be a single digit; out-of-range
/// components are rejected.
pub fn parse_time(raw: &str) -> Option<NaiveTime> {
    let captures = TIME_PATTERN.captures(raw)?;
    let hour: u32 = captures[1].parse().ok()?;
    let minute: u32 = captures[2].parse().ok()?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}
