use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{Datelike, NaiveTime, Weekday as ChronoWeekday};
use regex::Regex;
use serde::Deserialize;
use serde_yaml::Value;

use crate::error::{Error, Result};

/// Annotation key that always excludes a namespace from management, regardless
/// of how `annotation_key` is configured. Not user-configurable.
pub const PRESERVE_ANNOTATION_KEY: &str = "review-reaper-protected";

const CONFIG_SEARCH_DIRS: &[&str] = &["/etc/app", "/app", "."];
const CONFIG_FILE_NAME: &str = "config.yaml";

#[derive(Debug, Clone)]
pub struct Window {
    pub not_before: NaiveTime,
    pub not_after: NaiveTime,
    pub weekdays: HashSet<ChronoWeekday>,
}

impl Window {
    pub fn is_open(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        if !self.weekdays.contains(&now.weekday()) {
            return false;
        }
        let t = now.time();
        t >= self.not_before && t < self.not_after
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub deletion_name_regexp: Regex,
    pub retention: Duration,
    pub deletion_batch_size: usize,
    pub deletion_nap: Duration,
    pub uninstall_releases: bool,
    pub postpone_deletion_if_active: bool,
    pub annotation_key: String,
    pub window: Window,
    pub log_level: String,
    pub dry_run: bool,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawRetention {
    days: i64,
    hours: i64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawWindow {
    not_before: String,
    not_after: String,
    week_days: Vec<String>,
}

impl Default for RawWindow {
    fn default() -> Self {
        Self {
            not_before: "00:00".to_string(),
            not_after: "06:00".to_string(),
            week_days: vec![
                "Mon".into(),
                "Tue".into(),
                "Wed".into(),
                "Thu".into(),
                "Fri".into(),
                "Sat".into(),
                "Sun".into(),
            ],
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawConfig {
    deletion_name_regexp: String,
    retention: RawRetention,
    deletion_batch_size: usize,
    deletion_nap_seconds: u64,
    uninstall_releases: bool,
    postpone_deletion_if_active: bool,
    annotation_key: String,
    deletion_windows: RawWindow,
    log_level: String,
    dry_run: bool,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            deletion_name_regexp: String::new(),
            retention: RawRetention { days: 7, hours: 0 },
            deletion_batch_size: 0,
            deletion_nap_seconds: 0,
            uninstall_releases: false,
            postpone_deletion_if_active: false,
            annotation_key: "delete_after".to_string(),
            deletion_windows: RawWindow::default(),
            log_level: "INFO".to_string(),
            dry_run: false,
        }
    }
}

/// Find `config.yaml` across the fixed search path, in order.
pub fn find_config_file() -> Result<PathBuf> {
    for dir in CONFIG_SEARCH_DIRS {
        let candidate = Path::new(dir).join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    Err(Error::ConfigNotFound(
        CONFIG_SEARCH_DIRS.iter().map(|s| s.to_string()).collect(),
    ))
}

pub fn load() -> Result<Config> {
    let path = find_config_file()?;
    let raw = std::fs::read_to_string(&path).map_err(|source| Error::ConfigRead {
        path: path.display().to_string(),
        source,
    })?;
    load_from_str(&raw)
}

pub fn load_from_str(raw_yaml: &str) -> Result<Config> {
    let value: Value = serde_yaml::from_str(raw_yaml)?;
    let normalized = normalize(value);
    let raw: RawConfig = serde_yaml::from_value(normalized)?;
    build(raw)
}

/// Keys are accepted case-insensitively and as a dotted top-level form
/// (`retention.days: 3`) in addition to nested mappings
/// (`retention: { days: 3 }`). This walks the parsed YAML, lowercasing every
/// mapping key, then un-flattens any key containing a `.` into the
/// corresponding nested mapping before the strongly-typed deserialize runs.
fn normalize(value: Value) -> Value {
    let Value::Mapping(map) = value else {
        return value;
    };
    let mut out = serde_yaml::Mapping::new();
    for (k, v) in map {
        let Value::String(key) = k else { continue };
        let key = key.to_lowercase();
        let v = normalize(v);
        if let Some((head, rest)) = key.split_once('.') {
            insert_dotted(&mut out, head, rest, v);
        } else {
            merge_into(&mut out, &key, v);
        }
    }
    Value::Mapping(out)
}

fn insert_dotted(map: &mut serde_yaml::Mapping, head: &str, rest: &str, value: Value) {
    let entry = map
        .entry(Value::String(head.to_string()))
        .or_insert_with(|| Value::Mapping(serde_yaml::Mapping::new()));
    if !matches!(entry, Value::Mapping(_)) {
        *entry = Value::Mapping(serde_yaml::Mapping::new());
    }
    let Value::Mapping(nested) = entry else {
        unreachable!()
    };
    if let Some((next_head, next_rest)) = rest.split_once('.') {
        insert_dotted(nested, next_head, next_rest, value);
    } else {
        nested.insert(Value::String(rest.to_string()), value);
    }
}

fn merge_into(map: &mut serde_yaml::Mapping, key: &str, value: Value) {
    match (map.get(Value::String(key.to_string())), &value) {
        (Some(Value::Mapping(existing)), Value::Mapping(incoming)) => {
            let mut merged = existing.clone();
            for (k, v) in incoming {
                merged.insert(k.clone(), v.clone());
            }
            map.insert(Value::String(key.to_string()), Value::Mapping(merged));
        }
        _ => {
            map.insert(Value::String(key.to_string()), value);
        }
    }
}

fn parse_weekday(s: &str) -> Result<ChronoWeekday> {
    match s.to_lowercase().as_str() {
        "mon" | "monday" => Ok(ChronoWeekday::Mon),
        "tue" | "tuesday" => Ok(ChronoWeekday::Tue),
        "wed" | "wednesday" => Ok(ChronoWeekday::Wed),
        "thu" | "thursday" => Ok(ChronoWeekday::Thu),
        "fri" | "friday" => Ok(ChronoWeekday::Fri),
        "sat" | "saturday" => Ok(ChronoWeekday::Sat),
        "sun" | "sunday" => Ok(ChronoWeekday::Sun),
        other => Err(Error::Config(format!("unknown weekday: {other}"))),
    }
}

fn parse_hhmm(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .map_err(|_| Error::Config(format!("invalid HH:MM time: {s}")))
}

fn build(raw: RawConfig) -> Result<Config> {
    if raw.deletion_name_regexp.trim().is_empty() {
        return Err(Error::Config(
            "deletion_name_regexp is required".to_string(),
        ));
    }
    let deletion_name_regexp = Regex::new(&raw.deletion_name_regexp)?;

    let retention = Duration::from_secs(
        (raw.retention.days.max(0) as u64) * 86_400 + (raw.retention.hours.max(0) as u64) * 3_600,
    );

    let not_before = parse_hhmm(&raw.deletion_windows.not_before)?;
    let not_after = parse_hhmm(&raw.deletion_windows.not_after)?;
    if not_before >= not_after {
        return Err(Error::Config(format!(
            "deletion_windows: not_before ({not_before}) must be strictly before not_after ({not_after}); crossing-midnight windows are not supported"
        )));
    }
    let weekdays = raw
        .deletion_windows
        .week_days
        .iter()
        .map(|s| parse_weekday(s))
        .collect::<Result<HashSet<_>>>()?;
    if weekdays.is_empty() {
        return Err(Error::Config(
            "deletion_windows.week_days must not be empty".to_string(),
        ));
    }

    Ok(Config {
        deletion_name_regexp,
        retention,
        deletion_batch_size: raw.deletion_batch_size,
        deletion_nap: Duration::from_secs(raw.deletion_nap_seconds),
        uninstall_releases: raw.uninstall_releases,
        postpone_deletion_if_active: raw.postpone_deletion_if_active,
        annotation_key: raw.annotation_key,
        window: Window {
            not_before,
            not_after,
            weekdays,
        },
        log_level: raw.log_level,
        dry_run: raw.dry_run,
    })
}
