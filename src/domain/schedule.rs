use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::{Duration, NaiveTime, Timelike};
use serde_yaml::Value;

use crate::config::LowImpactWindow;
use crate::error::Error;
use crate::loader::descriptor::{DescriptorRead, read_section, scalar_text};

/// Start time of a job, `HH:MM` within `[00:00, 24:00)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeOfDay(NaiveTime);

impl TimeOfDay {
    pub fn from_hm(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(TimeOfDay)
    }

    pub fn hour(&self) -> u32 {
        self.0.hour()
    }

    pub fn minutes_since_midnight(&self) -> u32 {
        self.0.hour() * 60 + self.0.minute()
    }
}

impl FromStr for TimeOfDay {
    type Err = Error;

    /// Accepts `H:MM` and `HH:MM`; a bare hour means minute 0.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidTime(s.to_string());
        let mut parts = s.trim().splitn(2, ':');

        let hour = parts.next().and_then(|h| h.trim().parse::<u32>().ok()).ok_or_else(invalid)?;
        let minute = match parts.next() {
            Some(m) => m.trim().parse::<u32>().map_err(|_| invalid())?,
            None => 0,
        };

        TimeOfDay::from_hm(hour, minute).ok_or_else(invalid)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

/// Job length: fractional hours plus extra minutes, both non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct JobDuration {
    pub hours: f64,
    pub minutes: f64,
}

impl JobDuration {
    pub fn new(hours: f64, minutes: f64) -> Option<Self> {
        if hours.is_finite() && minutes.is_finite() && hours >= 0.0 && minutes >= 0.0 { Some(JobDuration { hours, minutes }) } else { None }
    }

    pub fn from_hours(hours: f64) -> Self {
        JobDuration { hours: hours.max(0.0), minutes: 0.0 }
    }

    pub fn total_minutes(&self) -> f64 {
        self.hours * 60.0 + self.minutes
    }

    pub fn total_hours(&self) -> f64 {
        self.total_minutes() / 60.0
    }
}

impl fmt::Display for JobDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.total_minutes();
        if total % 60.0 == 0.0 { write!(f, "{}h", total / 60.0) } else { write!(f, "{}h {}m", (total / 60.0).floor(), total % 60.0) }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledJob {
    pub name: String,
    pub start_time: TimeOfDay,
    pub duration: JobDuration,
}

impl ScheduledJob {
    pub fn new(name: impl Into<String>, start_time: TimeOfDay, duration: JobDuration) -> Self {
        ScheduledJob { name: name.into(), start_time, duration }
    }

    pub fn start_minutes(&self) -> f64 {
        self.start_time.minutes_since_midnight() as f64
    }

    /// End in minutes since midnight of the start day. Not wrapped at 24:00.
    pub fn end_minutes(&self) -> f64 {
        self.start_minutes() + self.duration.total_minutes()
    }

    /// End as a wall-clock time, wrapped past midnight.
    pub fn end_time(&self) -> TimeOfDay {
        let length = Duration::minutes(self.duration.total_minutes().floor() as i64);
        TimeOfDay(self.start_time.0.overflowing_add_signed(length).0)
    }

    /// Half-open overlap: a job ending exactly when another starts does not overlap it.
    /// A zero-length job is an empty interval and overlaps nothing.
    pub fn overlaps(&self, other: &ScheduledJob) -> bool {
        if self.duration.total_minutes() <= 0.0 || other.duration.total_minutes() <= 0.0 {
            return false;
        }
        self.start_minutes() < other.end_minutes() && other.start_minutes() < self.end_minutes()
    }

    fn from_node(node: &Value) -> Result<Self, String> {
        let name = node.get("name").and_then(scalar_text).map(|n| n.trim().to_string()).filter(|n| !n.is_empty()).ok_or("missing 'name'")?;
        let name = name.as_str();

        let start_raw = node.get("start_time").and_then(scalar_text).ok_or_else(|| format!("job '{}' has no 'start_time'", name))?;
        let start_time = start_raw.parse::<TimeOfDay>().map_err(|e| format!("job '{}': {}", name, e))?;

        let number = |key: &str| -> Result<f64, String> {
            match node.get(key) {
                None | Some(Value::Null) => Ok(0.0),
                Some(Value::Number(n)) => n.as_f64().ok_or_else(|| format!("job '{}': '{}' is out of range", name, key)),
                Some(Value::String(raw)) if raw.trim().is_empty() => Ok(0.0),
                Some(Value::String(raw)) => raw.trim().parse::<f64>().map_err(|_| format!("job '{}': '{}' is not a number ({})", name, key, raw)),
                Some(_) => Err(format!("job '{}': '{}' is not a number", name, key)),
            }
        };
        let duration = JobDuration::new(number("duration_hours")?, number("duration_minutes")?).ok_or_else(|| format!("job '{}' has a negative duration", name))?;

        Ok(ScheduledJob::new(name, start_time, duration))
    }
}

/// Unordered pair of job names whose windows overlap, kept in input order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConflictPair {
    pub first: String,
    pub second: String,
}

impl ConflictPair {
    pub fn involves(&self, name: &str) -> bool {
        self.first == name || self.second == name
    }

    /// The pair with names sorted, for order-independent comparison.
    pub fn normalized(&self) -> (String, String) {
        if self.first <= self.second { (self.first.clone(), self.second.clone()) } else { (self.second.clone(), self.first.clone()) }
    }
}

impl fmt::Display for ConflictPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <-> {}", self.first, self.second)
    }
}

/// Every overlapping pair `(jobs[i], jobs[j])` with `i < j`, ordered by `i` then `j`.
pub fn find_conflicts(jobs: &[ScheduledJob]) -> Vec<ConflictPair> {
    let mut conflicts = Vec::new();

    for (i, job1) in jobs.iter().enumerate() {
        for job2 in &jobs[i + 1..] {
            if job1.overlaps(job2) {
                conflicts.push(ConflictPair { first: job1.name.clone(), second: job2.name.clone() });
            }
        }
    }

    conflicts
}

/// Jobs whose start hour is outside `window`.
pub fn jobs_outside_window<'a>(jobs: &'a [ScheduledJob], window: &LowImpactWindow) -> Vec<&'a ScheduledJob> {
    jobs.iter().filter(|job| !window.contains(job.start_time.hour())).collect()
}

/// Reads the top-level `jobs` list of a schedule descriptor. Fresh from disk on every call.
pub fn read_schedule_jobs(path: &Path) -> DescriptorRead<ScheduledJob> {
    read_section(path, "jobs", ScheduledJob::from_node)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(name: &str, start: &str, hours: f64) -> ScheduledJob {
        ScheduledJob::new(name, start.parse().unwrap(), JobDuration::from_hours(hours))
    }

    #[test]
    fn test_time_of_day_parsing() {
        assert_eq!("2:05".parse::<TimeOfDay>().unwrap().minutes_since_midnight(), 125);
        assert_eq!("18:00".parse::<TimeOfDay>().unwrap().to_string(), "18:00");
        assert_eq!("7".parse::<TimeOfDay>().unwrap().hour(), 7);
        assert!("24:00".parse::<TimeOfDay>().is_err());
        assert!("12:60".parse::<TimeOfDay>().is_err());
        assert!("noon".parse::<TimeOfDay>().is_err());
    }

    #[test]
    fn test_fractional_overlap() {
        let conflicts = find_conflicts(&[job("a", "02:00", 1.5), job("b", "03:00", 1.0)]);
        assert_eq!(conflicts, vec![ConflictPair { first: "a".to_string(), second: "b".to_string() }]);
    }

    #[test]
    fn test_touching_jobs_do_not_overlap() {
        assert!(find_conflicts(&[job("a", "02:00", 1.0), job("b", "03:00", 1.0)]).is_empty());
    }

    #[test]
    fn test_extra_minutes_are_added() {
        let a = ScheduledJob::new("a", "02:00".parse().unwrap(), JobDuration::new(1.0, 1.0).unwrap());
        let b = job("b", "03:00", 1.0);
        assert!(a.overlaps(&b));
        assert_eq!(a.end_time().to_string(), "03:01");
    }

    #[test]
    fn test_zero_duration_touches_nothing() {
        let jobs = [job("zero", "03:00", 0.0), job("wide", "02:00", 4.0), job("zero2", "03:00", 0.0)];
        assert!(find_conflicts(&jobs).is_empty());
    }

    #[test]
    fn test_empty_and_single() {
        assert!(find_conflicts(&[]).is_empty());
        assert!(find_conflicts(&[job("only", "18:00", 2.0)]).is_empty());
    }

    #[test]
    fn test_end_time_wraps_midnight() {
        assert_eq!(job("late", "23:00", 2.5).end_time().to_string(), "01:30");
        assert_eq!(job("day", "06:00", 24.0).end_time().to_string(), "06:00");
    }

    #[test]
    fn test_job_entry_conversion() {
        let doc: Value = serde_yaml::from_str("name: batch-1\nstart_time: \"02:00\"  # moved\nduration_hours: 0.75\nduration_minutes: \"5\"\n").unwrap();
        let parsed = ScheduledJob::from_node(&doc).unwrap();
        assert_eq!(parsed.start_time.to_string(), "02:00");
        assert_eq!(parsed.duration.total_minutes(), 50.0);

        let bad: Value = serde_yaml::from_str("name: batch-2\nstart_time: \"02:00\"\nduration_hours: [1]\n").unwrap();
        assert!(ScheduledJob::from_node(&bad).is_err());
    }

    #[test]
    fn test_outside_window() {
        let jobs = [job("a", "02:00", 1.0), job("b", "06:00", 1.0), job("c", "05:59", 1.0)];
        let outside: Vec<&str> = jobs_outside_window(&jobs, &LowImpactWindow::default()).iter().map(|j| j.name.as_str()).collect();
        assert_eq!(outside, vec!["b"]);
    }
}
