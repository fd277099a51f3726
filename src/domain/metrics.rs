use std::fmt;
use std::str::FromStr;

use chrono::{Days, Local, NaiveDate};
use rand::Rng;

use crate::error::Error;

/// Point-in-time readings for one service.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServiceMetrics {
    pub cpu_percent: f64,
    pub p50_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
    pub queue_depth: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeframe {
    Days30,
    Days90,
    Days180,
}

impl Timeframe {
    pub fn days(&self) -> u64 {
        match self {
            Timeframe::Days30 => 30,
            Timeframe::Days90 => 90,
            Timeframe::Days180 => 180,
        }
    }
}

impl FromStr for Timeframe {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "30_days" | "30" => Ok(Timeframe::Days30),
            "90_days" | "90" => Ok(Timeframe::Days90),
            "180_days" | "180" => Ok(Timeframe::Days180),
            other => Err(Error::UnknownTimeframe(other.to_string())),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_days", self.days())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailyUsage {
    pub date: NaiveDate,
    pub requests: u64,
    pub cpu_avg: f64,
    pub memory_avg: f64,
}

/// Daily usage of one service, most recent day first.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceHistory {
    pub service_name: String,
    pub timeframe: Timeframe,
    pub days: Vec<DailyUsage>,
}

impl ServiceHistory {
    pub fn total_requests(&self) -> u64 {
        self.days.iter().map(|d| d.requests).sum()
    }

    pub fn daily_average_requests(&self) -> f64 {
        if self.days.is_empty() { 0.0 } else { self.total_requests() as f64 / self.days.len() as f64 }
    }

    /// `(cpu, memory)` averaged over the most recent `window` days. `None` with fewer days on record.
    pub fn recent_average(&self, window: usize) -> Option<(f64, f64)> {
        if window == 0 || self.days.len() < window {
            return None;
        }
        let recent = &self.days[..window];
        let n = window as f64;
        Some((recent.iter().map(|d| d.cpu_avg).sum::<f64>() / n, recent.iter().map(|d| d.memory_avg).sum::<f64>() / n))
    }

    /// Mean CPU share over the whole timeframe.
    pub fn average_cpu(&self) -> f64 {
        self.recent_average(self.days.len()).map(|(cpu, _)| cpu).unwrap_or(0.0)
    }
}

pub trait MetricsProvider {
    fn metrics_for(&self, service_name: &str) -> ServiceMetrics;

    fn history_for(&self, service_name: &str, timeframe: Timeframe) -> ServiceHistory;
}

/// Random but bounded readings that tell the workshop story: the removable service idles
/// and the performance service is slow until the artifact is optimized.
#[derive(Debug, Clone)]
pub struct MockMetricsProvider {
    removable_service: String,
    performance_service: String,
    artifact_optimized: bool,
}

impl MockMetricsProvider {
    pub fn new(removable_service: impl Into<String>, performance_service: impl Into<String>, artifact_optimized: bool) -> Self {
        MockMetricsProvider { removable_service: removable_service.into(), performance_service: performance_service.into(), artifact_optimized }
    }
}

fn with_tail(rng: &mut impl Rng, cpu_percent: f64, p95_latency_ms: f64, queue_depth: u32) -> ServiceMetrics {
    ServiceMetrics {
        cpu_percent,
        p50_latency_ms: p95_latency_ms * rng.random_range(0.35..0.6),
        p95_latency_ms,
        p99_latency_ms: p95_latency_ms * rng.random_range(1.1..1.5),
        queue_depth,
    }
}

impl MetricsProvider for MockMetricsProvider {
    fn metrics_for(&self, service_name: &str) -> ServiceMetrics {
        let mut rng = rand::rng();

        if service_name == self.removable_service {
            let (cpu, p95) = (rng.random_range(0.5..2.5), rng.random_range(20.0..60.0));
            return with_tail(&mut rng, cpu, p95, 0);
        }

        if service_name == self.performance_service {
            return if self.artifact_optimized {
                let (cpu, p95, queue) = (rng.random_range(30.0..50.0), rng.random_range(80.0..120.0), rng.random_range(0..5));
                with_tail(&mut rng, cpu, p95, queue)
            } else {
                let (cpu, p95, queue) = (rng.random_range(85.0..99.0), rng.random_range(18_000.0..22_000.0), rng.random_range(200..500));
                with_tail(&mut rng, cpu, p95, queue)
            };
        }

        let (cpu, p95, queue) = (rng.random_range(30.0..70.0), rng.random_range(20.0..200.0), rng.random_range(0..20));
        with_tail(&mut rng, cpu, p95, queue)
    }

    fn history_for(&self, service_name: &str, timeframe: Timeframe) -> ServiceHistory {
        let mut rng = rand::rng();
        let today = Local::now().date_naive();
        let idle = service_name == self.removable_service;

        let days = (0..timeframe.days())
            .map(|offset| {
                let date = today.checked_sub_days(Days::new(offset)).unwrap_or(today);
                if idle {
                    DailyUsage { date, requests: 0, cpu_avg: rng.random_range(0.5..2.0), memory_avg: rng.random_range(1.0..5.0) }
                } else {
                    DailyUsage { date, requests: rng.random_range(100_000..500_000), cpu_avg: rng.random_range(30.0..70.0), memory_avg: rng.random_range(40.0..70.0) }
                }
            })
            .collect();

        ServiceHistory { service_name: service_name.to_string(), timeframe, days }
    }
}
