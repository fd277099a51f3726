use std::fmt;

use crate::domain::progression::{Checkpoint, CheckpointState};
use crate::domain::schedule::ScheduledJob;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CarbonLevel {
    Low,
    Medium,
    High,
}

impl CarbonLevel {
    pub fn weight(&self) -> f64 {
        match self {
            CarbonLevel::Low => 1.0,
            CarbonLevel::Medium => 2.0,
            CarbonLevel::High => 3.0,
        }
    }
}

impl fmt::Display for CarbonLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CarbonLevel::Low => write!(f, "LOW"),
            CarbonLevel::Medium => write!(f, "MEDIUM"),
            CarbonLevel::High => write!(f, "HIGH"),
        }
    }
}

/// Grid conditions for one hour of the day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HourlyIntensity {
    pub hour: u32,
    pub level: CarbonLevel,
    pub grams_co2_per_kwh: u32,
    pub renewable_share: f64,
    pub description: &'static str,
}

pub fn intensity_at(hour: u32) -> HourlyIntensity {
    let hour = hour % 24;
    match hour {
        2..=6 => HourlyIntensity { hour, level: CarbonLevel::Low, grams_co2_per_kwh: 120, renewable_share: 0.65, description: "overnight wind, low demand" },
        18..=20 => HourlyIntensity { hour, level: CarbonLevel::High, grams_co2_per_kwh: 420, renewable_share: 0.15, description: "evening peak, gas peakers online" },
        10..=15 => HourlyIntensity { hour, level: CarbonLevel::Medium, grams_co2_per_kwh: 220, renewable_share: 0.45, description: "daytime solar" },
        _ => HourlyIntensity { hour, level: CarbonLevel::Medium, grams_co2_per_kwh: 280, renewable_share: 0.30, description: "mixed generation" },
    }
}

pub fn daily_profile() -> Vec<HourlyIntensity> {
    (0..24).map(intensity_at).collect()
}

/// Weighted job hours, `(score, worst_case)` where the worst case runs every job in a high hour.
pub fn carbon_impact_score(jobs: &[ScheduledJob]) -> (f64, f64) {
    jobs.iter().fold((0.0, 0.0), |(score, worst), job| {
        let hours = job.duration.total_hours();
        (score + hours * intensity_at(job.start_time.hour()).level.weight(), worst + hours * CarbonLevel::High.weight())
    })
}

/// Energy and emissions of the cluster at one point of the workshop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SciRow {
    /// `None` for the baseline.
    pub checkpoint: Option<Checkpoint>,
    pub energy_kwh: f64,
    pub grid_g_per_kwh: f64,
    pub embodied_g: f64,
}

impl SciRow {
    /// Software carbon intensity: operational plus embodied emissions.
    pub fn sci(&self) -> f64 {
        self.energy_kwh * self.grid_g_per_kwh + self.embodied_g
    }
}

const SCI_BASELINE: SciRow = SciRow { checkpoint: None, energy_kwh: 45.5, grid_g_per_kwh: 425.0, embodied_g: 12.5 };

/// Baseline plus one row per completed checkpoint, each applying that checkpoint's saving.
pub fn sci_progression(state: &CheckpointState) -> Vec<SciRow> {
    let mut rows = vec![SCI_BASELINE];
    let mut current = SCI_BASELINE;

    for checkpoint in Checkpoint::ALL.into_iter().take_while(|cp| state.is_complete(*cp)) {
        current = match checkpoint {
            // one machine fewer
            Checkpoint::One => SciRow { energy_kwh: current.energy_kwh - 9.1, embodied_g: current.embodied_g - 2.5, ..current },
            Checkpoint::Two => SciRow { energy_kwh: 33.3, ..current },
            Checkpoint::Three => SciRow { grid_g_per_kwh: 180.0, ..current },
        };
        current.checkpoint = Some(checkpoint);
        rows.push(current);
    }
    rows
}
