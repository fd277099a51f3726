use serde::{Deserialize, Serialize};

/// On-disk shape of `workshop.json`. Every field is optional; missing ones keep
/// their built-in defaults.
#[derive(Debug, Deserialize, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigDto {
    pub deployment_file: Option<String>,
    pub schedule_file: Option<String>,
    pub artifact_file: Option<String>,
    pub snapshot_dir: Option<String>,
    pub removable_service: Option<String>,
    pub performance_service: Option<String>,
    pub low_impact_window: Option<WindowDto>,
    pub markers: Option<MarkersDto>,
    pub logging: Option<LoggingDto>,
}

#[derive(Debug, Deserialize, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowDto {
    pub start_hour: u32,
    pub end_hour: u32,
}

#[derive(Debug, Deserialize, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkersDto {
    pub inefficient: Option<Vec<String>>,
    pub efficient: Option<Vec<String>>,
    pub comment_prefixes: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingDto {
    pub level: Option<String>,
    pub dir: Option<String>,
}
