pub mod analyzer;
pub mod backup;
pub mod carbon;
pub mod deployment;
pub mod metrics;
pub mod progression;
pub mod schedule;
