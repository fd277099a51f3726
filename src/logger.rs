use chrono::Local;
use fern::Dispatch;
use log::LevelFilter;
use std::fs;
use std::path::PathBuf;

const LOG_FILE: &str = "workshop.log";

/// Where and how loudly the workshop logs.
#[derive(Debug, Clone)]
pub struct LogSettings {
    pub log_dir: PathBuf,

    /// Level for the log file. The console only ever shows warnings and errors
    /// unless `RUST_LOG` asks for more.
    pub level: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        LogSettings { log_dir: PathBuf::from(".workshop_logs"), level: "info".to_string() }
    }
}

fn parse_level(level: &str, fallback: LevelFilter) -> LevelFilter {
    level.parse::<LevelFilter>().unwrap_or(fallback)
}

/// Initializes the global logger.
///
/// Call once at the start of `main`. `RUST_LOG` overrides the configured level for
/// both sinks (`RUST_LOG=debug workshop status`). Problems creating the log
/// directory or file are reported on stderr and never stop the command.
pub fn init(settings: &LogSettings) {
    let env_level = std::env::var("RUST_LOG").ok().map(|l| parse_level(&l, LevelFilter::Info));

    let file_level = env_level.unwrap_or_else(|| parse_level(&settings.level, LevelFilter::Info));
    let console_level = env_level.unwrap_or(LevelFilter::Warn);

    let console_config = Dispatch::new()
        .level(console_level)
        .format(|out, message, record| {
            let colors = fern::colors::ColoredLevelConfig::new()
                .error(fern::colors::Color::Red)
                .warn(fern::colors::Color::Yellow)
                .info(fern::colors::Color::Green)
                .debug(fern::colors::Color::Blue)
                .trace(fern::colors::Color::BrightBlack);

            out.finish(format_args!(
                "[{} {} {}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                colors.color(record.level()),
                record.target(),
                message
            ))
        })
        .chain(std::io::stderr());

    let mut base_config = Dispatch::new().level(file_level.max(console_level)).chain(console_config);

    let log_file_path = settings.log_dir.join(LOG_FILE);
    match fs::create_dir_all(&settings.log_dir).and_then(|_| fern::log_file(&log_file_path)) {
        Ok(file) => {
            let file_config = Dispatch::new()
                .level(file_level)
                .format(|out, message, record| {
                    out.finish(format_args!("[{} {} {}] {}", Local::now().format("%Y-%m-%d %H:%M:%S"), record.level(), record.target(), message))
                })
                .chain(file);
            base_config = base_config.chain(file_config);
        }
        Err(e) => {
            eprintln!("Failed to open log file '{}': {}", log_file_path.display(), e);
        }
    }

    base_config.apply().unwrap_or_else(|e| {
        eprintln!("Failed to apply logger configuration: {}", e);
    });

    log::debug!("Logger initialized. Logging to console and '{}'.", log_file_path.display());
}
