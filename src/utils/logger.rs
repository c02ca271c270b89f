use chrono::Utc;
use log::info;
use std::io::Write;

/// Process-wide logger setup.
pub struct LaceUpLogger;

impl LaceUpLogger {
    /// Initialises env_logger with `[time] [level] [file:line] message` lines.
    /// `RUST_LOG` wins over `level` when both are set.
    pub fn init(level: &str) {
        let env = env_logger::Env::default().default_filter_or(level.to_string());
        let result = env_logger::Builder::from_env(env)
            .format(|buf, record| {
                writeln!(
                    buf,
                    "[{}] [{}] [{}:{}] {}",
                    Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
                    record.level(),
                    record.file().unwrap_or("unknown"),
                    record.line().unwrap_or(0),
                    record.args()
                )
            })
            .try_init();

        // A second init (tests, embedding binaries) keeps the first logger.
        if result.is_ok() {
            info!("LaceUp logger initialized");
        }
    }
}
