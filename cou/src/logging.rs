//! Logging setup: a quiet console, a chatty per-invocation log file.
//!
//! Every invocation writes `${COU_DATA}/log/cou-YYYYMMDDhhmmss.log` at DEBUG
//! level regardless of the console verbosity, so a failed overnight upgrade
//! can always be reconstructed.

use camino::Utf8PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::errors::CouResult;

/// The tool's data directory: `$COU_DATA`, or the standard per-user path.
pub fn data_dir() -> Utf8PathBuf {
    if let Ok(dir) = std::env::var("COU_DATA") {
        if !dir.is_empty() {
            return Utf8PathBuf::from(dir);
        }
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_owned());
    Utf8PathBuf::from(home).join(".local").join("share").join("cou")
}

/// Install the global subscriber. The returned guard must live until the
/// process exits or the tail of the log file is lost.
pub fn init(verbose: u8, quiet: bool) -> CouResult<WorkerGuard> {
    let log_dir = data_dir().join("log");
    std::fs::create_dir_all(&log_dir)?;
    let file_name = format!("cou-{}.log", chrono::Local::now().format("%Y%m%d%H%M%S"));
    let file = std::fs::File::create(log_dir.join(file_name).as_std_path())?;
    let (writer, guard) = tracing_appender::non_blocking(file);

    let console_level = if quiet {
        LevelFilter::ERROR
    } else {
        match verbose {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    };

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false)
        .with_filter(LevelFilter::DEBUG);
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .with_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(console_level.to_string())),
        );

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .init();
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_dir_honours_cou_data() {
        let dir = temp_dir::TempDir::new().unwrap();
        let path = dir.path().to_str().unwrap().to_owned();
        std::env::set_var("COU_DATA", &path);
        assert_eq!(data_dir(), Utf8PathBuf::from(&path));
        std::env::remove_var("COU_DATA");
        assert!(data_dir().as_str().ends_with("cou"));
    }
}
