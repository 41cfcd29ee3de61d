use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use env_logger::Target;
use log::LevelFilter;
use tracing_appender::rolling::{RollingFileAppender, Rotation};

use crate::config::{LogSettings, LogSink};

/// Number of dated log files kept, the active one included.
pub const LOG_FILES_KEPT: usize = 3;

/// Install the global logger. `debug` raises the level to at least `Debug`.
pub fn init(settings: &LogSettings, debug: bool) -> Result<()> {
    let level = if debug && settings.level < LevelFilter::Debug {
        LevelFilter::Debug
    } else {
        settings.level
    };

    let mut builder = env_logger::Builder::new();
    builder.filter_level(level).format(|buf, record| {
        writeln!(
            buf,
            "[{} {:<5} {}] {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            record.level(),
            record.target(),
            record.args()
        )
    });

    match &settings.sink {
        LogSink::Console => {
            builder.target(Target::Stderr);
        }
        LogSink::File(path) => {
            let appender = file_appender(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            builder.target(Target::Pipe(Box::new(appender)));
        }
    }

    builder.try_init().context("Logger already initialized")?;
    Ok(())
}

/// Daily rolling appender for `path`. `logs/bulkmail.log` becomes
/// `logs/bulkmail.<date>.log`, and only the newest files are kept.
pub fn file_appender(path: &Path) -> Result<RollingFileAppender> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let prefix = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "bulkmail".to_string());

    let mut builder = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .max_log_files(LOG_FILES_KEPT);
    if let Some(ext) = path.extension() {
        builder = builder.filename_suffix(ext.to_string_lossy().into_owned());
    }

    Ok(builder.build(dir)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn log_files(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_file_appender_writes_dated_file() {
        let dir = TempDir::new().unwrap();
        let logs = dir.path().join("logs");

        let mut appender = file_appender(&logs.join("mail.log")).unwrap();
        appender.write_all(b"Email sent to a@x.com\n").unwrap();
        appender.flush().unwrap();

        let files = log_files(&logs);
        assert_eq!(files.len(), 1);
        assert!(files[0].starts_with("mail."));
        assert!(files[0].ends_with(".log"));

        let content = std::fs::read_to_string(logs.join(&files[0])).unwrap();
        assert_eq!(content, "Email sent to a@x.com\n");
    }

    #[test]
    fn test_file_appender_appends_across_opens() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mail.log");

        for line in ["first\n", "second\n"] {
            let mut appender = file_appender(&path).unwrap();
            appender.write_all(line.as_bytes()).unwrap();
            appender.flush().unwrap();
        }

        let files = log_files(dir.path());
        assert_eq!(files.len(), 1);
        let content = std::fs::read_to_string(dir.path().join(&files[0])).unwrap();
        assert_eq!(content, "first\nsecond\n");
    }
}
