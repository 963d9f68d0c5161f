//! Console plus per-session file logging on top of `env_logger`

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use env_logger::{Builder, Env, Target};

const LOGGER_NAME: &str = "gridbot";

/// Writes every record to stderr and the session log file
struct TeeWriter {
    file: File,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}

/// Path of a new session log: `<log_dir>/gridbot_YYYYmmdd_HHMMSS.log`
pub fn session_log_path(log_dir: &Path) -> PathBuf {
    log_dir.join(format!(
        "{}_{}.log",
        LOGGER_NAME,
        Local::now().format("%Y%m%d_%H%M%S")
    ))
}

/// Install the global logger and return the session log path.
///
/// `RUST_LOG` overrides `level` when set.
pub fn init_logging(level: &str, log_dir: impl AsRef<Path>) -> io::Result<PathBuf> {
    let log_dir = log_dir.as_ref();
    fs::create_dir_all(log_dir)?;
    let path = session_log_path(log_dir);
    let file = File::create(&path)?;

    Builder::from_env(Env::default().default_filter_or(level))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} - {} - {} - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
                LOGGER_NAME,
                record.level(),
                record.args()
            )
        })
        .target(Target::Pipe(Box::new(TeeWriter { file })))
        .try_init()
        .map_err(io::Error::other)?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_log_path() {
        let path = session_log_path(Path::new("logs"));
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(path.starts_with("logs"));
        assert!(name.starts_with("gridbot_"));
        assert!(name.ends_with(".log"));
        // gridbot_ + YYYYmmdd_HHMMSS + .log
        assert_eq!(name.len(), 8 + 15 + 4);
    }

    #[test]
    fn test_tee_writes_to_file() {
        let dir = std::env::temp_dir().join(format!("gridbot-log-test-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("tee.log");

        let mut tee = TeeWriter {
            file: File::create(&path).unwrap(),
        };
        tee.write_all(b"hello\n").unwrap();
        tee.flush().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "hello\n");
        fs::remove_dir_all(&dir).unwrap();
    }
}
