//! Tracing setup. Logs go to stderr so stdout carries only events.

use std::io::{self, IsTerminal};

use tailview_core::config::{LogFormat, LoggingConfig};
use tracing_subscriber::{EnvFilter, filter::LevelFilter, fmt};

/// Installs the global subscriber; `RUST_LOG` wins over the configured level.
pub fn initialize_tracing(logging: &LoggingConfig) {
    let builder = fmt::fmt()
        .with_env_filter(build_env_filter(logging))
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(io::stderr);

    if matches!(logging.format, LogFormat::Json) {
        builder.json().with_ansi(false).init();
    } else {
        builder.with_ansi(io::stderr().is_terminal()).init();
    }
}

fn build_env_filter(logging: &LoggingConfig) -> EnvFilter {
    let default_level = logging
        .level
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::INFO);

    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::builder()
            .with_default_directive(default_level.into())
            .from_env_lossy()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tracing::info;
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone)]
    struct BufferMakeWriter {
        buffer: Arc<Mutex<Vec<u8>>>,
    }

    struct BufferWriter {
        buffer: Arc<Mutex<Vec<u8>>>,
    }

    impl<'a> MakeWriter<'a> for BufferMakeWriter {
        type Writer = BufferWriter;

        fn make_writer(&'a self) -> Self::Writer {
            BufferWriter {
                buffer: Arc::clone(&self.buffer),
            }
        }
    }

    impl io::Write for BufferWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.buffer.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn json_format_emits_json_lines() {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let logging = LoggingConfig {
            level: "info".to_string(),
            format: LogFormat::Json,
        };
        let subscriber = fmt::fmt()
            .with_env_filter(build_env_filter(&logging))
            .with_writer(BufferMakeWriter {
                buffer: buffer.clone(),
            })
            .json()
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            info!(event = "json_test", "log entry");
        });

        let contents = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        let line = contents.lines().find(|l| !l.trim().is_empty()).unwrap();
        let value: serde_json::Value = serde_json::from_str(line).unwrap();
        assert_eq!(value["fields"]["message"], "log entry");
        assert_eq!(value["fields"]["event"], "json_test");
    }
}
