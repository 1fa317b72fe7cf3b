use std::io;
use std::sync::Once;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Environment variable that, when set, enables log output in tests.
const ENABLE_TEST_LOGS_ENV_NAME: &str = "ENABLE_TEST_LOGS";

/// Environment variable that selects the log output format.
const LOG_FORMAT_ENV_NAME: &str = "LOG_FORMAT";

/// Environment variable pointing to a directory for rolling log files.
const LOG_DIR_ENV_NAME: &str = "LOG_DIR";

static INIT_TEST_TRACING: Once = Once::new();

/// Log line format written by [`init_tracing`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn from_env() -> Self {
        match std::env::var(LOG_FORMAT_ENV_NAME) {
            Ok(value) if value.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Keeps the non-blocking file writer alive.
///
/// Log lines still buffered when the guard is dropped are flushed; drop it only at
/// process exit.
#[must_use]
pub struct LogFlusher {
    _guard: Option<WorkerGuard>,
}

/// Installs the global tracing subscriber for an application.
///
/// The filter comes from `RUST_LOG` and falls back to `{app_name}=info,bulk=info`. When
/// `LOG_DIR` is set, logs are additionally written to a daily rolling file named after
/// the application. `log` records emitted by dependencies are bridged into tracing.
pub fn init_tracing(app_name: &str) -> Result<LogFlusher, tracing_subscriber::util::TryInitError> {
    let _ = tracing_log::LogTracer::init();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("{app_name}=info,bulk=info").into());

    let (file_writer, guard) = match std::env::var(LOG_DIR_ENV_NAME) {
        Ok(dir) => {
            let appender = rolling::daily(dir, format!("{app_name}.log"));
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        Err(_) => (None, None),
    };

    match LogFormat::from_env() {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(io::stdout))
            .with(file_writer.map(|writer| fmt::layer().json().with_writer(writer)))
            .try_init()?,
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(io::stdout))
            .with(file_writer.map(|writer| fmt::layer().json().with_writer(writer)))
            .try_init()?,
    }

    Ok(LogFlusher { _guard: guard })
}

/// Installs a test-friendly subscriber once per process.
///
/// Output is only produced when `ENABLE_TEST_LOGS` is set, so regular test runs stay quiet.
pub fn init_test_tracing() {
    INIT_TEST_TRACING.call_once(|| {
        if std::env::var(ENABLE_TEST_LOGS_ENV_NAME).is_err() {
            return;
        }

        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "bulk=debug".into());

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_test_writer())
            .try_init();
    });
}
