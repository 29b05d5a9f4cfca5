use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub fn filter_directive(debug: bool) -> &'static str {
    if debug {
        "debug"
    } else {
        "info"
    }
}

/// Initialise logging at `info`, or `debug` when enabled in the settings.
/// `RUST_LOG` is honoured only in debug mode. When `log_file` is set every
/// line is also appended to that file.
pub fn init(debug: bool, log_file: Option<PathBuf>) {
    let level = filter_directive(debug);

    // Without debug logging `info` is forced so a stray RUST_LOG in the
    // environment cannot turn on verbose output.
    let filter = if debug {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    } else {
        EnvFilter::new(level)
    };

    let file_layer = log_file.and_then(|path| {
        let file_name = path.file_name()?.to_owned();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let appender = tracing_appender::rolling::never(dir, file_name);
        Some(fmt::layer().with_ansi(false).with_writer(appender))
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init();
}
