use eyre::Result;
use std::{backtrace::Backtrace, panic};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Installs a compact stdout subscriber filtered by `RUST_LOG` (default
/// `info`) and a panic hook that logs the backtrace on a single line.
pub fn initialize_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().compact())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .try_init()?;

    panic::set_hook(Box::new(|panic_info| {
        let message = match panic_info.payload().downcast_ref::<&str>() {
            Some(s) => *s,
            None => match panic_info.payload().downcast_ref::<String>() {
                Some(s) => s.as_str(),
                None => "Unknown panic message",
            },
        };
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "Unknown location".to_string());

        let backtrace = format!("{:?}", Backtrace::capture()).replace('\n', " | ");
        tracing::error!(
            { backtrace = %backtrace, location = %location},
            "Panic occurred with message: {}",
            message
        );
    }));
    Ok(())
}
