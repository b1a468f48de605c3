use once_cell::sync::OnceCell;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

static LOGGER_INIT: OnceCell<()> = OnceCell::new();

/// Install the global tracing subscriber.
///
/// `RUST_LOG` drives filtering (default `info`). With `json` set, events are
/// emitted as one JSON object per line for log shippers; otherwise the pretty
/// formatter is used. Calling this more than once is a no-op.
pub fn init_logger(service_name: &'static str, json: bool) {
    LOGGER_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let base = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(true)
            .with_file(true)
            // Includes timing when the span closes
            .with_span_events(fmt::format::FmtSpan::CLOSE);

        if json {
            tracing_subscriber::registry()
                .with(filter)
                .with(base.json())
                .init();
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(base.pretty())
                .init();
        }

        tracing::info!(service = service_name, json, "logger initialized");
    });
}
