use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn verbosity_level(verbosity_level: u8) -> LevelFilter {
    match verbosity_level {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Install the global subscriber
///
/// `RUST_LOG` takes precedence over the verbosity flag.
pub fn setup_tracing(verbosity: u8, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::default()
            .add_directive(verbosity_level(verbosity).into())
            .add_directive("async_io=warn".parse().expect("valid directive"))
            .add_directive("polling=warn".parse().expect("valid directive"))
    });

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}
