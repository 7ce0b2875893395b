use tracing_subscriber::{fmt, EnvFilter};

use crate::{errors::Error, Result};

/// Initialize tracing for the bot.
///
/// `RUST_LOG` wins when set; otherwise `level` applies to our crates and
/// everything else stays at `warn`.
pub fn init(service_name: &str, level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(service_name, level)));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .try_init()
        .map_err(|e| Error::Config(format!("cannot install logger: {e}")))
}

fn default_directives(service_name: &str, level: &str) -> String {
    let service = service_name.replace('-', "_");
    format!(
        "warn,{service}={level},tcb_core={level},tcb_form={level},tcb_sqlite={level},tcb_telegram={level}"
    )
}
