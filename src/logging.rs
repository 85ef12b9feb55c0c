//! Structured logging (§6.1, ambient): `tracing_subscriber::EnvFilter`
//! seeded from `TASKER_LOG_LEVEL`, human-readable lines to stderr when
//! it's a terminal, compact JSON lines otherwise — the teacher's own
//! env-filter + fmt + json layering, generalized to one binary instead
//! of one orchestrator run.

use tracing_subscriber::EnvFilter;

const ENV_VAR: &str = "TASKER_LOG_LEVEL";
const DEFAULT_LEVEL: &str = "info";

pub fn init() {
    let filter = EnvFilter::try_from_env(ENV_VAR).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL));

    if console::Term::stderr().is_term() {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    }
}
