pub mod check;
pub mod login;
pub mod send;
pub mod status;
pub mod unlock;
pub mod watch;

use serde::Serialize;
use wadriver_core::{Config, OperationResult, Paths};
use wadriver_engine::Engine;

pub(crate) fn load_engine() -> anyhow::Result<Engine> {
    let paths = Paths::new();
    let config = Config::load_or_default(&paths)?;
    Ok(Engine::new(config, paths))
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Exit non-zero when the operation failed.
pub(crate) fn ensure_success<T>(result: &OperationResult<T>) -> anyhow::Result<()> {
    if result.success {
        return Ok(());
    }
    let kind = result
        .error_kind
        .and_then(|k| serde_json::to_value(k).ok())
        .and_then(|v| v.as_str().map(|s| s.to_string()))
        .unwrap_or_else(|| "error".to_string());
    anyhow::bail!(
        "{}: {}",
        kind,
        result.error.as_deref().unwrap_or("operation failed")
    )
}
