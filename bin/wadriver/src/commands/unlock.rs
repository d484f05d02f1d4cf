use std::path::Path;

use super::load_engine;

pub fn run(force: bool) -> anyhow::Result<()> {
    let engine = load_engine()?;
    let lock = engine.profile_lock();

    if !lock.is_locked() {
        println!("No lock file at {}", lock.path().display());
        return Ok(());
    }

    if let Some(pid) = lock.owner_pid() {
        let alive = process_alive(pid).unwrap_or(true);
        if alive && !force {
            anyhow::bail!(
                "Lock is held by pid {} which may still be running; pass --force to remove it anyway",
                pid
            );
        }
    }

    if engine.unlock()? {
        println!("✓ Removed {}", lock.path().display());
    }
    Ok(())
}

/// `None` when liveness cannot be determined on this platform.
fn process_alive(pid: u32) -> Option<bool> {
    if cfg!(target_os = "linux") {
        Some(Path::new(&format!("/proc/{}", pid)).exists())
    } else {
        None
    }
}
