use wadriver_core::Paths;

use super::{load_engine, print_json};

pub fn run(json: bool) -> anyhow::Result<()> {
    let engine = load_engine()?;
    let status = engine.get_status();
    if json {
        return print_json(&status);
    }

    let paths = Paths::new();
    let config_path = paths.config_file();

    println!("wadriver status");
    println!("===============");
    println!();
    println!(
        "Config:    {} {}",
        config_path.display(),
        if config_path.exists() { "✓" } else { "✗ (defaults)" }
    );
    println!(
        "Enabled:   {}",
        if status.enabled { "✓" } else { "✗ (set engine.enabled or WADRIVER_ENABLED=1)" }
    );
    println!("Profile:   {}", status.session_dir);
    println!(
        "Admin:     {}",
        status.admin_number.as_deref().unwrap_or("(not set)")
    );

    let lock = engine.profile_lock();
    if status.locked {
        let owner = lock
            .owner_pid()
            .map(|pid| format!("pid {}", pid))
            .unwrap_or_else(|| "unknown owner".to_string());
        println!("Lock:      held ({}) at {}", owner, lock.path().display());
    } else {
        println!("Lock:      free");
    }

    let keywords = &engine.config().engine.filter_keywords;
    println!("Keywords:  {}", keywords.join(", "));
    Ok(())
}
