use super::{ensure_success, load_engine, print_json};

pub async fn run(target: &str, message: &str, json: bool) -> anyhow::Result<()> {
    let engine = load_engine()?;
    let result = engine.send_message(target, message).await;
    if json {
        print_json(&result)?;
        return ensure_success(&result);
    }
    ensure_success(&result)?;
    println!("✓ Sent to {}", target.trim());
    Ok(())
}

pub async fn alert(message: &str) -> anyhow::Result<()> {
    let engine = load_engine()?;
    let result = engine.send_alert(message).await;
    ensure_success(&result)?;
    println!(
        "✓ Alert sent to {}",
        engine.config().admin_number().unwrap_or_default()
    );
    Ok(())
}
