use super::{ensure_success, load_engine};

pub async fn run() -> anyhow::Result<()> {
    let engine = load_engine()?;
    if engine.config().browser.headless && !engine.config().auth.print_qr_to_terminal {
        println!(
            "Pairing code will be saved to {}",
            engine.paths().pairing_qr_svg().display()
        );
    }

    let result = engine.authenticate().await;
    ensure_success(&result)?;

    if result.payload.challenges_presented > 0 {
        println!("✓ Paired and logged in. The session is saved in the profile.");
    } else {
        println!("✓ Already logged in.");
    }
    Ok(())
}
