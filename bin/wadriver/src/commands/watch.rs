use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use wadriver_engine::Engine;

use super::load_engine;

pub async fn run(interval: Option<u64>) -> anyhow::Result<()> {
    let engine = load_engine()?;
    let config = engine.config();
    let secs = interval.unwrap_or(config.engine.check_interval_secs).max(1);
    let keywords = config.engine.filter_keywords.clone();
    let limit = config.scan.default_limit;

    info!(interval_secs = secs, keywords = ?keywords, "Watching chats");

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };
    let (engine, keywords) = (&engine, keywords.as_slice());
    watch_loop(Duration::from_secs(secs), shutdown, move || {
        check_once(engine, keywords, limit, secs)
    })
    .await;
    info!("Stopping watcher");
    Ok(())
}

/// Run `check` every `every` until `shutdown` resolves. A check in flight
/// is dropped when shutdown arrives, which closes its session.
async fn watch_loop<S, F, Fut>(every: Duration, shutdown: S, mut check: F)
where
    S: Future<Output = ()>,
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = &mut shutdown => return,
            _ = ticker.tick() => {}
        }
        tokio::select! {
            _ = &mut shutdown => {
                info!("Interrupted during a check");
                return;
            }
            _ = check() => {}
        }
    }
}

async fn check_once(engine: &Engine, keywords: &[String], limit: usize, secs: u64) {
    let result = engine.check_messages(Some(keywords), true, limit).await;
    if !result.success {
        warn!(
            kind = ?result.error_kind,
            error = result.error.as_deref().unwrap_or(""),
            "Check failed"
        );
        return;
    }
    for chat in &result.payload.messages {
        info!(
            title = %chat.title,
            source = chat.source.as_str(),
            keyword = chat.matched_keyword.as_deref().unwrap_or(""),
            unread = chat.unread_count,
            preview = %chat.last_message_preview,
            "Keyword match"
        );
    }
    let next = chrono::Local::now() + chrono::Duration::seconds(secs as i64);
    info!(
        matches = result.payload.count,
        next_check = %next.format("%H:%M:%S"),
        "Check complete"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_running_check() {
        let (started, finished) = (AtomicUsize::new(0), AtomicUsize::new(0));
        let (started, finished) = (&started, &finished);
        let shutdown = tokio::time::sleep(Duration::from_secs(1));

        let begin = Instant::now();
        watch_loop(Duration::from_secs(60), shutdown, move || async move {
            started.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(600)).await;
            finished.fetch_add(1, Ordering::SeqCst);
        })
        .await;

        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(finished.load(Ordering::SeqCst), 0);
        assert!(begin.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_checks_repeat_on_interval() {
        let counter = AtomicUsize::new(0);
        let runs = &counter;
        let shutdown = tokio::time::sleep(Duration::from_secs(25));

        watch_loop(Duration::from_secs(10), shutdown, move || async move {
            runs.fetch_add(1, Ordering::SeqCst);
        })
        .await;

        // Ticks at 0s, 10s and 20s.
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }
}
