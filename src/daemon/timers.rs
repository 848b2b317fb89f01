use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::lifecycle::SessionManager;

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// Periodic capture of every bound session. Startup reconciliation already
/// captured once, so the first tick lands one interval out.
pub async fn snapshot_loop(
    manager: SessionManager,
    interval: Duration,
    tick_timeout: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match tokio::time::timeout(tick_timeout, manager.capture_all_sessions()).await {
                    Ok(Ok(written)) => {
                        if written > 0 {
                            log_info!("periodic capture wrote {written} snapshots");
                        }
                    }
                    Ok(Err(err)) => log_error!("periodic capture failed: {err:?}"),
                    Err(_) => log_warn!(
                        "periodic capture exceeded {}s, skipping tick",
                        tick_timeout.as_secs()
                    ),
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("snapshot loop shutting down");
                break;
            }
        }
    }
}

/// Adds one tick's worth of seconds to the active session.
pub async fn time_loop(manager: SessionManager, tick: Duration, cancel_token: CancellationToken) {
    let seconds = tick.as_secs().max(1);
    let mut ticker = tokio::time::interval_at(Instant::now() + tick, tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(err) = manager.tick_time(seconds).await {
                    log_error!("time accrual failed: {err:?}");
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("time loop shutting down");
                break;
            }
        }
    }
}
