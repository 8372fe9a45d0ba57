//! Periodic per-session traffic counters, enabled by `REMOTE_DEBUG=1`.

use std::collections::HashMap;
use std::time::Duration;

use huddle_engine::EngineHandle;
use tracing::info;

const REPORT_INTERVAL: Duration = Duration::from_secs(2);

/// Log frame/input deltas for every active session on a fixed cadence.
/// Sessions that ended since the last tick simply drop out of the report.
pub async fn report_traffic(engine: EngineHandle) {
    let mut interval = tokio::time::interval(REPORT_INTERVAL);
    let mut last: HashMap<String, (u64, u64)> = HashMap::new();
    loop {
        interval.tick().await;
        let mut seen = HashMap::new();
        for s in engine.traffic_snapshot() {
            let (prev_frames, prev_inputs) = last.get(&s.session_id).copied().unwrap_or((0, 0));
            info!(
                session = %s.session_id,
                host = %s.host_id,
                frames = s.frames_relayed.saturating_sub(prev_frames),
                inputs = s.inputs_relayed.saturating_sub(prev_inputs),
                "session traffic"
            );
            seen.insert(s.session_id, (s.frames_relayed, s.inputs_relayed));
        }
        last = seen;
    }
}
