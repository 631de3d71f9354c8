//! JSONL frame replay for offline runs
//!
//! One frame per line, same shape as the MQTT payload. Blank lines are
//! skipped; malformed lines are counted and skipped. Unlike the MQTT path,
//! replay awaits channel capacity instead of dropping frames.

use crate::domain::types::DetectionFrame;
use crate::error::{OccupancyError, Result as OccupancyResult};
use crate::infra::metrics::Metrics;
use crate::io::mqtt::parse_frame;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

/// Counts reported when a replay finishes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub frames: u64,
    pub malformed: u64,
}

/// Slowest accepted pacing (one frame every 1000s)
pub const MIN_REPLAY_FPS: f64 = 0.001;
/// Fastest accepted pacing (one frame per millisecond)
pub const MAX_REPLAY_FPS: f64 = 1000.0;

/// Tick period for a replay rate; `None` means unpaced (`fps == 0`)
pub fn replay_period(fps: f64) -> OccupancyResult<Option<Duration>> {
    if fps == 0.0 {
        return Ok(None);
    }
    // NaN fails the range check too
    if !(MIN_REPLAY_FPS..=MAX_REPLAY_FPS).contains(&fps) {
        return Err(OccupancyError::invalid(format!(
            "replay fps must be 0 or between {} and {}, got {}",
            MIN_REPLAY_FPS, MAX_REPLAY_FPS, fps
        )));
    }
    Ok(Some(Duration::from_secs_f64(1.0 / fps)))
}

/// Replay frames from `path` into the ingestion channel
///
/// `fps == 0` sends as fast as the tracker consumes; any other rate must
/// pass `replay_period`. Dropping the sender on return closes the channel
/// once every source is done.
pub async fn replay_file(
    path: impl AsRef<Path>,
    fps: f64,
    frame_tx: mpsc::Sender<DetectionFrame>,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<ReplaySummary, Box<dyn std::error::Error + Send + Sync>> {
    let period = replay_period(fps)?;
    let path = path.as_ref();
    let file = File::open(path).await?;
    let mut lines = BufReader::new(file).lines();

    let mut pacer = period.map(|period| {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });

    info!(file = %path.display(), fps = %fps, "replay_started");

    let mut summary = ReplaySummary::default();
    let mut line_no = 0u64;

    loop {
        let line = tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("replay_shutdown");
                    return Ok(summary);
                }
                continue;
            }
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };
        line_no += 1;

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let frame = match parse_frame(line.as_bytes()) {
            Ok(frame) => frame,
            Err(e) => {
                summary.malformed += 1;
                metrics.record_frame_malformed();
                warn!(line = %line_no, error = %e, "replay_line_malformed");
                continue;
            }
        };

        if let Some(ticker) = pacer.as_mut() {
            ticker.tick().await;
        }

        metrics.record_frame_received();
        if frame_tx.send(frame).await.is_err() {
            warn!("frame_channel_closed");
            break;
        }
        summary.frames += 1;
    }

    info!(frames = %summary.frames, malformed = %summary.malformed, "replay_finished");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_lines(lines: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file.flush().unwrap();
        file
    }

    #[tokio::test]
    async fn test_replay_sends_frames_in_order() {
        let file = write_lines(&[
            r#"{"frame": 1, "detections": [{"track_id": 1, "point": [5, 5], "class": "person"}]}"#,
            "",
            "garbage",
            r#"{"frame": 2, "detections": []}"#,
        ]);
        let (frame_tx, mut frame_rx) = mpsc::channel(8);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let metrics = Arc::new(Metrics::new());

        let summary = replay_file(file.path(), 0.0, frame_tx, metrics.clone(), shutdown_rx)
            .await
            .unwrap();

        assert_eq!(summary, ReplaySummary { frames: 2, malformed: 1 });
        assert_eq!(frame_rx.recv().await.unwrap().frame, Some(1));
        assert_eq!(frame_rx.recv().await.unwrap().frame, Some(2));
        assert!(frame_rx.recv().await.is_none());
        assert_eq!(metrics.frames_malformed(), 1);
    }

    #[tokio::test]
    async fn test_replay_paced() {
        let file = write_lines(&[
            r#"{"detections": []}"#,
            r#"{"detections": []}"#,
            r#"{"detections": []}"#,
        ]);
        let (frame_tx, mut frame_rx) = mpsc::channel(8);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let start = std::time::Instant::now();
        let summary =
            replay_file(file.path(), 50.0, frame_tx, Arc::new(Metrics::new()), shutdown_rx)
                .await
                .unwrap();

        assert_eq!(summary.frames, 3);
        // First tick is immediate, then two 20ms gaps
        assert!(start.elapsed() >= Duration::from_millis(35));
        while frame_rx.recv().await.is_some() {}
    }

    #[tokio::test]
    async fn test_replay_missing_file() {
        let (frame_tx, _frame_rx) = mpsc::channel(1);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let result = replay_file(
            "/nonexistent/frames.jsonl",
            0.0,
            frame_tx,
            Arc::new(Metrics::new()),
            shutdown_rx,
        )
        .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_replay_period_bounds() {
        assert_eq!(replay_period(0.0).unwrap(), None);
        assert_eq!(replay_period(50.0).unwrap(), Some(Duration::from_millis(20)));
        assert_eq!(replay_period(MAX_REPLAY_FPS).unwrap(), Some(Duration::from_millis(1)));
        let slowest = replay_period(MIN_REPLAY_FPS).unwrap().unwrap();
        assert!(slowest >= Duration::from_secs(999) && slowest <= Duration::from_secs(1001));

        for fps in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN, -1.0, 1e-320, 1e6] {
            let err = replay_period(fps).unwrap_err();
            assert!(matches!(err, OccupancyError::InvalidConfiguration(_)), "fps {}", fps);
        }
    }

    #[tokio::test]
    async fn test_replay_rejects_unusable_fps() {
        let file = write_lines(&[r#"{"detections": []}"#]);

        for fps in [f64::INFINITY, 1e-320] {
            let (frame_tx, mut frame_rx) = mpsc::channel(1);
            let (_shutdown_tx, shutdown_rx) = watch::channel(false);
            let result =
                replay_file(file.path(), fps, frame_tx, Arc::new(Metrics::new()), shutdown_rx)
                    .await;
            assert!(result.is_err(), "fps {}", fps);
            assert!(frame_rx.recv().await.is_none());
        }
    }
}
