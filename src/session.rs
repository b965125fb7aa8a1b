//! Concurrent session state machine tying capture, matching, drift and
//! lyrics together (C9).

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::drift::DriftModel;
use crate::fingerprint::Fingerprinter;
use crate::buffer::RollingBuffer;
use crate::lyrics::{self, LrcDocument};
use crate::matcher::Matcher;
use crate::store::FingerprintStore;

const TICK_INTERVAL: Duration = Duration::from_millis(20);
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

struct SessionInner {
    track_id: Option<String>,
    lyrics: LrcDocument,
    drift: DriftModel,
    /// Wall-clock instant the current track's drift model is relative to.
    /// Reset on every track switch so `drift`'s `t` always starts at 0 for
    /// the track currently playing.
    wall_t0: Option<Instant>,
    last_confidence: i64,
}

impl Default for SessionInner {
    fn default() -> Self {
        Self {
            track_id: None,
            lyrics: LrcDocument::default(),
            drift: DriftModel::new(),
            wall_t0: None,
            last_confidence: 0,
        }
    }
}

/// An observer-facing view of session state, computed at a point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub track_id: Option<String>,
    pub confidence: i64,
    pub position_seconds: Option<f64>,
    pub current_lyric: Option<String>,
    pub next_lyric: Option<String>,
}

/// Owns the buffer, storage handle, and match-thread for one listening
/// session. The capture callback and the match thread never share a lock:
/// capture only ever touches `buffer`, which guards its own short critical
/// sections (see [`RollingBuffer`]).
pub struct LiveSession {
    inner: Arc<Mutex<SessionInner>>,
    running: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
    buffer: Arc<RollingBuffer>,
}

impl LiveSession {
    /// Spawn the match-thread tick loop. `lyrics_dir` resolves a track's
    /// `lrc_file` (read from its stored metadata) to a filesystem path.
    pub fn start(
        buffer: Arc<RollingBuffer>,
        store: Arc<FingerprintStore>,
        fingerprinter: Fingerprinter,
        listen_seconds: f64,
        match_every_seconds: f64,
        min_confidence: i64,
        lyrics_dir: PathBuf,
    ) -> Self {
        let inner = Arc::new(Mutex::new(SessionInner::default()));
        let running = Arc::new(AtomicBool::new(true));

        let thread_inner = Arc::clone(&inner);
        let thread_running = Arc::clone(&running);
        let thread_buffer = Arc::clone(&buffer);

        let handle = std::thread::spawn(move || {
            let mut next_tick = Instant::now();
            while thread_running.load(Ordering::Acquire) {
                std::thread::sleep(TICK_INTERVAL);
                let now = Instant::now();
                if now < next_tick {
                    continue;
                }
                next_tick = now + Duration::from_secs_f64(match_every_seconds);

                let segment = thread_buffer.ordered_snapshot();
                let matcher = Matcher::new(&fingerprinter, &store, listen_seconds);
                let Some(result) = matcher.match_segment(&segment) else {
                    log::debug!("match tick produced no candidate");
                    continue;
                };
                if result.confidence < min_confidence {
                    log::debug!(
                        "match tick below confidence floor: {} < {}",
                        result.confidence,
                        min_confidence
                    );
                    continue;
                }

                let x = result.offset_seconds.max(0.0);
                let is_switch = {
                    let guard = thread_inner.lock().unwrap();
                    guard.track_id.as_deref() != Some(result.track_id.as_str())
                };

                if is_switch {
                    // Stage lyrics loading outside the lock: file I/O must
                    // never happen while other threads wait on `snapshot()`.
                    let lyrics = load_lyrics_for(&store, &lyrics_dir, &result.track_id);
                    log::info!("switching to track {}", result.track_id);

                    let mut guard = thread_inner.lock().unwrap();
                    guard.track_id = Some(result.track_id.clone());
                    guard.lyrics = lyrics;
                    guard.wall_t0 = Some(now);
                    guard.drift.reset(x, 0.0);
                    guard.last_confidence = result.confidence;
                } else {
                    let mut guard = thread_inner.lock().unwrap();
                    let t0 = guard.wall_t0.unwrap_or(now);
                    let t = now.duration_since(t0).as_secs_f64();
                    guard.drift.update(t, x);
                    guard.last_confidence = result.confidence;
                }
            }
        });

        Self {
            inner,
            running,
            thread: Mutex::new(Some(handle)),
            buffer,
        }
    }

    pub fn buffer(&self) -> &Arc<RollingBuffer> {
        &self.buffer
    }

    /// Current track, drift-predicted position and surrounding lyric lines.
    /// `position_seconds` is `None` until the first track identification.
    /// `now` need only be monotonic with the instants passed to the match
    /// thread's own clock reads — the epoch each track's drift model is fit
    /// against (`wall_t0`) is tracked internally and never exposed.
    pub fn snapshot(&self, now: Instant) -> SessionSnapshot {
        let guard = self.inner.lock().unwrap();
        let track_id = guard.track_id.clone();
        let position_seconds = guard.wall_t0.map(|t0| {
            let t = now.duration_since(t0).as_secs_f64();
            guard.drift.predict(t).max(0.0)
        });
        let (current, next) = match position_seconds {
            Some(t) => {
                let (c, n) = guard.lyrics.at(t);
                (c.map(str::to_string), n.map(str::to_string))
            }
            None => (None, None),
        };
        SessionSnapshot {
            track_id,
            confidence: guard.last_confidence,
            position_seconds,
            current_lyric: current,
            next_lyric: next,
        }
    }

    /// Signal the match thread to stop and join it, up to a bounded wait.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread.lock().unwrap().take() {
            let (tx, rx) = std::sync::mpsc::channel();
            std::thread::spawn(move || {
                let _ = tx.send(handle.join());
            });
            let _ = rx.recv_timeout(JOIN_TIMEOUT);
        }
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

fn load_lyrics_for(store: &FingerprintStore, lyrics_dir: &std::path::Path, track_id: &str) -> LrcDocument {
    let meta = match store.track_meta(track_id) {
        Ok(Some(meta)) => meta,
        Ok(None) => return LrcDocument::default(),
        Err(e) => {
            log::warn!("failed to load track metadata for {}: {}", track_id, e);
            return LrcDocument::default();
        }
    };
    let Some(lrc_file) = meta.get("lrc_file").and_then(|v| v.as_str()) else {
        return LrcDocument::default();
    };
    match lyrics::load_lrc_file(&lyrics_dir.join(lrc_file)) {
        Ok(doc) => doc,
        Err(e) => {
            log::warn!("failed to load lyrics file {}: {}", lrc_file, e);
            LrcDocument::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::FingerprinterConfig;
    use std::f32::consts::PI;

    fn sine_mix(sample_rate: u32, seconds: f32, f1: f32, f2: f32) -> Vec<f32> {
        let n = (sample_rate as f32 * seconds) as usize;
        (0..n)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                0.5 * (2.0 * PI * f1 * t).sin() + 0.3 * (2.0 * PI * f2 * t).sin()
            })
            .collect()
    }

    #[test]
    fn snapshot_before_any_match_has_no_track() {
        let buffer = Arc::new(RollingBuffer::new(22_050 * 12));
        let store = Arc::new(FingerprintStore::open_in_memory().unwrap());
        let fp = Fingerprinter::new(FingerprinterConfig::default());
        let session = LiveSession::start(
            buffer,
            store,
            fp,
            12.0,
            1.0,
            20,
            std::env::temp_dir(),
        );
        let snap = session.snapshot(Instant::now());
        assert_eq!(snap.track_id, None);
        assert_eq!(snap.position_seconds, None);
        session.stop();
    }

    #[test]
    fn identifies_track_written_into_the_buffer() {
        let cfg = FingerprinterConfig::default();
        let fp = Fingerprinter::new(cfg);
        let store = Arc::new(FingerprintStore::open_in_memory().unwrap());
        store
            .upsert_track("trk_a", &serde_json::json!({"title": "A"}))
            .unwrap();
        let full = sine_mix(cfg.sample_rate, 30.0, 440.0, 880.0);
        store.replace_hashes("trk_a", &fp.fingerprint(&full)).unwrap();

        let listen_seconds = 12.0;
        let buffer = Arc::new(RollingBuffer::new((cfg.sample_rate as f64 * listen_seconds) as usize));
        let start = 8.0 * cfg.sample_rate as f32;
        let end = start + listen_seconds as f32 * cfg.sample_rate as f32;
        buffer.write(&full[start as usize..end as usize]);

        let session = LiveSession::start(buffer, store, fp, listen_seconds, 0.05, 20, std::env::temp_dir());
        std::thread::sleep(Duration::from_millis(300));
        let snap = session.snapshot(Instant::now());
        session.stop();

        assert_eq!(snap.track_id.as_deref(), Some("trk_a"));
    }

    #[test]
    fn reset_seeds_the_epoch_at_zero() {
        let mut inner = SessionInner::default();
        let t0 = Instant::now();
        inner.wall_t0 = Some(t0);
        inner.drift.reset(20.0, 0.0);
        // At the instant of the switch itself (elapsed == 0), the predicted
        // position must equal the seeded offset exactly, not
        // offset + however long the session had already been running.
        assert_eq!(inner.drift.predict(0.0), 20.0);
    }

    #[test]
    fn snapshot_clamps_negative_position_to_zero() {
        let mut drift = DriftModel::new();
        drift.alpha = -5.0;
        drift.beta = 1.0;
        let session = LiveSession {
            inner: Arc::new(Mutex::new(SessionInner {
                track_id: Some("trk_x".into()),
                lyrics: LrcDocument::default(),
                drift,
                wall_t0: Some(Instant::now()),
                last_confidence: 50,
            })),
            running: Arc::new(AtomicBool::new(false)),
            thread: Mutex::new(None),
            buffer: Arc::new(RollingBuffer::new(1)),
        };
        let snap = session.snapshot(Instant::now());
        assert_eq!(snap.position_seconds, Some(0.0));
    }
}
