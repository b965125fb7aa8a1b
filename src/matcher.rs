//! Query builder, offset-vote accumulator, winner selection (C7).

use std::collections::HashMap;

use crate::fingerprint::Fingerprinter;
use crate::store::FingerprintStore;

#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub track_id: String,
    pub confidence: i64,
    pub offset_seconds: f64,
}

pub struct Matcher<'a> {
    pub fingerprinter: &'a Fingerprinter,
    pub store: &'a FingerprintStore,
    pub listen_seconds: f64,
}

impl<'a> Matcher<'a> {
    pub fn new(fingerprinter: &'a Fingerprinter, store: &'a FingerprintStore, listen_seconds: f64) -> Self {
        Self {
            fingerprinter,
            store,
            listen_seconds,
        }
    }

    /// Identify `segment` against the store. Returns `None` on an empty
    /// fingerprint, no matching rows, or a storage failure (logged, not
    /// propagated — the live path never treats a query failure as fatal).
    pub fn match_segment(&self, segment: &[f32]) -> Option<MatchResult> {
        let live = self.fingerprinter.fingerprint(segment);
        if live.is_empty() {
            return None;
        }

        let mut live_t_by_hash: HashMap<u32, Vec<i64>> = HashMap::new();
        for (hash, t) in &live {
            live_t_by_hash.entry(*hash).or_default().push(*t as i64);
        }

        let distinct_hashes: Vec<u32> = live_t_by_hash.keys().copied().collect();
        let rows = match self.store.query_hashes(&distinct_hashes) {
            Ok(rows) => rows,
            Err(e) => {
                log::warn!("skipping match tick: storage query failed: {}", e);
                return None;
            }
        };
        if rows.is_empty() {
            return None;
        }

        // track_id -> (offset -> count)
        let mut votes: HashMap<String, HashMap<i64, i64>> = HashMap::new();
        for (hash, track_id, db_t) in rows {
            if let Some(live_ts) = live_t_by_hash.get(&hash) {
                for &live_t in live_ts {
                    let off = db_t - live_t;
                    *votes
                        .entry(track_id.clone())
                        .or_default()
                        .entry(off)
                        .or_insert(0) += 1;
                }
            }
        }

        let mut best: Option<(String, i64, i64)> = None; // (track_id, off, conf)
        for (track_id, offs) in &votes {
            let Some((&off, &conf)) = offs.iter().max_by(|a, b| {
                a.1.cmp(b.1)
                    .then_with(|| b.0.abs().cmp(&a.0.abs()))
            }) else {
                continue;
            };
            let better = match &best {
                None => true,
                Some((best_track, _best_off, best_conf)) => {
                    conf.cmp(best_conf)
                        .then_with(|| track_id.cmp(best_track).reverse())
                        == std::cmp::Ordering::Greater
                }
            };
            if better {
                best = Some((track_id.clone(), off, conf));
            }
        }

        let (track_id, off, conf) = best?;
        let hop_size = self.fingerprinter.cfg.hop_size as f64;
        let sample_rate = self.fingerprinter.cfg.sample_rate as f64;
        let off_sec = (off as f64 * hop_size) / sample_rate;
        let offset_seconds = off_sec + self.listen_seconds;

        Some(MatchResult {
            track_id,
            confidence: conf,
            offset_seconds,
        })
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

    fn index_track(store: &FingerprintStore, fp: &Fingerprinter, track_id: &str, samples: &[f32]) {
        store
            .upsert_track(track_id, &serde_json::json!({"title": track_id}))
            .unwrap();
        let hashes = fp.fingerprint(samples);
        store.replace_hashes(track_id, &hashes).unwrap();
    }

    #[test]
    fn zero_intersecting_hashes_yields_none() {
        let cfg = FingerprinterConfig::default();
        let fp = Fingerprinter::new(cfg);
        let store = FingerprintStore::open_in_memory().unwrap();
        index_track(&store, &fp, "trk_a", &sine_mix(cfg.sample_rate, 3.0, 440.0, 880.0));

        let matcher = Matcher::new(&fp, &store, 2.0);
        let noise = vec![0.0f32; (cfg.sample_rate as f32 * 2.0) as usize];
        assert!(matcher.match_segment(&noise).is_none());
    }

    #[test]
    fn identifies_the_indexed_track() {
        let cfg = FingerprinterConfig {
            sample_rate: 22_050,
            ..FingerprinterConfig::default()
        };
        let fp = Fingerprinter::new(cfg);
        let store = FingerprintStore::open_in_memory().unwrap();
        let full = sine_mix(cfg.sample_rate, 30.0, 440.0, 880.0);
        index_track(&store, &fp, "trk_a", &full);

        let window_start = 8.0f32;
        let window_len = 12.0f32;
        let start = (window_start * cfg.sample_rate as f32) as usize;
        let end = start + (window_len * cfg.sample_rate as f32) as usize;
        let segment = &full[start..end];

        let matcher = Matcher::new(&fp, &store, window_len as f64);
        let result = matcher.match_segment(segment).expect("expected a match");
        assert_eq!(result.track_id, "trk_a");
        assert!(result.confidence >= 20, "confidence was {}", result.confidence);
        assert!(
            (19.5..=20.5).contains(&result.offset_seconds),
            "offset_seconds was {}",
            result.offset_seconds
        );
    }

    #[test]
    fn disambiguates_two_tracks() {
        let cfg = FingerprinterConfig::default();
        let fp = Fingerprinter::new(cfg);
        let store = FingerprintStore::open_in_memory().unwrap();
        let a = sine_mix(cfg.sample_rate, 20.0, 440.0, 880.0);
        let b = sine_mix(cfg.sample_rate, 20.0, 523.0, 1046.0);
        index_track(&store, &fp, "trk_a", &a);
        index_track(&store, &fp, "trk_b", &b);

        let start = (4.0 * cfg.sample_rate as f32) as usize;
        let end = start + (12.0 * cfg.sample_rate as f32) as usize;
        let segment = &b[start..end];

        let matcher = Matcher::new(&fp, &store, 12.0);
        let result = matcher.match_segment(segment).expect("expected a match");
        assert_eq!(result.track_id, "trk_b");
    }
}
