//! Fan-out pairing of peaks into 32-bit landmark hashes (C3).

use crate::peaks::Peak;

const FREQ_BITS: u32 = 10;
const DT_BITS: u32 = 12;
const FREQ_MASK: u32 = (1 << FREQ_BITS) - 1; // 0x3FF
const DT_MASK: u32 = (1 << DT_BITS) - 1; // 0xFFF

/// Parameters for C3, mirroring `fingerprinting.fanout` / `min_dt` / `max_dt`.
#[derive(Debug, Clone, Copy)]
pub struct HashPairerConfig {
    pub fanout: usize,
    pub min_dt: usize,
    pub max_dt: usize,
}

impl Default for HashPairerConfig {
    fn default() -> Self {
        Self {
            fanout: 8,
            min_dt: 1,
            max_dt: 60,
        }
    }
}

/// Pack `(f1, f2, dt)` into the landmark hash layout of §3:
/// bits `[31:22]` anchor freq, `[21:12]` target freq, `[11:0]` frame delta.
pub fn pack_hash(f1: u32, f2: u32, dt: u32) -> u32 {
    let f1 = f1 & FREQ_MASK;
    let f2 = f2 & FREQ_MASK;
    let dt = dt & DT_MASK;
    (f1 << 22) | (f2 << 12) | dt
}

/// Inverse of [`pack_hash`]: `(f1 & 0x3FF, f2 & 0x3FF, dt & 0xFFF)`.
pub fn unpack_hash(hash: u32) -> (u32, u32, u32) {
    let dt = hash & DT_MASK;
    let f2 = (hash >> 12) & FREQ_MASK;
    let f1 = (hash >> 22) & FREQ_MASK;
    (f1, f2, dt)
}

/// A `(hash32, anchor_frame)` pair, in anchor-peak order.
pub type HashRow = (u32, usize);

/// For each peak, pair it with the next `fanout` later peaks whose frame
/// delta falls in `[min_dt, max_dt]`, emitting one landmark hash per pair.
/// Peaks must already be sorted by `t` ascending (ties: `f` ascending).
pub fn create_hashes(peaks: &[Peak], cfg: HashPairerConfig) -> Vec<HashRow> {
    let mut out = Vec::new();
    if peaks.len() < 2 {
        return out;
    }

    for i in 0..peaks.len() {
        let anchor = &peaks[i];
        let end = (i + 1 + cfg.fanout).min(peaks.len());
        for target in &peaks[i + 1..end] {
            let dt = target.t.saturating_sub(anchor.t);
            if dt < cfg.min_dt || dt > cfg.max_dt {
                continue;
            }
            let hash = pack_hash(anchor.f as u32, target.f as u32, dt as u32);
            out.push((hash, anchor.t));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack_round_trips() {
        for &(f1, f2, dt) in &[(0u32, 0u32, 0u32), (1023, 1023, 4095), (17, 900, 42)] {
            let h = pack_hash(f1, f2, dt);
            assert_eq!(unpack_hash(h), (f1, f2, dt));
        }
    }

    #[test]
    fn pack_masks_out_of_range_inputs() {
        let h = pack_hash(1024 + 5, 2048 + 3, 4096 + 7);
        assert_eq!(unpack_hash(h), (5, 3, 7));
    }

    #[test]
    fn respects_fanout_and_dt_bounds() {
        let peaks: Vec<Peak> = (0..5)
            .map(|t| Peak {
                t,
                f: t,
                log_mag: 0.0,
            })
            .collect();
        let cfg = HashPairerConfig {
            fanout: 2,
            min_dt: 1,
            max_dt: 60,
        };
        let hashes = create_hashes(&peaks, cfg);
        // Each of the first three anchors pairs with exactly 2 targets
        // (fanout=2); the last two anchors have fewer remaining peaks.
        assert_eq!(hashes.len(), 2 + 2 + 2 + 1);
    }

    #[test]
    fn dt_outside_bounds_emits_nothing() {
        let peaks = vec![
            Peak {
                t: 0,
                f: 1,
                log_mag: 0.0,
            },
            Peak {
                t: 100,
                f: 2,
                log_mag: 0.0,
            },
        ];
        let cfg = HashPairerConfig {
            fanout: 8,
            min_dt: 1,
            max_dt: 60,
        };
        assert!(create_hashes(&peaks, cfg).is_empty());
    }

    #[test]
    fn fewer_than_two_peaks_emits_nothing() {
        let peaks = vec![Peak {
            t: 0,
            f: 0,
            log_mag: 0.0,
        }];
        assert!(create_hashes(&peaks, HashPairerConfig::default()).is_empty());
    }
}
