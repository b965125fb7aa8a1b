//! Local-maximum peak picking over a magnitude spectrogram (C2).

use crate::spectrogram::Spectrogram;

const LOG_EPS: f32 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    pub t: usize,
    pub f: usize,
    pub log_mag: f32,
}

/// `(H_f, H_t)` neighborhood window sizes (full extent, not radii — matching
/// `scipy.ndimage.maximum_filter(size=(H_f, H_t))` in the reference
/// implementation) and the per-frame peak cap, matching the
/// `fingerprinting.peak_neighborhood` / `max_peaks_per_frame` config keys.
#[derive(Debug, Clone, Copy)]
pub struct PeakPickerConfig {
    pub neighborhood_freq: usize,
    pub neighborhood_time: usize,
    pub max_peaks_per_frame: usize,
}

impl Default for PeakPickerConfig {
    fn default() -> Self {
        Self {
            neighborhood_freq: 12,
            neighborhood_time: 20,
            max_peaks_per_frame: 6,
        }
    }
}

/// Split a window of total size `size` around an index the way
/// `scipy.ndimage.maximum_filter`'s default (centered) origin does: `size/2`
/// cells before, the rest after.
fn window_span(i: usize, size: usize, len: usize) -> (usize, usize) {
    let before = size / 2;
    let after = size - before;
    (i.saturating_sub(before), (i + after).min(len))
}

fn is_local_max(log_s: &[Vec<f32>], t: usize, f: usize, size_f: usize, size_t: usize) -> bool {
    let num_frames = log_s.len();
    let num_bins = log_s[0].len();
    let val = log_s[t][f];

    let (t_start, t_end) = window_span(t, size_t, num_frames);
    let (f_start, f_end) = window_span(f, size_f, num_bins);

    for nt in t_start..t_end {
        for nf in f_start..f_end {
            if nt == t && nf == f {
                continue;
            }
            if log_s[nt][nf] > val {
                return false;
            }
        }
    }
    true
}

/// 75th percentile with linear interpolation between order statistics,
/// matching the conventional default used by array-percentile libraries.
fn percentile_75(mut values: Vec<f32>) -> f32 {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let n = values.len();
    if n == 0 {
        return f32::NEG_INFINITY;
    }
    if n == 1 {
        return values[0];
    }
    let rank = 0.75 * (n - 1) as f32;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        values[lo]
    } else {
        let frac = rank - lo as f32;
        values[lo] + (values[hi] - values[lo]) * frac
    }
}

/// Pick constellation peaks from a magnitude spectrogram. Returns peaks
/// sorted by `t` ascending, ties broken by `f` ascending.
pub fn find_peaks(spec: &Spectrogram, cfg: PeakPickerConfig) -> Vec<Peak> {
    if spec.frames.is_empty() || spec.num_bins() == 0 {
        return Vec::new();
    }

    let log_s: Vec<Vec<f32>> = spec
        .frames
        .iter()
        .map(|frame| frame.iter().map(|&m| (m + LOG_EPS).ln()).collect())
        .collect();

    let num_frames = log_s.len();
    let num_bins = log_s[0].len();

    let mut local_max_cells: Vec<(usize, usize)> = Vec::new();
    for t in 0..num_frames {
        for f in 0..num_bins {
            if is_local_max(&log_s, t, f, cfg.neighborhood_freq, cfg.neighborhood_time) {
                local_max_cells.push((t, f));
            }
        }
    }

    let threshold = if local_max_cells.is_empty() {
        log_s
            .iter()
            .flat_map(|row| row.iter().copied())
            .fold(f32::NEG_INFINITY, f32::max)
    } else {
        let vals: Vec<f32> = local_max_cells.iter().map(|&(t, f)| log_s[t][f]).collect();
        percentile_75(vals)
    };

    let mut by_frame: Vec<Vec<Peak>> = vec![Vec::new(); num_frames];
    for (t, f) in local_max_cells {
        let log_mag = log_s[t][f];
        if log_mag >= threshold {
            by_frame[t].push(Peak { t, f, log_mag });
        }
    }

    let mut out = Vec::new();
    for frame_peaks in by_frame.into_iter() {
        let mut frame_peaks = frame_peaks;
        if frame_peaks.len() > cfg.max_peaks_per_frame {
            // Sort by magnitude descending, ties by lower frequency bin first,
            // keep the top-K, then restore frequency-ascending order.
            frame_peaks.sort_by(|a, b| {
                b.log_mag
                    .partial_cmp(&a.log_mag)
                    .unwrap()
                    .then(a.f.cmp(&b.f))
            });
            frame_peaks.truncate(cfg.max_peaks_per_frame);
            frame_peaks.sort_by_key(|p| p.f);
        }
        out.extend(frame_peaks);
    }

    out
}
