//! Windowed magnitude STFT of mono audio (C1).

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use std::f32::consts::PI;

/// A magnitude spectrogram: `frames[t][f]` is the STFT magnitude at frame `t`,
/// frequency bin `f`, for `f` in `[0, fft_size / 2]`.
#[derive(Debug, Clone, Default)]
pub struct Spectrogram {
    pub frames: Vec<Vec<f32>>,
    pub fft_size: usize,
    pub hop_size: usize,
}

impl Spectrogram {
    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn num_bins(&self) -> usize {
        self.frames.first().map_or(0, |f| f.len())
    }
}

fn hann_window(window_size: usize) -> Vec<f32> {
    if window_size == 0 {
        return Vec::new();
    }
    if window_size == 1 {
        return vec![1.0];
    }
    (0..window_size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / (window_size - 1) as f32).cos()))
        .collect()
}

/// Compute the magnitude STFT of `samples` with a Hann window of `fft_size`
/// samples and a hop of `hop_size` samples. Frame `t` covers samples
/// `[t * hop_size, t * hop_size + fft_size)`; there is no zero-padded tail
/// frame, which keeps frame indices aligned between offline indexing and the
/// live matcher.
pub fn spectrogram(samples: &[f32], fft_size: usize, hop_size: usize) -> Spectrogram {
    if fft_size == 0 || hop_size == 0 || samples.len() < fft_size {
        return Spectrogram {
            frames: Vec::new(),
            fft_size,
            hop_size,
        };
    }

    let num_frames = (samples.len() - fft_size) / hop_size + 1;
    if num_frames == 0 {
        return Spectrogram {
            frames: Vec::new(),
            fft_size,
            hop_size,
        };
    }

    let window = hann_window(fft_size);
    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(fft_size);

    let num_bins = fft_size / 2 + 1;
    let mut frames = Vec::with_capacity(num_frames);
    let mut buffer: Vec<Complex<f32>> = vec![Complex::new(0.0, 0.0); fft_size];

    for t in 0..num_frames {
        let start = t * hop_size;
        let chunk = &samples[start..start + fft_size];
        for (i, &s) in chunk.iter().enumerate() {
            buffer[i] = Complex::new(s * window[i], 0.0);
        }
        fft.process(&mut buffer);

        let mut mags = Vec::with_capacity(num_bins);
        for bin in buffer.iter().take(num_bins) {
            mags.push(bin.norm());
        }
        frames.push(mags);
    }

    Spectrogram {
        frames,
        fft_size,
        hop_size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_below_window_size() {
        let s = spectrogram(&[0.0; 10], 4096, 512);
        assert_eq!(s.num_frames(), 0);
    }

    #[test]
    fn frame_count_matches_formula() {
        let samples = vec![0.0f32; 4096 + 512 * 3];
        let s = spectrogram(&samples, 4096, 512);
        assert_eq!(s.num_frames(), 4);
        assert_eq!(s.num_bins(), 4096 / 2 + 1);
    }

    #[test]
    fn pure_tone_peaks_near_expected_bin() {
        let sample_rate = 22050.0f32;
        let fft_size = 4096usize;
        let freq = 440.0f32;
        let n = fft_size * 4;
        let samples: Vec<f32> = (0..n)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate).sin())
            .collect();
        let s = spectrogram(&samples, fft_size, 512);
        let expected_bin = (freq * fft_size as f32 / sample_rate).round() as usize;
        let frame = &s.frames[s.num_frames() / 2];
        let (max_bin, _) = frame
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap();
        assert!((max_bin as isize - expected_bin as isize).abs() <= 2);
    }
}
