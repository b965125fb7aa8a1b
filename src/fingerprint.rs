//! Orchestrates spectrogram → peak-picking → hashing; file and in-memory
//! entry points (C4).

use std::fs::File;
use std::path::Path;

use serde::{Deserialize, Serialize};
use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::DecodeError;
use crate::hashing::{self, HashPairerConfig, HashRow};
use crate::peaks::{self, PeakPickerConfig};
use crate::spectrogram;

const MIN_PEAKS: usize = 10;

/// On-disk sidecar for a track's precomputed hashes (§6): two equal-length
/// parallel arrays rather than an array of pairs, so the cache round-trips
/// through `serde_json` without a custom `(u32, usize)` tuple format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FingerprintCache {
    h: Vec<u32>,
    t: Vec<i32>,
}

impl FingerprintCache {
    pub fn from_rows(rows: &[HashRow]) -> Self {
        Self {
            h: rows.iter().map(|&(hash, _)| hash).collect(),
            t: rows.iter().map(|&(_, t)| t as i32).collect(),
        }
    }

    pub fn into_rows(self) -> Vec<HashRow> {
        self.h
            .into_iter()
            .zip(self.t.into_iter().map(|t| t as usize))
            .collect()
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer(file, self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    pub fn load(path: &Path) -> std::io::Result<Self> {
        let file = File::open(path)?;
        serde_json::from_reader(file)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

/// Full parameter set for C1–C3, mirroring the `[fingerprinting]` config
/// table plus the sample rate carried in `[audio]`.
#[derive(Debug, Clone, Copy)]
pub struct FingerprinterConfig {
    pub sample_rate: u32,
    pub fft_size: usize,
    pub hop_size: usize,
    pub peak: PeakPickerConfig,
    pub pairer: HashPairerConfig,
}

impl Default for FingerprinterConfig {
    fn default() -> Self {
        Self {
            sample_rate: 22_050,
            fft_size: 4096,
            hop_size: 512,
            peak: PeakPickerConfig::default(),
            pairer: HashPairerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Fingerprinter {
    pub cfg: FingerprinterConfig,
}

impl Fingerprinter {
    pub fn new(cfg: FingerprinterConfig) -> Self {
        Self { cfg }
    }

    /// Downmix to mono, subtract DC, and extract landmark hashes. Returns an
    /// empty vector if fewer than 10 peaks survive picking.
    pub fn fingerprint(&self, samples: &[f32]) -> Vec<HashRow> {
        let mean = if samples.is_empty() {
            0.0
        } else {
            samples.iter().sum::<f32>() / samples.len() as f32
        };
        let centered: Vec<f32> = samples.iter().map(|&s| s - mean).collect();

        let spec = spectrogram::spectrogram(&centered, self.cfg.fft_size, self.cfg.hop_size);
        let picked = peaks::find_peaks(&spec, self.cfg.peak);
        if picked.len() < MIN_PEAKS {
            return Vec::new();
        }

        hashing::create_hashes(&picked, self.cfg.pairer)
    }

    /// Decode `path` via symphonia, downmix to mono, linearly resample to
    /// `self.cfg.sample_rate`, then fingerprint.
    pub fn fingerprint_file(&self, path: &Path) -> Result<Vec<HashRow>, DecodeError> {
        let (samples, source_rate) = decode_to_mono(path)?;
        let resampled = if source_rate == self.cfg.sample_rate {
            samples
        } else {
            linear_resample(&samples, source_rate, self.cfg.sample_rate)
        };
        Ok(self.fingerprint(&resampled))
    }
}

/// Linear-interpolate resample from `from_rate` to `to_rate` using
/// endpoint-exclusive normalized time, matching the reference resampler.
pub fn linear_resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if samples.is_empty() || from_rate == to_rate {
        return samples.to_vec();
    }
    let old_n = samples.len();
    let new_n = ((old_n as f64) * (to_rate as f64 / from_rate as f64)).round() as usize;
    if new_n == 0 {
        return Vec::new();
    }

    let mut out = Vec::with_capacity(new_n);
    for i in 0..new_n {
        // xq[i] = i / new_n (endpoint-exclusive), mapped into the source's
        // endpoint-exclusive normalized time xp[j] = j / old_n.
        let xq = i as f64 / new_n as f64;
        let pos = xq * old_n as f64;
        let j0 = pos.floor() as isize;
        let frac = pos - j0 as f64;

        let at = |idx: isize| -> f32 {
            let idx = idx.clamp(0, old_n as isize - 1) as usize;
            samples[idx]
        };

        let v = if j0 < 0 {
            at(0)
        } else if j0 as usize >= old_n - 1 {
            at(old_n as isize - 1)
        } else {
            let a = at(j0);
            let b = at(j0 + 1);
            a + (b - a) * frac as f32
        };
        out.push(v);
    }
    out
}

fn decode_to_mono(path: &Path) -> Result<(Vec<f32>, u32), DecodeError> {
    let path_str = path.display().to_string();
    let src = File::open(path).map_err(|e| DecodeError::Open {
        path: path_str.clone(),
        source: e,
    })?;
    let mss = MediaSourceStream::new(Box::new(src), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|s| s.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| DecodeError::Unsupported {
            path: path_str.clone(),
            reason: e.to_string(),
        })?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL && t.codec_params.sample_rate.is_some())
        .ok_or_else(|| DecodeError::NoTrack(path_str.clone()))?;

    let track_id = track.id;
    let sample_rate = track.codec_params.sample_rate.unwrap();
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| DecodeError::Unsupported {
            path: path_str.clone(),
            reason: e.to_string(),
        })?;

    let mut mono = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                return Err(DecodeError::Unsupported {
                    path: path_str.clone(),
                    reason: e.to_string(),
                })
            }
        };
        if packet.track_id() != track_id {
            continue;
        }
        match decoder.decode(&packet) {
            Ok(decoded) => push_mono_samples(&decoded, &mut mono),
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => {
                return Err(DecodeError::Unsupported {
                    path: path_str.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }

    Ok((mono, sample_rate))
}

fn push_mono_samples(decoded: &AudioBufferRef, out: &mut Vec<f32>) {
    macro_rules! downmix {
        ($buf:expr) => {{
            let spec = $buf.spec();
            let channels = spec.channels.count();
            let frames = $buf.frames();
            if channels == 1 {
                out.extend(($buf.chan(0))[..frames].iter().map(|&s| s as f32));
            } else {
                for i in 0..frames {
                    let mut acc = 0.0f32;
                    for c in 0..channels {
                        acc += $buf.chan(c)[i] as f32;
                    }
                    out.push(acc / channels as f32);
                }
            }
        }};
    }

    match decoded {
        AudioBufferRef::F32(buf) => downmix!(buf),
        AudioBufferRef::F64(buf) => downmix!(buf),
        AudioBufferRef::S32(buf) => downmix!(buf),
        AudioBufferRef::S16(buf) => downmix!(buf),
        AudioBufferRef::U8(buf) => downmix!(buf),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine_mix(sample_rate: u32, seconds: f32) -> Vec<f32> {
        let n = (sample_rate as f32 * seconds) as usize;
        (0..n)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                0.5 * (2.0 * PI * 440.0 * t).sin() + 0.3 * (2.0 * PI * 880.0 * t).sin()
            })
            .collect()
    }

    #[test]
    fn too_short_audio_yields_empty_fingerprint() {
        let fp = Fingerprinter::new(FingerprinterConfig::default());
        assert!(fp.fingerprint(&[0.0; 100]).is_empty());
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let fp = Fingerprinter::new(FingerprinterConfig::default());
        let samples = sine_mix(22_050, 3.0);
        let a = fp.fingerprint(&samples);
        let b = fp.fingerprint(&samples);
        assert!(!a.is_empty());
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_is_dc_invariant() {
        let fp = Fingerprinter::new(FingerprinterConfig::default());
        let samples = sine_mix(22_050, 3.0);
        let shifted: Vec<f32> = samples.iter().map(|&s| s + 0.25).collect();
        assert_eq!(fp.fingerprint(&samples), fp.fingerprint(&shifted));
    }

    #[test]
    fn linear_resample_preserves_length_ratio() {
        let samples: Vec<f32> = (0..1000).map(|i| i as f32).collect();
        let out = linear_resample(&samples, 44_100, 22_050);
        assert_eq!(out.len(), 500);
    }

    #[test]
    fn linear_resample_noop_on_equal_rates() {
        let samples = vec![1.0, 2.0, 3.0];
        assert_eq!(linear_resample(&samples, 22_050, 22_050), samples);
    }

    #[test]
    fn fingerprint_cache_round_trips_through_disk() {
        let fp = Fingerprinter::new(FingerprinterConfig::default());
        let rows = fp.fingerprint(&sine_mix(22_050, 3.0));
        assert!(!rows.is_empty());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track.fp.json");
        FingerprintCache::from_rows(&rows).save(&path).unwrap();

        let loaded = FingerprintCache::load(&path).unwrap().into_rows();
        assert_eq!(loaded, rows);
    }

    #[test]
    fn fingerprint_cache_arrays_stay_equal_length() {
        let rows: Vec<HashRow> = vec![(1, 0), (2, 3), (3, 7)];
        let cache = FingerprintCache::from_rows(&rows);
        assert_eq!(cache.h.len(), cache.t.len());
    }
}
