//! Typed, validated configuration mirroring the §6 nested mapping (C11).

use serde::Deserialize;
use serde_json::Value;

use crate::error::ConfigError;

fn default_sample_rate() -> u32 {
    22_050
}
fn default_channels() -> u32 {
    1
}
fn default_block_seconds() -> f64 {
    1.0
}
fn default_listen_seconds() -> f64 {
    12.0
}
fn default_match_every_seconds() -> f64 {
    1.0
}
fn default_min_confidence() -> i64 {
    20
}
fn default_fft_size() -> usize {
    4096
}
fn default_hop_size() -> usize {
    512
}
fn default_peak_neighborhood() -> (usize, usize) {
    (12, 20)
}
fn default_max_peaks_per_frame() -> usize {
    6
}
fn default_fanout() -> usize {
    8
}
fn default_min_dt() -> usize {
    1
}
fn default_max_dt() -> usize {
    60
}

/// `audio.device`: an input device index, a case-insensitive name substring,
/// or absent (use the host default).
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum DeviceSelector {
    Index(i64),
    Name(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AudioConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_channels")]
    pub channels: u32,
    #[serde(default = "default_block_seconds")]
    pub block_seconds: f64,
    #[serde(default = "default_listen_seconds")]
    pub listen_seconds: f64,
    #[serde(default = "default_match_every_seconds")]
    pub match_every_seconds: f64,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: i64,
    #[serde(default)]
    pub device: Option<DeviceSelector>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            block_seconds: default_block_seconds(),
            listen_seconds: default_listen_seconds(),
            match_every_seconds: default_match_every_seconds(),
            min_confidence: default_min_confidence(),
            device: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FingerprintingConfig {
    #[serde(default = "default_fft_size")]
    pub fft_size: usize,
    #[serde(default = "default_hop_size")]
    pub hop_size: usize,
    #[serde(default = "default_peak_neighborhood")]
    pub peak_neighborhood: (usize, usize),
    #[serde(default = "default_max_peaks_per_frame")]
    pub max_peaks_per_frame: usize,
    #[serde(default = "default_fanout")]
    pub fanout: usize,
    #[serde(default = "default_min_dt")]
    pub min_dt: usize,
    #[serde(default = "default_max_dt")]
    pub max_dt: usize,
}

impl Default for FingerprintingConfig {
    fn default() -> Self {
        Self {
            fft_size: default_fft_size(),
            hop_size: default_hop_size(),
            peak_neighborhood: default_peak_neighborhood(),
            max_peaks_per_frame: default_max_peaks_per_frame(),
            fanout: default_fanout(),
            min_dt: default_min_dt(),
            max_dt: default_max_dt(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackgroundConfig {
    #[serde(rename = "type")]
    pub kind: String,
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrackConfig {
    pub id: Option<String>,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub audio_file: String,
    pub lrc_file: Option<String>,
    pub fingerprint_cache: Option<String>,
    pub background: Option<BackgroundConfig>,
}

impl TrackConfig {
    /// The open metadata mapping the core persists in the store: title,
    /// artist, album, background descriptor, and lrc path — everything else
    /// is a display concern the core never reads.
    pub fn meta(&self) -> Value {
        serde_json::json!({
            "title": self.title,
            "artist": self.artist,
            "album": self.album,
            "lrc_file": self.lrc_file,
            "background": self.background.as_ref().map(|b| serde_json::json!({
                "type": b.kind,
                "path": b.path,
            })),
        })
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub fingerprinting: FingerprintingConfig,
    #[serde(default)]
    pub tracks: Vec<TrackConfig>,
    pub database: Option<DatabaseConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    pub path: String,
}

impl AppConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: AppConfig = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.audio.sample_rate == 0 {
            return Err(ConfigError::InvalidValue {
                field: "audio.sample_rate".into(),
                reason: "must be > 0".into(),
            });
        }
        if self.audio.listen_seconds <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "audio.listen_seconds".into(),
                reason: "must be > 0".into(),
            });
        }
        if self.audio.block_seconds <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "audio.block_seconds".into(),
                reason: "must be > 0".into(),
            });
        }
        if self.audio.match_every_seconds <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "audio.match_every_seconds".into(),
                reason: "must be > 0".into(),
            });
        }
        if self.fingerprinting.fft_size == 0 || self.fingerprinting.hop_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "fingerprinting.fft_size/hop_size".into(),
                reason: "must be > 0".into(),
            });
        }
        for track in &self.tracks {
            if track.audio_file.trim().is_empty() {
                return Err(ConfigError::MissingField("tracks[].audio_file".into()));
            }
        }
        Ok(())
    }
}
