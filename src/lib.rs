//! Live audio fingerprint identification and drift-tracked playback position
//! for lyric sync: a landmark-hash fingerprinter, a SQLite-backed inverted
//! index, a vote-by-offset matcher, and a continuously-refined linear clock
//! model, tied together by a concurrent listening session.

pub mod buffer;
pub mod capture;
pub mod config;
pub mod drift;
pub mod error;
pub mod fingerprint;
pub mod hashing;
pub mod lyrics;
pub mod matcher;
pub mod peaks;
pub mod session;
pub mod spectrogram;
pub mod store;
pub mod track_id;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use fingerprint::{Fingerprinter, FingerprinterConfig};
pub use matcher::{MatchResult, Matcher};
pub use session::{LiveSession, SessionSnapshot};
pub use store::FingerprintStore;
