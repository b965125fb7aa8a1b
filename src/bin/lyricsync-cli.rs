//! Command-line entry point: batch indexing (C15) and a live listen loop.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};

use lyricsync::capture::{Capture, CaptureSpec, CpalCapture};
use lyricsync::config::AppConfig;
use lyricsync::fingerprint::{Fingerprinter, FingerprinterConfig, FingerprintCache};
use lyricsync::hashing::{HashPairerConfig, HashRow};
use lyricsync::peaks::PeakPickerConfig;
use lyricsync::session::LiveSession;
use lyricsync::store::FingerprintStore;
use lyricsync::track_id;

#[derive(Parser)]
#[command(name = "lyricsync-cli", about = "Fingerprint indexing and live lyric sync")]
struct Cli {
    #[arg(short, long, default_value = "lyricsync.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fingerprint every configured track and (re)populate the store.
    Index,
    /// Capture from the microphone and print identification + lyrics.
    Listen,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let config = match AppConfig::from_file(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load config {}: {}", cli.config.display(), e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Command::Index => run_index(&cli.config, &config),
        Command::Listen => run_listen(&cli.config, &config),
    };

    if let Err(code) = result {
        std::process::exit(code);
    }
}

fn fingerprinter_config(config: &AppConfig) -> FingerprinterConfig {
    FingerprinterConfig {
        sample_rate: config.audio.sample_rate,
        fft_size: config.fingerprinting.fft_size,
        hop_size: config.fingerprinting.hop_size,
        peak: PeakPickerConfig {
            neighborhood_freq: config.fingerprinting.peak_neighborhood.0,
            neighborhood_time: config.fingerprinting.peak_neighborhood.1,
            max_peaks_per_frame: config.fingerprinting.max_peaks_per_frame,
        },
        pairer: HashPairerConfig {
            fanout: config.fingerprinting.fanout,
            min_dt: config.fingerprinting.min_dt,
            max_dt: config.fingerprinting.max_dt,
        },
    }
}

fn store_path(config_path: &Path, config: &AppConfig) -> PathBuf {
    let base = config_path.parent().unwrap_or_else(|| Path::new("."));
    match &config.database {
        Some(db) => base.join(&db.path),
        None => base.join("lyricsync.sqlite3"),
    }
}

/// Load a track's hashes from its cache sidecar if one exists, otherwise
/// fingerprint the audio file and write the sidecar for next time. A
/// load/save failure never aborts indexing — it just falls back to
/// recomputing, or skips the write, with a warning.
fn hashes_for_track(
    fp: &Fingerprinter,
    audio_path: &Path,
    cache_path: Option<&Path>,
) -> Result<Vec<HashRow>, lyricsync::error::DecodeError> {
    if let Some(cache_path) = cache_path {
        if cache_path.exists() {
            match FingerprintCache::load(cache_path) {
                Ok(cache) => {
                    log::info!("loaded fingerprint cache {}", cache_path.display());
                    return Ok(cache.into_rows());
                }
                Err(e) => {
                    log::warn!(
                        "failed to load fingerprint cache {}: {}, recomputing",
                        cache_path.display(),
                        e
                    );
                }
            }
        }
    }

    let hashes = fp.fingerprint_file(audio_path)?;
    if let Some(cache_path) = cache_path {
        if let Err(e) = FingerprintCache::from_rows(&hashes).save(cache_path) {
            log::warn!("failed to write fingerprint cache {}: {}", cache_path.display(), e);
        }
    }
    Ok(hashes)
}

/// Batch-fingerprint every `[[tracks]]` entry, collecting per-track failures
/// and exiting non-zero if any track failed (C15).
fn run_index(config_path: &Path, config: &AppConfig) -> Result<(), i32> {
    let base = config_path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
    let store = match FingerprintStore::open(&store_path(config_path, config)) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("failed to open store: {}", e);
            return Err(1);
        }
    };
    let fp = Fingerprinter::new(fingerprinter_config(config));

    let mut failures = Vec::new();
    for track in &config.tracks {
        let audio_path = base.join(&track.audio_file);
        let cache_path = track.fingerprint_cache.as_ref().map(|c| base.join(c));
        let id = track
            .id
            .clone()
            .unwrap_or_else(|| track_id::track_id(&audio_path));

        match hashes_for_track(&fp, &audio_path, cache_path.as_deref()) {
            Ok(hashes) => {
                if let Err(e) = store.upsert_track(&id, &track.meta()) {
                    log::warn!("failed to upsert track metadata for {}: {}", id, e);
                    failures.push(id.clone());
                    continue;
                }
                if let Err(e) = store.replace_hashes(&id, &hashes) {
                    log::warn!("failed to write hashes for {}: {}", id, e);
                    failures.push(id.clone());
                    continue;
                }
                log::info!("indexed {} ({} hashes)", id, hashes.len());
            }
            Err(e) => {
                log::warn!("failed to fingerprint {}: {}", audio_path.display(), e);
                failures.push(id);
            }
        }
    }

    if !failures.is_empty() {
        eprintln!("failed to index {} track(s): {}", failures.len(), failures.join(", "));
        return Err(1);
    }
    Ok(())
}

fn run_listen(config_path: &Path, config: &AppConfig) -> Result<(), i32> {
    let base = config_path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
    let store = match FingerprintStore::open(&store_path(config_path, config)) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            eprintln!("failed to open store: {}", e);
            return Err(1);
        }
    };

    let fp = Fingerprinter::new(fingerprinter_config(config));
    let capacity = (config.audio.sample_rate as f64 * config.audio.listen_seconds) as usize;
    let buffer = Arc::new(lyricsync::buffer::RollingBuffer::new(capacity));

    let capture = CpalCapture::new(config.audio.device.clone());
    let spec = CaptureSpec {
        sample_rate: config.audio.sample_rate,
        block_size: (config.audio.sample_rate as f64 * config.audio.block_seconds) as usize,
    };
    let capture_buffer = Arc::clone(&buffer);
    let handle = match capture.open(spec, move |block| capture_buffer.write(block)) {
        Ok(h) => h,
        Err(e) => {
            eprintln!("failed to open capture device: {}", e);
            return Err(1);
        }
    };

    let session = LiveSession::start(
        Arc::clone(&buffer),
        Arc::clone(&store),
        fp,
        config.audio.listen_seconds,
        config.audio.match_every_seconds,
        config.audio.min_confidence,
        base,
    );

    println!("listening... press Ctrl-C to stop");
    loop {
        std::thread::sleep(Duration::from_millis(500));
        let snap = session.snapshot(Instant::now());
        match (&snap.track_id, snap.position_seconds) {
            (Some(id), Some(pos)) => {
                println!(
                    "{} @ {:.1}s  | {}",
                    id,
                    pos,
                    snap.current_lyric.as_deref().unwrap_or("")
                );
            }
            _ => println!("listening, no track identified yet"),
        }
    }

    // Unreachable without a shutdown signal; kept for symmetry with `stop()`.
    #[allow(unreachable_code)]
    {
        session.stop();
        drop(handle);
        Ok(())
    }
}
