//! CLI commands for the coaching daemon: status/stop against a running
//! instance, and offline training of reference models.

use std::path::Path;

use anyhow::Result;

use coach_core::model::ReferenceModel;
use coach_core::registry;

/// Show daemon status by polling its `/status` endpoint.
pub async fn show_status(port: u16) -> Result<()> {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/status", port);

    match client.get(&url).send().await {
        Ok(response) => {
            if response.status().is_success() {
                let status: serde_json::Value = response.json().await?;
                println!("Coaching Daemon Status");
                println!("======================");
                println!("Version: {}", status["version"]);
                println!("Exercise: {}", status["exercise"]);
                println!("Uptime: {}s", status["uptime_secs"]);
                println!("Subscribers: {}", status["subscriber_count"]);
                println!("\nFrames:");
                println!("  Processed: {}", status["processed"]);
                println!("  Dropped: {}", status["dropped"]);
                println!("  Throttled: {}", status["throttled"]);
                println!("  Parse errors: {}", status["parse_errors"]);
                println!("  Reconnects: {}", status["reconnects"]);
            } else {
                println!("Daemon returned error: {}", response.status());
            }
        }
        Err(_) => {
            println!("Coaching daemon is not running on port {}", port);
            println!("Start it with: coachd start");
        }
    }

    Ok(())
}

/// Request a graceful shutdown of a running daemon.
pub async fn stop_daemon(port: u16) -> Result<()> {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/shutdown", port);

    match client.post(&url).send().await {
        Ok(_) => println!("Shutdown signal sent to daemon"),
        Err(_) => println!("Daemon is not running or already stopped"),
    }

    Ok(())
}

/// Trains a reference model for `exercise` from a corpus JSON file and
/// writes `<models_dir>/<exercise>_reference_model.{model.msgpack,meta.json}`.
pub fn train(corpus_path: &Path, exercise: &str, models_dir: &Path) -> Result<()> {
    let json = std::fs::read_to_string(corpus_path)?;
    let corpus = coach_core::parse_corpus(&json)?;
    let spec = registry::resolve(exercise)?;

    tracing::info!(
        exercise = spec.code,
        frames = corpus.frames.len(),
        "training reference model"
    );

    let model = coach_core::trainer::train(&corpus.frames, spec)?;

    std::fs::create_dir_all(models_dir)?;
    let base = models_dir.join(format!("{}_reference_model", spec.key.as_str()));
    model.save(&base)?;

    println!(
        "Trained {} reference frames for '{}' -> {}",
        model.n_frames(),
        spec.display_name,
        base.display()
    );

    Ok(())
}

/// Trains a model for `exercise` only if one does not already exist under
/// `models_dir`, mirroring the trainer's skip-if-present behavior.
pub fn ensure_model_exists(corpus_path: &Path, exercise: &str, models_dir: &Path) -> Result<()> {
    let spec = registry::resolve(exercise)?;
    let base = models_dir.join(format!("{}_reference_model", spec.key.as_str()));
    if ReferenceModel::load(&base).is_ok() {
        tracing::debug!(exercise = spec.code, "reference model already present, skipping training");
        return Ok(());
    }
    train(corpus_path, exercise, models_dir)
}

/// Scans `corpus_dir` for `*.json` reference corpora, each self-declaring
/// its exercise, and trains a model for every one that is not already
/// present under `models_dir`. Mirrors `ensure_models_exist` scanning a
/// directory of reference recordings at startup.
pub fn train_missing_from_dir(corpus_dir: &Path, models_dir: &Path) -> Result<()> {
    let mut trained = 0;
    let mut skipped = 0;
    for entry in std::fs::read_dir(corpus_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let json = std::fs::read_to_string(&path)?;
        let corpus = match coach_core::parse_corpus(&json) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unparsable corpus file");
                continue;
            }
        };
        let spec = registry::resolve(&corpus.exercise)?;
        let base = models_dir.join(format!("{}_reference_model", spec.key.as_str()));
        if ReferenceModel::load(&base).is_ok() {
            skipped += 1;
            continue;
        }
        let model = coach_core::trainer::train(&corpus.frames, spec)?;
        std::fs::create_dir_all(models_dir)?;
        model.save(&base)?;
        trained += 1;
        println!("Trained '{}' from {}", spec.display_name, path.display());
    }
    println!("Directory scan complete: {trained} trained, {skipped} already present");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_model_exists_skips_when_present() {
        // Exercised indirectly through ReferenceModel::load failing fast on
        // a missing path; full round trip is covered in coach-core's model
        // and trainer tests.
        assert!(ReferenceModel::load(Path::new("/nonexistent/base")).is_err());
    }
}
