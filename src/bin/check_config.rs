//! Resolves the configuration for the current environment, logs the settings
//! the assistant would run with and makes sure the audio backup directory is
//! usable.

use domain::settings;
use log::{error, info};
use meeting_ai::Operation;
use service::{config::Config, logging::Logger};

fn main() {
    let config = Config::new();
    if let Err(e) = Logger::init_logger(&config) {
        eprintln!("Failed to initialize logger: {e}");
        std::process::exit(1);
    }

    info!("Checking configuration [{}]...", config.runtime_env());

    let orchestrator = settings::orchestrator_config(&config);
    info!(
        "AI cache: {} ({:?}), debounce: {} (similarity {}), breaker: {} failures / {:?} cooldown",
        orchestrator.cache_enabled,
        settings::cache_strategy(&config),
        orchestrator.debounce_enabled,
        orchestrator.similarity_threshold,
        orchestrator.breaker.threshold,
        orchestrator.breaker.cooldown
    );
    for operation in Operation::ALL {
        let policy = orchestrator.policy(operation);
        info!(
            "{operation}: cache ttl {:?}, debounce {:?}, {} retries, timeout {:?}",
            orchestrator.cache_ttl(operation),
            orchestrator.debounce_window(operation),
            policy.retry.max_retries,
            policy.tuning.timeout
        );
    }

    let session = settings::session_config(&config);
    info!(
        "Transcription: flush every {:?} after {:?} idle, degrade after {} failures",
        session.flush_interval, session.flush_threshold, session.failure_threshold
    );

    if let Err(e) = std::fs::create_dir_all(&session.backup_dir) {
        error!(
            "Audio backup directory {} is not usable: {e}",
            session.backup_dir.display()
        );
        std::process::exit(1);
    }
    info!("Audio backups will be written to {}", session.backup_dir.display());
}
