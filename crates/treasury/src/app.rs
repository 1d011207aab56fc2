//! Application lifecycle: configuration, startup, monitoring and shutdown.

use crate::cli::CliArgs;
use crate::config::TreasuryConfig;
use crate::error::TreasuryError;
use crate::lifecycle::{CoreStartedEvent, Lifecycle, Treasury};
use crate::logging::display_banner;
use crate::signals::wait_for_shutdown_signal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use treasury_event_system::EventPriority;
use treasury_services::ServiceEvent;

/// Applies command-line overrides on top of the loaded configuration.
pub fn apply_overrides(config: &mut TreasuryConfig, args: &CliArgs) {
    if let Some(log_level) = &args.log_level {
        config.logging.level = log_level.clone();
    }
    if args.json_logs {
        config.logging.json_format = true;
    }
}

/// The running host process.
pub struct Application {
    config: TreasuryConfig,
    once: bool,
    lifecycle: Lifecycle,
}

impl Application {
    /// Merges `config` with CLI overrides and validates the result.
    pub fn new(mut config: TreasuryConfig, args: &CliArgs) -> Result<Self, TreasuryError> {
        apply_overrides(&mut config, args);
        config.validate().map_err(TreasuryError::InvalidConfig)?;
        info!("✅ Configuration loaded and validated successfully");

        Ok(Self {
            config,
            once: args.once,
            lifecycle: Lifecycle::new(),
        })
    }

    pub fn config(&self) -> &TreasuryConfig {
        &self.config
    }

    /// Starts the core, announces it on the bus and installs the audit
    /// subscriber for registry notifications.
    pub async fn start(&self) -> Result<Arc<Treasury>, TreasuryError> {
        display_banner();
        let treasury = self.lifecycle.install(Treasury::start(&self.config)?)?;
        let bus = treasury.bus();

        bus.subscribe(
            bus.subscription_for::<dyn ServiceEvent>()
                .with_priority(EventPriority::Highest)
                .when_called(|event| {
                    let action = if event.is_registration() {
                        "registered"
                    } else {
                        "unregistered"
                    };
                    info!(
                        "🔌 {} {} {} ({:?})",
                        event.registrar_name(),
                        action,
                        event.capability_name(),
                        event.priority()
                    );
                    Ok(())
                })
                .complete_subscription()?,
        )?;

        let started = bus
            .fire(CoreStartedEvent {
                version: env!("CARGO_PKG_VERSION"),
                executor_thread_prefix: self.config.events.executor_thread_prefix.clone(),
            })
            .completed()
            .await?;
        info!("✅ Treasury v{} is now running", started.version);
        Ok(treasury)
    }

    /// Runs until a shutdown signal (or immediately with `--once`), then
    /// tears the core down.
    pub async fn run(self) -> Result<(), TreasuryError> {
        let treasury = self.start().await?;

        let interval_secs = self.config.events.stats_interval_secs;
        let monitor = (interval_secs > 0 && !self.once).then(|| {
            let treasury = Arc::clone(&treasury);
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
                interval.tick().await;
                let mut last_fired = 0;
                loop {
                    interval.tick().await;
                    let stats = treasury.stats();
                    info!(
                        "📊 Event bus - {} fires this period | {} subscribers | {} executors | {} capabilities",
                        stats.events_fired - last_fired,
                        stats.total_subscribers,
                        stats.executors,
                        treasury.services().capability_count()
                    );
                    last_fired = stats.events_fired;
                }
            })
        });

        if !self.once {
            info!("🛑 Press Ctrl+C to gracefully shutdown");
            if let Err(e) = wait_for_shutdown_signal().await {
                error!("❌ Failed to listen for shutdown signals: {e}");
            }
        }

        if let Some(monitor) = monitor {
            monitor.abort();
        }
        drop(treasury);

        // Executor joins block, so keep them off the runtime workers.
        let lifecycle = self.lifecycle;
        match tokio::task::spawn_blocking(move || lifecycle.shutdown()).await {
            Ok(true) => info!("✅ Treasury shutdown complete"),
            Ok(false) => warn!("⚠️ No Treasury core was running"),
            Err(e) => error!("❌ Shutdown task failed: {e}"),
        }
        Ok(())
    }
}
