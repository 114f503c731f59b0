//! System coordinator: startup probing, service lifecycle and the main loop.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use log::{error, info, warn};
use tokio::{
    signal::unix::{SignalKind, signal},
    sync::broadcast::{Receiver, error::RecvError},
};

use crate::{
    app_context::AppState,
    config::ConfigManager,
    event::{Event, EventBus},
    providers::{AppStateProvider, AsyncProvider, DBusServiceProvider, ServiceProvider},
    task_manager::TaskManager,
};

/// Owns the services and the bound drivers for the daemon's lifetime.
///
/// Startup enumerates devices once, starts a receive session per bound
/// driver and exports them. A device error drops that driver; SIGINT,
/// SIGTERM or a D-Bus `Stop` call stops every service and then drops
/// every driver, which cancels their outstanding reads.
pub struct SystemCoordinator {
    task_manager: TaskManager,
    event_bus: EventBus,
    event_rx: Option<Receiver<Event>>,
    shared_state: Option<Arc<AppState>>,
    service_providers: Vec<Box<dyn ServiceProvider>>,
}

impl Default for SystemCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemCoordinator {
    pub fn new() -> Self {
        let event_bus = EventBus::new();
        // Device sessions may fail before the main loop runs.
        let event_rx = Some(event_bus.subscribe());
        Self {
            task_manager: TaskManager::new(),
            event_bus,
            event_rx,
            shared_state: None,
            service_providers: Vec::new(),
        }
    }

    /// Probes devices and registers services.
    pub async fn initialize(&mut self, config_manager: ConfigManager) -> Result<()> {
        let provider = AppStateProvider::new(config_manager, self.event_bus.clone());
        self.initialize_with(provider).await
    }

    pub async fn initialize_with(&mut self, provider: AppStateProvider) -> Result<()> {
        info!("Initializing SystemCoordinator...");

        let state = provider
            .provide()
            .await
            .context("Failed to initialize application state")?;

        let dbus_events = self.event_bus.subscribe();
        start_sessions(&state);

        self.register_service_providers(state.clone(), dbus_events).await;
        self.shared_state = Some(state);

        info!("SystemCoordinator initialization completed");
        Ok(())
    }

    async fn register_service_providers(
        &mut self,
        state: Arc<AppState>,
        dbus_events: Receiver<Event>,
    ) {
        let mut providers: Vec<Box<dyn ServiceProvider>> = Vec::new();

        match DBusServiceProvider::new(state, self.event_bus.clone(), dbus_events).await {
            Ok(provider) => providers.push(Box::new(provider)),
            Err(e) => {
                warn!("Failed to create D-Bus service provider: {e:#}, skipping D-Bus service");
            }
        }

        providers.sort_by_key(|b| std::cmp::Reverse(b.priority()));
        self.service_providers = providers;

        info!(
            "Registered {} service providers in priority order",
            self.service_providers.len()
        );
    }

    /// Starts all registered services in priority order.
    ///
    /// Critical services must start successfully, while non-critical services
    /// can fail without stopping the system.
    pub async fn start_all_services(&mut self) -> Result<()> {
        for provider in &self.service_providers {
            let is_critical = provider.is_critical();

            match provider.start(&mut self.task_manager).await {
                Ok(()) => {
                    info!(
                        "Service '{}' started (priority: {}, critical: {})",
                        provider.name(),
                        provider.priority(),
                        is_critical
                    );
                }
                Err(e) if is_critical => {
                    return Err(e).with_context(|| {
                        format!("Critical service '{}' failed to start", provider.name())
                    });
                }
                Err(e) => {
                    warn!("Non-critical service '{}' failed to start: {e}", provider.name());
                }
            }
        }

        Ok(())
    }

    /// Runs until a shutdown signal or request arrives.
    pub async fn run_main_loop(&mut self) -> Result<()> {
        let mut event_rx = match self.event_rx.take() {
            Some(rx) => rx,
            None => self.event_bus.subscribe(),
        };
        let mut sigterm = signal(SignalKind::terminate()).context("SIGTERM handler")?;
        info!("Starting main event loop");

        loop {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        bail!("Failed to listen for shutdown signal: {e}");
                    }
                    info!("Received SIGINT, initiating graceful shutdown...");
                    break;
                }

                _ = sigterm.recv() => {
                    info!("Received SIGTERM, initiating graceful shutdown...");
                    break;
                }

                event = event_rx.recv() => {
                    if !self.handle_event(event)? {
                        break;
                    }
                }
            }
        }

        self.shutdown().await;
        info!("Main event loop terminated");
        Ok(())
    }

    /// Returns `false` once the loop should stop.
    fn handle_event(&mut self, event: Result<Event, RecvError>) -> Result<bool> {
        match event {
            Ok(Event::SystemShutdown) => {
                info!("Shutdown requested");
                return Ok(false);
            }
            Ok(Event::DeviceError { device, message }) => {
                error!("{}: session terminated: {message}", device.display());
                let removed = self
                    .shared_state
                    .as_ref()
                    .and_then(|state| state.remove_driver(&device));
                if let Some(driver) = removed {
                    info!("{}: {} released", device.display(), driver.type_name());
                }
            }
            Ok(Event::TelemetryUpdated { .. }) => {}
            Err(RecvError::Closed) => bail!("Event bus channel closed unexpectedly"),
            Err(RecvError::Lagged(n)) => warn!("Event bus lagged by {n} messages"),
        }
        Ok(true)
    }

    /// Stops services first; their exports only hold drivers weakly, so the
    /// drivers taken here are the last references and drop on return.
    async fn shutdown(&mut self) {
        info!("Initiating graceful shutdown...");

        if let Err(e) = self.task_manager.shutdown_all().await {
            error!("Error during task shutdown: {e:#}");
        }

        if let Some(state) = &self.shared_state {
            let drivers = state.take_drivers();
            info!("Releasing {} device(s)", drivers.len());
        }

        info!("Shutdown complete");
    }

    #[cfg(test)]
    const fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }
}

/// Starts every driver's receive session, then sends the initialization
/// commands when configured to. Init failures are logged per device.
fn start_sessions(state: &AppState) {
    let init = state.config().init_on_start;

    for driver in state.drivers() {
        driver.start();
        info!(
            "{}: {} receiving",
            driver.device_path().display(),
            driver.type_name()
        );

        if init {
            if let Err(e) = driver.init_device() {
                error!("{}: {e}", driver.device_path().display());
            }
        }
    }
}
