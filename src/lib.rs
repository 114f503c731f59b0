//! # liquidd
//!
//! A Linux daemon that reads fan telemetry from NZXT Smart Device V2 class
//! controllers over hidraw and publishes it on D-Bus.
//!
//! ## Architecture
//!
//! - [`HidDevice`](hid::HidDevice) - one open hidraw node with a sequential
//!   async receive loop that never outlives its device
//! - [`Dispatcher`](drivers::dispatcher::Dispatcher) - routes reports by id
//!   to protocol handlers and owns the device's channels
//! - [`NzxtSmart2`](drivers::nzxt_smart2::NzxtSmart2) - report decoder and
//!   initialization commands
//! - [`SystemCoordinator`](coordinator::SystemCoordinator) - startup probing,
//!   services and shutdown
//! - [`EventBus`](event::EventBus) - telemetry and device error events
//!
//! ## Example
//!
//! ```no_run
//! use liquidd::{application::Application, config::ConfigManager};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config_manager = ConfigManager::load(None)?;
//!     tokio::runtime::Builder::new_current_thread()
//!         .enable_all()
//!         .build()?
//!         .block_on(async {
//!             Application::builder()
//!                 .with_config_manager(config_manager)
//!                 .build()?
//!                 .run()
//!                 .await
//!         })
//! }
//! ```

pub mod app_context;
pub mod application;
pub mod config;
pub mod coordinator;
pub mod drivers;
pub mod error;
pub mod event;
pub mod hid;
pub mod interface;
pub mod providers;
pub mod task_manager;
