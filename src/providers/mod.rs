//! Providers for application state and long-running services.

pub mod app_state;
pub mod dbus;
pub mod traits;

pub use app_state::AppStateProvider;
pub use dbus::DBusServiceProvider;
pub use traits::{AsyncProvider, ServiceProvider};
