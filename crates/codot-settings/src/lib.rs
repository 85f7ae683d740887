//! # codot-settings
//!
//! Configuration for the Codot server, loaded from three layers (in priority
//! order):
//! 1. **Compiled defaults**: [`CodotSettings::default()`]
//! 2. **User file**: `~/.codot/settings.json` or an explicit path, deep-merged
//!    over defaults
//! 3. **Environment variables**: `CODOT_*` overrides (highest priority)
//!
//! Command-line flags are applied by the binary on top of the loaded value.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol() {
        let settings = CodotSettings::default();
        assert_eq!(settings.server.port, codot_core::DEFAULT_PORT);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.events.queue_capacity, 100);
        assert!(!settings.events.clear_on_disconnect);
        assert_eq!(settings.debugger.log_capacity, 1000);
    }
}
