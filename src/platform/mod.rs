// Scriptbridge platform abstraction
// Provides platform-specific paths for Windows, macOS and Linux, and the
// host capability seam through which the core reaches browser pages.
//
// Uses `cfg(target_os)` for conditional compilation to select the correct
// platform-specific implementation at compile time.

use std::path::PathBuf;

pub mod host;

#[cfg(target_os = "linux")]
mod linux;

#[cfg(target_os = "macos")]
mod macos;

#[cfg(target_os = "windows")]
mod windows;

/// Returns the platform-specific configuration directory.
///
/// - **Linux**: `~/.config/scriptbridge` (or `$XDG_CONFIG_HOME/scriptbridge`)
/// - **macOS**: `~/Library/Application Support/Scriptbridge`
/// - **Windows**: `%APPDATA%/Scriptbridge`
pub fn get_config_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        linux::get_config_dir()
    }
    #[cfg(target_os = "macos")]
    {
        macos::get_config_dir()
    }
    #[cfg(target_os = "windows")]
    {
        windows::get_config_dir()
    }
}

/// Returns the platform-specific data directory holding the script database.
///
/// - **Linux**: `~/.local/share/scriptbridge` (or `$XDG_DATA_HOME/scriptbridge`)
/// - **macOS**: `~/Library/Application Support/Scriptbridge`
/// - **Windows**: `%APPDATA%/Scriptbridge`
pub fn get_data_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        linux::get_data_dir()
    }
    #[cfg(target_os = "macos")]
    {
        macos::get_data_dir()
    }
    #[cfg(target_os = "windows")]
    {
        windows::get_data_dir()
    }
}
