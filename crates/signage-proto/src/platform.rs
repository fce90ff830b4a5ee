use std::path::PathBuf;

pub fn mpv_socket_name() -> String {
    format!("{}/signage-mpv.sock", std::env::temp_dir().display())
}

pub fn mpv_socket_arg() -> String {
    format!("--input-ipc-server={}", mpv_socket_name())
}

/// ~/.local/share/signage/ — daemon log and runtime files.
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".local")
        .join("share")
        .join("signage")
}

/// ~/.config/signage/ — config.toml lives here.
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("signage")
}

/// Find mpv for playback: beside the current executable first (kiosk images
/// ship a bundled build), then PATH.
pub fn find_mpv_binary() -> Option<PathBuf> {
    if let Ok(current_exe) = std::env::current_exe() {
        if let Some(dir) = current_exe.parent() {
            let local_mpv = dir.join("mpv");
            if local_mpv.exists() {
                return Some(local_mpv);
            }
        }
    }

    if let Ok(path) = std::env::var("PATH") {
        for dir in path.split(':') {
            let mpv_path = PathBuf::from(dir).join("mpv");
            if mpv_path.exists() {
                return Some(mpv_path);
            }
        }
    }

    None
}
