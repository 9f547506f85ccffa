use std::path::{Path, PathBuf};

#[cfg(unix)]
pub fn mpv_socket_name() -> String {
    format!("{}/mpvrc-mpv.sock", std::env::temp_dir().display())
}

#[cfg(windows)]
pub fn mpv_socket_name() -> String {
    "mpvrc-mpv".to_string()
}

#[cfg(unix)]
pub fn mpv_socket_arg(socket: &str) -> String {
    format!("--input-ipc-server={}", socket)
}

#[cfg(windows)]
pub fn mpv_socket_arg(socket: &str) -> String {
    format!("--input-ipc-server=\\\\.\\pipe\\{}", socket)
}

pub fn data_dir() -> PathBuf {
    // XDG layout on macOS too, not Application Support
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".local")
            .join("share")
            .join("mpvrc")
    }
    #[cfg(windows)]
    {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mpvrc")
    }
}

pub fn config_dir() -> PathBuf {
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("mpvrc")
    }
    #[cfg(windows)]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mpvrc")
    }
}

#[cfg(unix)]
pub fn mpv_binary_name() -> &'static str {
    "mpv"
}

#[cfg(windows)]
pub fn mpv_binary_name() -> &'static str {
    "mpv.exe"
}

fn find_on_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|p| p.exists())
}

/// Find the mpv binary: an explicit override first, then beside the current
/// executable, then `PATH`.
pub fn find_mpv_binary(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = explicit {
        return p.exists().then(|| p.to_path_buf());
    }

    let exe_name = mpv_binary_name();
    if let Ok(current_exe) = std::env::current_exe() {
        if let Some(dir) = current_exe.parent() {
            let local_mpv = dir.join(exe_name);
            if local_mpv.exists() {
                return Some(local_mpv);
            }
        }
    }

    find_on_path(exe_name)
}

/// Filesystem roots: `/` on unix, every present drive letter on windows.
pub fn filesystem_roots() -> Vec<PathBuf> {
    #[cfg(unix)]
    {
        vec![PathBuf::from("/")]
    }
    #[cfg(windows)]
    {
        (b'A'..=b'Z')
            .map(|letter| PathBuf::from(format!("{}:\\", letter as char)))
            .filter(|p| p.exists())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_arg_embeds_socket_name() {
        let arg = mpv_socket_arg(&mpv_socket_name());
        assert!(arg.starts_with("--input-ipc-server="));
        assert!(arg.contains("mpvrc-mpv"));
    }

    #[test]
    fn explicit_mpv_binary_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("mpv");
        assert_eq!(find_mpv_binary(Some(&fake)), None);
        std::fs::write(&fake, b"").unwrap();
        assert_eq!(find_mpv_binary(Some(&fake)), Some(fake));
    }

    #[test]
    fn there_is_at_least_one_root() {
        assert!(!filesystem_roots().is_empty());
    }
}
