/// Supplies the local display name and platform details used in discovery.
///
/// Resolved once at coordinator construction. Applications embed their own
/// provider to control how the local node presents itself; the default reads
/// the host name from the OS.
pub trait LocalInfoProvider: Send + Sync {
    /// Display name for the local peer when the configuration does not set
    /// one explicitly.
    fn display_name(&self) -> String;

    /// OS version string advertised under the reserved `os-version` key.
    fn os_version(&self) -> String;

    /// Platform name advertised under the reserved `platform` key.
    fn platform(&self) -> String;
}

/// Default provider backed by the operating system.
#[derive(Debug, Default, Clone)]
pub struct SystemInfo;

impl LocalInfoProvider for SystemInfo {
    fn display_name(&self) -> String {
        hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "huddle-node".to_string())
    }

    fn os_version(&self) -> String {
        #[cfg(target_os = "linux")]
        {
            if let Ok(release) = std::fs::read_to_string("/proc/sys/kernel/osrelease") {
                return release.trim().to_string();
            }
        }
        "unknown".to_string()
    }

    fn platform(&self) -> String {
        std::env::consts::OS.to_string()
    }
}
