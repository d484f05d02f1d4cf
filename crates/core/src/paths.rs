use std::path::PathBuf;

/// Name of the single-writer marker file inside the browser profile.
pub const LOCK_FILE_NAME: &str = "wadriver.lock";

#[derive(Debug, Clone)]
pub struct Paths {
    pub base: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

impl Paths {
    /// `$WADRIVER_HOME`, falling back to `~/.wadriver`.
    pub fn new() -> Self {
        if let Some(home) = std::env::var_os("WADRIVER_HOME").filter(|v| !v.is_empty()) {
            return Self {
                base: PathBuf::from(home),
            };
        }
        let base = dirs::home_dir()
            .map(|h| h.join(".wadriver"))
            .unwrap_or_else(|| PathBuf::from(".wadriver"));
        Self { base }
    }

    pub fn with_base(base: PathBuf) -> Self {
        Self { base }
    }

    pub fn config_file(&self) -> PathBuf {
        self.base.join("config.json")
    }

    /// Default persistent browser profile (overridable in config).
    pub fn default_profile_dir(&self) -> PathBuf {
        self.base.join("whatsapp_session")
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.base.join("artifacts")
    }

    pub fn pairing_qr_svg(&self) -> PathBuf {
        self.artifacts_dir().join("pairing_qr.svg")
    }

    pub fn pairing_canvas_png(&self) -> PathBuf {
        self.artifacts_dir().join("pairing_qr_canvas.png")
    }

    pub fn page_loaded_png(&self) -> PathBuf {
        self.artifacts_dir().join("page_loaded.png")
    }

    pub fn send_error_png(&self) -> PathBuf {
        self.artifacts_dir().join("send_error.png")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_layout() {
        let paths = Paths::with_base(PathBuf::from("/tmp/wd"));
        assert_eq!(paths.config_file(), PathBuf::from("/tmp/wd/config.json"));
        assert_eq!(
            paths.pairing_qr_svg(),
            PathBuf::from("/tmp/wd/artifacts/pairing_qr.svg")
        );
        assert_eq!(
            paths.default_profile_dir(),
            PathBuf::from("/tmp/wd/whatsapp_session")
        );
    }
}
