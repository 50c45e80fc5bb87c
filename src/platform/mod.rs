//! Native platform seam.
//!
//! The shell implements [`PlatformHandler`] on top of the real OS APIs
//! (package manager, radios, dialer). Everything above this trait is
//! platform-agnostic. Hosts without such APIs use [`StubPlatform`].

use serde::{Deserialize, Serialize};

mod stub;

pub use stub::StubPlatform;

/// One package as reported by the platform package manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledPackage {
    pub package_name: String,
    /// User-facing label, or `None` if the label could not be read.
    pub label: Option<String>,
    /// Shipped with the system image.
    pub is_system: bool,
    /// A system package the user has updated through the store.
    pub is_updated_system: bool,
    /// Has a launcher entry point.
    pub launchable: bool,
}

/// How a Wi-Fi toggle request was honoured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WifiToggle {
    /// The radio state was changed directly.
    Direct,
    /// Direct toggling is not allowed; the settings panel was opened instead.
    SettingsPanel,
}

impl WifiToggle {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::SettingsPanel => "settings_panel",
        }
    }
}

/// Device operations the native shell provides.
pub trait PlatformHandler: Send + Sync + 'static {
    /// All installed packages, unfiltered.
    fn installed_packages(&self) -> anyhow::Result<Vec<InstalledPackage>>;

    /// Open the launcher entry of `package_name`.
    ///
    /// Returns `false` when the package has no launcher entry.
    fn open_launcher(&self, package_name: &str) -> anyhow::Result<bool>;

    /// Open an arbitrary URI (store listings, settings pages).
    fn open_uri(&self, uri: &str) -> anyhow::Result<()>;

    fn set_bluetooth(&self, enable: bool) -> anyhow::Result<()>;

    fn set_wifi(&self, enable: bool) -> anyhow::Result<WifiToggle>;

    /// Start an outgoing call to a `tel:` URI.
    fn place_call(&self, uri: &str) -> anyhow::Result<()>;
}
