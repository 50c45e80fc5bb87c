//! No-op platform for hosts without native device APIs.

use super::{InstalledPackage, PlatformHandler, WifiToggle};

/// Stub platform that exposes nothing.
///
/// Used by the headless host and on desktop builds. Queries return empty
/// results; device controls return errors.
pub struct StubPlatform;

impl PlatformHandler for StubPlatform {
    fn installed_packages(&self) -> anyhow::Result<Vec<InstalledPackage>> {
        Ok(Vec::new())
    }

    fn open_launcher(&self, _package_name: &str) -> anyhow::Result<bool> {
        Ok(false)
    }

    fn open_uri(&self, _uri: &str) -> anyhow::Result<()> {
        anyhow::bail!("opening URIs is not supported on this platform")
    }

    fn set_bluetooth(&self, _enable: bool) -> anyhow::Result<()> {
        anyhow::bail!("bluetooth control is not supported on this platform")
    }

    fn set_wifi(&self, _enable: bool) -> anyhow::Result<WifiToggle> {
        anyhow::bail!("wifi control is not supported on this platform")
    }

    fn place_call(&self, _uri: &str) -> anyhow::Result<()> {
        anyhow::bail!("placing calls is not supported on this platform")
    }
}
