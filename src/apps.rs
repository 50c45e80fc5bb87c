//! Launchable-app catalogue and app launching.

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::AppsConfig;
use crate::platform::{InstalledPackage, PlatformHandler};

/// One entry of the app catalogue returned to the shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppEntry {
    pub name: String,
    pub package_name: String,
    pub is_system_app: bool,
}

/// Result of an app launch request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    Launched,
    /// No launcher entry; the store listing was opened instead.
    StoreListingOpened,
    /// No launcher entry and the store fallback is disabled.
    NotLaunchable,
    Failed,
}

impl LaunchOutcome {
    /// Whether the app itself was started.
    #[must_use]
    pub fn launched(self) -> bool {
        matches!(self, Self::Launched)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Launched => "launched",
            Self::StoreListingOpened => "store_listing_opened",
            Self::NotLaunchable => "not_launchable",
            Self::Failed => "failed",
        }
    }
}

/// Filter installed packages down to the apps the user can open.
///
/// System packages are hidden unless `include_system` is set, except for
/// system packages that have been updated. Packages without a launcher entry
/// or a readable label are skipped, as is `own_package`. Sorted by name.
#[must_use]
pub fn launchable_apps(
    packages: Vec<InstalledPackage>,
    own_package: &str,
    include_system: bool,
) -> Vec<AppEntry> {
    let mut apps: Vec<AppEntry> = packages
        .into_iter()
        .filter(|p| p.package_name != own_package)
        .filter(|p| include_system || !p.is_system || p.is_updated_system)
        .filter(|p| p.launchable)
        .filter_map(|p| {
            let Some(name) = p.label else {
                debug!(package = %p.package_name, "skipping package with unreadable label");
                return None;
            };
            Some(AppEntry {
                name,
                package_name: p.package_name,
                is_system_app: p.is_system,
            })
        })
        .collect();

    apps.sort_by(|a, b| {
        a.name
            .cmp(&b.name)
            .then_with(|| a.package_name.cmp(&b.package_name))
    });
    apps
}

/// Store listing URI for `package_name`.
#[must_use]
pub fn store_listing_uri(config: &AppsConfig, package_name: &str) -> String {
    format!("{}{package_name}", config.store_url_prefix)
}

/// Open `package_name`, falling back to its store listing when it has no
/// launcher entry and the fallback is enabled.
pub fn launch_app<P: PlatformHandler + ?Sized>(
    platform: &P,
    config: &AppsConfig,
    package_name: &str,
) -> LaunchOutcome {
    match platform.open_launcher(package_name) {
        Ok(true) => LaunchOutcome::Launched,
        Ok(false) if config.store_fallback => {
            let uri = store_listing_uri(config, package_name);
            match platform.open_uri(&uri) {
                Ok(()) => {
                    debug!(package = %package_name, %uri, "no launcher entry; opened store listing");
                    LaunchOutcome::StoreListingOpened
                }
                Err(e) => {
                    warn!(package = %package_name, error = %e, "failed to open store listing");
                    LaunchOutcome::Failed
                }
            }
        }
        Ok(false) => LaunchOutcome::NotLaunchable,
        Err(e) => {
            warn!(package = %package_name, error = %e, "app launch failed");
            LaunchOutcome::Failed
        }
    }
}
