//! Caller identity resolution.
//!
//! [`IdentityResolver`] turns a caller number into a display name through a
//! [`ContactDirectory`]. Every failure mode (no contacts capability, lookup
//! error, timeout, no match) collapses into [`UNKNOWN_CALLER`]; nothing is
//! propagated to the state machine.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::event::{HIDDEN_NUMBER, UNKNOWN_CALLER};
use crate::permissions::{CapabilityKind, SharedCapabilityStore, is_granted};

/// Contacts-like directory supplied by the platform shell.
#[async_trait]
pub trait ContactDirectory: Send + Sync {
    /// Look up the display name registered for `number`.
    async fn lookup(&self, number: &str) -> anyhow::Result<Option<String>>;
}

/// In-memory directory keyed by normalized phone number.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    entries: BTreeMap<String, String>,
}

impl StaticDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(number, name)` pairs.
    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut dir = Self::new();
        for (number, name) in entries {
            dir.insert(number.as_ref(), name);
        }
        dir
    }

    pub fn insert(&mut self, number: &str, name: impl Into<String>) {
        self.entries.insert(normalize_number(number), name.into());
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn find(&self, number: &str) -> Option<&String> {
        let key = normalize_number(number);
        if key.is_empty() {
            return None;
        }
        if let Some(name) = self.entries.get(&key) {
            return Some(name);
        }
        // Loose match on the subscriber digits so "+1 555 0100" finds "5550100".
        // Longest shared suffix wins; ties go to the lowest stored number.
        self.entries
            .iter()
            .map(|(stored, name)| (common_suffix_len(stored, &key), stored, name))
            .filter(|(shared, _, _)| *shared >= MIN_SUFFIX_DIGITS)
            .max_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.cmp(a.1)))
            .map(|(_, _, name)| name)
    }
}

#[async_trait]
impl ContactDirectory for StaticDirectory {
    async fn lookup(&self, number: &str) -> anyhow::Result<Option<String>> {
        Ok(self.find(number).cloned())
    }
}

const MIN_SUFFIX_DIGITS: usize = 7;

/// Strip formatting from a dial string, keeping digits and a leading `+`.
#[must_use]
pub fn normalize_number(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut out = String::with_capacity(trimmed.len());
    if trimmed.starts_with('+') {
        out.push('+');
    }
    out.extend(trimmed.chars().filter(char::is_ascii_digit));
    out
}

fn common_suffix_len(a: &str, b: &str) -> usize {
    let a = a.trim_start_matches('+').bytes().rev();
    let b = b.trim_start_matches('+').bytes().rev();
    a.zip(b).take_while(|(x, y)| x == y).count()
}

/// Resolves caller numbers to display names, never failing.
#[derive(Clone)]
pub struct IdentityResolver {
    directory: Arc<dyn ContactDirectory>,
    capabilities: SharedCapabilityStore,
    timeout: Duration,
}

impl IdentityResolver {
    pub fn new(
        directory: Arc<dyn ContactDirectory>,
        capabilities: SharedCapabilityStore,
        timeout: Duration,
    ) -> Self {
        Self {
            directory,
            capabilities,
            timeout,
        }
    }

    /// Resolve `number` to a contact name, or [`UNKNOWN_CALLER`].
    pub async fn resolve(&self, number: &str) -> String {
        let number = number.trim();
        if number.is_empty() || number == HIDDEN_NUMBER {
            return UNKNOWN_CALLER.to_owned();
        }
        if !is_granted(&self.capabilities, CapabilityKind::ReadContacts) {
            debug!("contacts capability not granted; caller left unidentified");
            return UNKNOWN_CALLER.to_owned();
        }

        // The directory runs in its own task so a panicking provider is
        // contained here.
        let directory = Arc::clone(&self.directory);
        let owned = number.to_owned();
        let mut lookup = tokio::spawn(async move { directory.lookup(&owned).await });

        match tokio::time::timeout(self.timeout, &mut lookup).await {
            Ok(Ok(Ok(Some(name)))) if !name.trim().is_empty() => name.trim().to_owned(),
            Ok(Ok(Ok(_))) => UNKNOWN_CALLER.to_owned(),
            Ok(Ok(Err(e))) => {
                warn!(error = %e, "contact lookup failed");
                UNKNOWN_CALLER.to_owned()
            }
            Ok(Err(e)) => {
                warn!(error = %e, "contact lookup task aborted");
                UNKNOWN_CALLER.to_owned()
            }
            Err(_) => {
                lookup.abort();
                warn!(timeout_ms = self.timeout.as_millis() as u64, "contact lookup timed out");
                UNKNOWN_CALLER.to_owned()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::permissions::CapabilityStore;

    struct FailingDirectory;

    #[async_trait]
    impl ContactDirectory for FailingDirectory {
        async fn lookup(&self, _number: &str) -> anyhow::Result<Option<String>> {
            anyhow::bail!("contacts provider crashed")
        }
    }

    struct SlowDirectory;

    #[async_trait]
    impl ContactDirectory for SlowDirectory {
        async fn lookup(&self, _number: &str) -> anyhow::Result<Option<String>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Some("Too Late".to_owned()))
        }
    }

    struct PanickingDirectory;

    #[async_trait]
    impl ContactDirectory for PanickingDirectory {
        async fn lookup(&self, _number: &str) -> anyhow::Result<Option<String>> {
            panic!("contacts provider bug")
        }
    }

    fn granted() -> SharedCapabilityStore {
        CapabilityStore::with_granted(&[CapabilityKind::ReadContacts]).into_shared()
    }

    fn resolver(directory: Arc<dyn ContactDirectory>, caps: SharedCapabilityStore) -> IdentityResolver {
        IdentityResolver::new(directory, caps, Duration::from_millis(100))
    }

    #[test]
    fn normalize_number_strips_formatting() {
        assert_eq!(normalize_number(" +1 (555) 010-0.99 "), "+1555010099");
        assert_eq!(normalize_number("555 0100"), "5550100");
        assert_eq!(normalize_number("abc"), "");
    }

    #[tokio::test]
    async fn resolves_known_number_with_different_formatting() {
        let dir = StaticDirectory::from_entries([("555-0100", "Ada Lovelace")]);
        let r = resolver(Arc::new(dir), granted());
        assert_eq!(r.resolve("555 0100").await, "Ada Lovelace");
    }

    #[tokio::test]
    async fn resolves_on_subscriber_suffix() {
        let dir = StaticDirectory::from_entries([("5550100", "Ada")]);
        let r = resolver(Arc::new(dir), granted());
        assert_eq!(r.resolve("+1 555 0100").await, "Ada");
        assert_eq!(r.resolve("0100").await, UNKNOWN_CALLER);
    }

    #[tokio::test]
    async fn suffix_match_prefers_longest_then_lowest_number() {
        let dir = StaticDirectory::from_entries([
            ("+445550100", "Ada UK"),
            ("+15550100", "Ada US"),
        ]);
        let r = resolver(Arc::new(dir), granted());
        assert_eq!(r.resolve("00445550100").await, "Ada UK");
        for _ in 0..5 {
            assert_eq!(r.resolve("5550100").await, "Ada US");
        }
    }

    #[tokio::test]
    async fn unknown_number_resolves_to_unknown() {
        let r = resolver(Arc::new(StaticDirectory::new()), granted());
        assert_eq!(r.resolve("5550199").await, UNKNOWN_CALLER);
    }

    #[tokio::test]
    async fn empty_and_sentinel_skip_lookup() {
        let r = resolver(Arc::new(FailingDirectory), granted());
        assert_eq!(r.resolve("").await, UNKNOWN_CALLER);
        assert_eq!(r.resolve(HIDDEN_NUMBER).await, UNKNOWN_CALLER);
    }

    #[tokio::test]
    async fn missing_contacts_capability_resolves_to_unknown() {
        let dir = StaticDirectory::from_entries([("5550100", "Ada")]);
        let r = resolver(Arc::new(dir), CapabilityStore::default_shared());
        assert_eq!(r.resolve("5550100").await, UNKNOWN_CALLER);
    }

    #[tokio::test]
    async fn lookup_error_resolves_to_unknown() {
        let r = resolver(Arc::new(FailingDirectory), granted());
        assert_eq!(r.resolve("5550100").await, UNKNOWN_CALLER);
    }

    #[tokio::test]
    async fn slow_lookup_times_out_to_unknown() {
        let r = resolver(Arc::new(SlowDirectory), granted());
        let name = tokio::time::timeout(Duration::from_secs(2), r.resolve("5550100"))
            .await
            .expect("resolver should give up on its own");
        assert_eq!(name, UNKNOWN_CALLER);
    }

    #[tokio::test]
    async fn panicking_lookup_resolves_to_unknown() {
        let r = resolver(Arc::new(PanickingDirectory), granted());
        assert_eq!(r.resolve("5550100").await, UNKNOWN_CALLER);
    }
}
