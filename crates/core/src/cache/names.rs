//! The named caches and their eviction policies.

use std::time::Duration;

const DAY: u64 = 24 * 60 * 60;

/// One of the independently named caches. Each resource class gets its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheName {
    /// Template bundle, precached manifest assets and the offline partial.
    Core,
    /// JSON content partials.
    Partials,
    /// Same-origin images.
    Assets,
    /// External font stylesheets.
    FontStylesheets,
    /// External font files.
    FontFiles,
    /// Unbounded runtime cache from an older release; only ever deleted.
    LegacyRuntime,
}

impl CacheName {
    /// Caches in active use, in display order.
    pub const ACTIVE: [CacheName; 5] = [
        CacheName::Core,
        CacheName::Partials,
        CacheName::Assets,
        CacheName::FontStylesheets,
        CacheName::FontFiles,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheName::Core => "webdev-core",
            CacheName::Partials => "webdev-html-cache-v2",
            CacheName::Assets => "webdev-assets-cache-v1",
            CacheName::FontStylesheets => "webdev-fonts-stylesheets",
            CacheName::FontFiles => "webdev-fonts-webfonts",
            CacheName::LegacyRuntime => "webdev-html-cache-v1",
        }
    }

    /// Eviction policy applied by the strategy engine to this cache.
    pub fn expiration(&self) -> ExpirationPolicy {
        match self {
            CacheName::Core | CacheName::LegacyRuntime => ExpirationPolicy::unbounded(),
            CacheName::Partials => ExpirationPolicy::max_entries(50),
            CacheName::Assets => ExpirationPolicy::max_entries(100).with_max_age(Duration::from_secs(30 * DAY)),
            CacheName::FontStylesheets => ExpirationPolicy::max_entries(20),
            CacheName::FontFiles => ExpirationPolicy::max_entries(30).with_max_age(Duration::from_secs(365 * DAY)),
        }
    }
}

impl std::fmt::Display for CacheName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maximum age and/or maximum entry count for one cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExpirationPolicy {
    pub max_age: Option<Duration>,
    pub max_entries: Option<usize>,
}

impl ExpirationPolicy {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn max_entries(max_entries: usize) -> Self {
        Self { max_entries: Some(max_entries), ..Default::default() }
    }

    pub fn max_age(max_age: Duration) -> Self {
        Self { max_age: Some(max_age), ..Default::default() }
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn is_unbounded(&self) -> bool {
        self.max_age.is_none() && self.max_entries.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_cache_names_distinct() {
        let mut names: HashSet<&str> = CacheName::ACTIVE.iter().map(|c| c.as_str()).collect();
        assert_eq!(names.len(), CacheName::ACTIVE.len());
        assert!(names.insert(CacheName::LegacyRuntime.as_str()));
    }

    #[test]
    fn test_every_runtime_cache_is_bounded() {
        for name in [CacheName::Partials, CacheName::Assets, CacheName::FontStylesheets, CacheName::FontFiles] {
            assert!(!name.expiration().is_unbounded(), "{name} should have an eviction policy");
        }
        assert!(CacheName::Core.expiration().is_unbounded());
    }

    #[test]
    fn test_asset_policy_has_both_limits() {
        let policy = CacheName::Assets.expiration();
        assert_eq!(policy.max_entries, Some(100));
        assert_eq!(policy.max_age, Some(Duration::from_secs(30 * DAY)));
    }
}
