//! Documents exchanged with the origin: content partials and the page template.
//!
//! Field names follow the origin's JSON (`resourcesVersion`, `builtAt`).

use serde::{Deserialize, Serialize};

/// Renderable content for a single page, independent of the surrounding template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Partial {
    /// Body markup fragment.
    #[serde(default)]
    pub raw: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Alternate feed URL for this page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rss: Option<String>,
    /// Set on the canned offline substitute.
    #[serde(default)]
    pub offline: bool,
    /// Asset build this partial was generated against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources_version: Option<String>,
    /// Generation timestamp (milliseconds since the epoch).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub built_at: Option<i64>,
}

impl Partial {
    /// The in-memory stand-in used when no offline partial was ever precached.
    pub fn dev_offline() -> Self {
        Self { raw: "<h1>Dev offline</h1>".into(), title: Some(String::new()), offline: true, ..Default::default() }
    }
}

/// One asset listed in the template document's manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub url: String,
}

/// The template endpoint's response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateDocument {
    pub template: String,
    #[serde(default)]
    pub manifest: Vec<ManifestEntry>,
    #[serde(default)]
    pub resources_version: String,
    #[serde(default)]
    pub built_at: i64,
}

impl TemplateDocument {
    /// Split off the manifest, which only drives precaching and is never persisted.
    pub fn into_parts(self) -> (TemplateBundle, Vec<ManifestEntry>) {
        let bundle = TemplateBundle {
            template: self.template,
            resources_version: self.resources_version,
            built_at: self.built_at,
        };
        (bundle, self.manifest)
    }
}

/// The persisted template record stored in the core cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateBundle {
    pub template: String,
    #[serde(default)]
    pub resources_version: String,
    #[serde(default)]
    pub built_at: i64,
}

impl TemplateBundle {
    /// An empty resources version marks a development build; such bundles are always refreshed.
    pub fn is_dev(&self) -> bool {
        self.resources_version.is_empty()
    }

    /// Whether this bundle can render `partial` without a refresh.
    ///
    /// True when the resources versions agree, or when the bundle was built strictly
    /// after the partial (a newer template over an older cached or offline partial).
    pub fn is_current_for(&self, partial: &Partial) -> bool {
        if self.is_dev() {
            return false;
        }
        if partial.resources_version.as_deref() == Some(self.resources_version.as_str()) {
            return true;
        }
        partial.built_at.is_some_and(|built_at| self.built_at > built_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(resources_version: &str, built_at: i64) -> TemplateBundle {
        TemplateBundle { template: "<html></html>".into(), resources_version: resources_version.into(), built_at }
    }

    #[test]
    fn test_partial_deserialize_minimal() {
        let partial: Partial = serde_json::from_str(r#"{"raw":"<p>hi</p>"}"#).unwrap();
        assert_eq!(partial.raw, "<p>hi</p>");
        assert!(!partial.offline);
        assert!(partial.title.is_none());
        assert!(partial.built_at.is_none());
    }

    #[test]
    fn test_partial_deserialize_full() {
        let json = r#"{"raw":"<p>hi</p>","title":"Hi","rss":"/blog/feed.xml","offline":true,
            "resourcesVersion":"r1","builtAt":5}"#;
        let partial: Partial = serde_json::from_str(json).unwrap();
        assert_eq!(partial.title.as_deref(), Some("Hi"));
        assert_eq!(partial.rss.as_deref(), Some("/blog/feed.xml"));
        assert!(partial.offline);
        assert_eq!(partial.resources_version.as_deref(), Some("r1"));
        assert_eq!(partial.built_at, Some(5));
    }

    #[test]
    fn test_dev_offline_partial() {
        let partial = Partial::dev_offline();
        assert!(partial.offline);
        assert_eq!(partial.raw, "<h1>Dev offline</h1>");
        assert_eq!(partial.title.as_deref(), Some(""));
    }

    #[test]
    fn test_document_into_parts_strips_manifest() {
        let json = r#"{"template":"<html></html>","manifest":[{"url":"/a.css"},{"url":"/b.js"}],
            "resourcesVersion":"r1","builtAt":10}"#;
        let doc: TemplateDocument = serde_json::from_str(json).unwrap();
        let (bundle, manifest) = doc.into_parts();
        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest[0].url, "/a.css");

        let persisted = serde_json::to_value(&bundle).unwrap();
        assert!(persisted.get("manifest").is_none());
        assert_eq!(persisted["resourcesVersion"], "r1");
        assert_eq!(persisted["builtAt"], 10);
    }

    #[test]
    fn test_current_when_versions_match() {
        let partial = Partial { resources_version: Some("r1".into()), built_at: Some(50), ..Default::default() };
        assert!(bundle("r1", 10).is_current_for(&partial));
    }

    #[test]
    fn test_current_when_bundle_newer() {
        let partial = Partial { resources_version: Some("r0".into()), built_at: Some(5), ..Default::default() };
        assert!(bundle("r1", 10).is_current_for(&partial));
    }

    #[test]
    fn test_stale_when_bundle_older_and_versions_differ() {
        let partial = Partial { resources_version: Some("r2".into()), built_at: Some(20), ..Default::default() };
        assert!(!bundle("r1", 10).is_current_for(&partial));
    }

    #[test]
    fn test_equal_built_at_is_not_newer() {
        let partial = Partial { resources_version: Some("r2".into()), built_at: Some(10), ..Default::default() };
        assert!(!bundle("r1", 10).is_current_for(&partial));
    }

    #[test]
    fn test_stale_when_partial_has_no_metadata() {
        let partial = Partial::dev_offline();
        assert!(!bundle("r1", 10).is_current_for(&partial));
    }

    #[test]
    fn test_dev_bundle_never_current() {
        let partial = Partial { resources_version: Some(String::new()), built_at: Some(0), ..Default::default() };
        assert!(bundle("", 10).is_dev());
        assert!(!bundle("", 10).is_current_for(&partial));
    }
}
