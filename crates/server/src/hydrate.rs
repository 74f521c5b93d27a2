//! Page hydration.
//!
//! Turns a page request into HTML by fetching the page's JSON partial through the
//! partial strategy and filling the cached page template with it.

use tether_client::{FetchResponse, Request, Strategy};
use tether_core::{Error, Partial};

use crate::offline::OfflineFallback;
use crate::router::RouteOutcome;
use crate::template::PageTemplate;
use crate::templates::TemplateManager;

/// Site-wide values used when a partial does not carry its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteDefaults {
    pub site_name: String,
    pub default_feed_path: String,
}

/// Where a page path leads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PagePath {
    /// Render the page whose HTML path is given.
    Html(String),
    /// Redirect to the same path with a trailing slash.
    Redirect(String),
}

impl PagePath {
    /// `/foo.html` stays, `/foo/` becomes `/foo/index.html`, `/foo` redirects to `/foo/`.
    pub fn normalize(path: &str) -> Self {
        if path.ends_with(".html") {
            PagePath::Html(path.to_string())
        } else if path.ends_with('/') {
            PagePath::Html(format!("{path}index.html"))
        } else {
            PagePath::Redirect(format!("{path}/"))
        }
    }
}

/// The JSON partial path for a normalized `.html` path.
pub fn partial_path(html_path: &str) -> String {
    let stem = html_path.strip_suffix(".html").unwrap_or(html_path);
    format!("{stem}.json")
}

pub struct Hydrator {
    partials: Strategy,
    templates: TemplateManager,
    offline: OfflineFallback,
    site: SiteDefaults,
    /// Architecture revision stamped into every page so a reconnecting window can
    /// tell it was served by an older worker.
    architecture: String,
}

impl Hydrator {
    pub fn new(
        partials: Strategy, templates: TemplateManager, offline: OfflineFallback, site: SiteDefaults,
        architecture: impl Into<String>,
    ) -> Self {
        Self { partials, templates, offline, site, architecture: architecture.into() }
    }

    pub async fn handle(&self, request: &Request) -> RouteOutcome {
        match self.hydrate(request).await {
            Ok(response) => RouteOutcome::Handled(response),
            Err(err) => RouteOutcome::Fallthrough(err),
        }
    }

    async fn hydrate(&self, request: &Request) -> Result<FetchResponse, Error> {
        let html_path = match PagePath::normalize(request.url.path()) {
            PagePath::Html(path) => path,
            PagePath::Redirect(path) => {
                let location = match request.url.query() {
                    Some(query) => format!("{path}?{query}"),
                    None => path,
                };
                tracing::debug!(url = %request.url, %location, "redirecting to slash-terminated path");
                return FetchResponse::moved_permanently(request.url.clone(), &location);
            }
        };

        let mut partial_url = request.url.clone();
        partial_url.set_path(&partial_path(&html_path));
        partial_url.set_query(None);

        let response = match self.partials.handle(&Request::get(partial_url.clone())).await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(url = %partial_url, "partial unavailable, serving offline partial: {err}");
                self.offline.partial_response().await
            }
        };

        if !response.is_ok() {
            return Err(Error::UnexpectedStatus { status: response.status.as_u16(), url: response.url.to_string() });
        }

        let partial: Partial = serde_json::from_slice(&response.bytes)?;
        let template = PageTemplate::parse(&self.templates.resolve_for(&partial).await?)?;
        let html = template.render(&self.head(&partial), &partial.raw);

        Ok(FetchResponse::synthesized(request.url.clone(), response.status, "text/html", html))
    }

    /// Head markup for `partial`: offline flag, architecture, title and alternate feed link.
    pub fn head(&self, partial: &Partial) -> String {
        let site = &self.site.site_name;
        let title = partial.title.as_deref().filter(|title| !title.is_empty());

        let mut head = String::new();
        if partial.offline {
            head.push_str("<meta name=\"offline\" value=\"true\" />\n");
        }
        head.push_str(&format!(
            "<meta name=\"tether-architecture\" content=\"{}\" />\n",
            escape_html(&self.architecture)
        ));
        head.push_str(&format!("<title>{}</title>\n", escape_html(title.unwrap_or(site))));

        let feed = partial.rss.as_deref().unwrap_or(&self.site.default_feed_path);
        let feed_title = match title {
            Some(title) if feed != self.site.default_feed_path => format!("{title} on {site}"),
            _ => site.clone(),
        };
        head.push_str(&format!(
            "<link rel=\"alternate\" href=\"{}\" type=\"application/atom+xml\" title=\"{}\" />",
            escape_html(feed),
            escape_html(&feed_title)
        ));

        head
    }
}

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
