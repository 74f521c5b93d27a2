//! Request routing.
//!
//! Routes are tried in registration order; the first whose matcher accepts the
//! URL handles the request. Handlers report `RouteOutcome::Fallthrough` instead
//! of failing, and the router then applies its catch policy:
//!
//! | failing route | recovery                          |
//! |---------------|-----------------------------------|
//! | partial       | serve the offline partial          |
//! | page          | direct, uncached network fetch     |
//! | anything else | pass the request through           |
//!
//! A recovery that fails itself also passes the request through.

use std::sync::Arc;

use axum::http::Method;
use regex::Regex;
use tether_client::{FetchResponse, Network, Request, Strategy};
use tether_core::Error;
use url::{Origin, Url};

use crate::hydrate::Hydrator;
use crate::offline::OfflineFallback;

/// Predicate over a request URL.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Any URL on the given cross-origin host.
    Origin(Origin),
    /// Same-origin URLs whose path matches the pattern.
    SameOriginPath(Regex),
}

impl Matcher {
    pub fn origin(url: &Url) -> Self {
        Matcher::Origin(url.origin())
    }

    pub fn same_origin_path(pattern: &str) -> Result<Self, Error> {
        let regex = Regex::new(pattern).map_err(|e| Error::InvalidInput(format!("route pattern {pattern}: {e}")))?;
        Ok(Matcher::SameOriginPath(regex))
    }

    pub fn matches(&self, url: &Url, own_origin: &Origin) -> bool {
        match self {
            Matcher::Origin(origin) => &url.origin() == origin,
            Matcher::SameOriginPath(regex) => &url.origin() == own_origin && regex.is_match(url.path()),
        }
    }
}

/// The shape of request a route serves; decides the catch policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    FontStylesheet,
    FontFile,
    Partial,
    Image,
    Page,
}

pub enum Handler {
    Strategy(Strategy),
    Hydrate(Arc<Hydrator>),
}

impl Handler {
    async fn run(&self, request: &Request) -> RouteOutcome {
        match self {
            Handler::Strategy(strategy) => match strategy.handle(request).await {
                Ok(response) => RouteOutcome::Handled(response),
                Err(err) => RouteOutcome::Fallthrough(err),
            },
            Handler::Hydrate(hydrator) => hydrator.handle(request).await,
        }
    }
}

pub struct Route {
    pub class: RouteClass,
    pub matcher: Matcher,
    pub handler: Handler,
}

impl Route {
    pub fn new(class: RouteClass, matcher: Matcher, handler: Handler) -> Self {
        Self { class, matcher, handler }
    }
}

/// What a handler did with a request.
#[derive(Debug)]
pub enum RouteOutcome {
    Handled(FetchResponse),
    /// The handler could not answer; the reason is logged by the catch policy.
    Fallthrough(Error),
}

/// What the front should do with a request.
#[derive(Debug)]
pub enum Dispatch {
    Respond(FetchResponse),
    /// Not intercepted: forward to the network untouched.
    Passthrough,
}

pub struct Router {
    own_origin: Origin,
    routes: Vec<Route>,
    offline: OfflineFallback,
    network: Arc<dyn Network>,
}

impl Router {
    pub fn new(origin: &Url, offline: OfflineFallback, network: Arc<dyn Network>) -> Self {
        Self { own_origin: origin.origin(), routes: Vec::new(), offline, network }
    }

    /// Append `route`; earlier routes take precedence.
    pub fn register(&mut self, route: Route) {
        self.routes.push(route);
    }

    /// The first route accepting `url`.
    pub fn find(&self, url: &Url) -> Option<&Route> {
        self.routes.iter().find(|route| route.matcher.matches(url, &self.own_origin))
    }

    pub async fn handle(&self, request: &Request) -> Dispatch {
        if request.method != Method::GET {
            return Dispatch::Passthrough;
        }
        let Some(route) = self.find(&request.url) else {
            return Dispatch::Passthrough;
        };

        match route.handler.run(request).await {
            RouteOutcome::Handled(response) => Dispatch::Respond(response),
            RouteOutcome::Fallthrough(reason) => self.recover(route.class, request, reason).await,
        }
    }

    async fn recover(&self, class: RouteClass, request: &Request, reason: Error) -> Dispatch {
        match class {
            RouteClass::Partial => {
                tracing::warn!(url = %request.url, code = reason.code(), "partial route failed, serving offline partial: {reason}");
                Dispatch::Respond(self.offline.partial_response().await)
            }
            RouteClass::Page => {
                tracing::debug!(url = %request.url, code = reason.code(), "page route fell through: {reason}");
                match self.network.fetch(request).await {
                    Ok(response) => Dispatch::Respond(response),
                    Err(err) => {
                        tracing::warn!(url = %request.url, "direct fetch failed: {err}");
                        Dispatch::Passthrough
                    }
                }
            }
            _ => {
                tracing::warn!(url = %request.url, ?class, code = reason.code(), "route failed, not intercepting: {reason}");
                Dispatch::Passthrough
            }
        }
    }
}
