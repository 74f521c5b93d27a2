//! Worker assembly: the route table, hydration pipeline and lifecycle built from config.

use std::sync::Arc;

use tether_client::{CacheableResponse, Network, Request, Strategy};
use tether_core::{AppConfig, CacheDb, CacheName, Error};
use url::Url;

use crate::hydrate::{Hydrator, SiteDefaults};
use crate::lifecycle::{ActivationReport, InstallContext, Lifecycle};
use crate::offline::OfflineFallback;
use crate::router::{Dispatch, Handler, Matcher, Route, RouteClass, Router};
use crate::runtime::{Clients, Registration};
use crate::templates::TemplateManager;

pub struct Worker {
    router: Router,
    lifecycle: Lifecycle,
}

impl Worker {
    pub fn new(
        config: &AppConfig, db: CacheDb, network: Arc<dyn Network>, registration: Arc<dyn Registration>,
        clients: Arc<dyn Clients>,
    ) -> Result<Self, Error> {
        let origin = config.origin_url().map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let same_origin = |path: &str| origin.join(path).map_err(|e| Error::InvalidUrl(format!("{path}: {e}")));
        let cross_origin = |url: &str| Url::parse(url).map_err(|e| Error::InvalidUrl(format!("{url}: {e}")));

        let templates = TemplateManager::new(
            db.clone(),
            network.clone(),
            same_origin(&config.template_path)?,
            config.precache_concurrency,
        );
        let offline = OfflineFallback::new(db.clone(), same_origin(&config.offline_partial_path)?);

        let partials = Strategy::network_first(CacheName::Partials, db.clone(), network.clone());
        let hydrator = Hydrator::new(
            partials.clone(),
            templates.clone(),
            offline.clone(),
            SiteDefaults { site_name: config.site_name.clone(), default_feed_path: config.default_feed_path.clone() },
            config.architecture_revision.clone(),
        );

        let mut router = Router::new(&origin, offline, network.clone());
        router.register(Route::new(
            RouteClass::FontStylesheet,
            Matcher::origin(&cross_origin(&config.font_stylesheet_origin)?),
            Handler::Strategy(Strategy::stale_while_revalidate(CacheName::FontStylesheets, db.clone(), network.clone())),
        ));
        router.register(Route::new(
            RouteClass::FontFile,
            Matcher::origin(&cross_origin(&config.font_file_origin)?),
            Handler::Strategy(
                Strategy::cache_first(CacheName::FontFiles, db.clone(), network.clone())
                    .with_cacheable(CacheableResponse::statuses(&[200])),
            ),
        ));
        router.register(Route::new(
            RouteClass::Partial,
            Matcher::same_origin_path(r"\.json$")?,
            Handler::Strategy(partials),
        ));
        router.register(Route::new(
            RouteClass::Image,
            Matcher::same_origin_path(r"^/images/.*\.(png|svg|jpe?g|gif|webp)$")?,
            Handler::Strategy(Strategy::cache_first(CacheName::Assets, db.clone(), network)),
        ));
        router.register(Route::new(
            RouteClass::Page,
            Matcher::same_origin_path(r"^[^.]*(\.html)?$")?,
            Handler::Hydrate(Arc::new(hydrator)),
        ));

        let lifecycle = Lifecycle::new(db, templates, registration, clients, config.architecture_revision.clone());

        Ok(Self { router, lifecycle })
    }

    pub async fn install(&self) -> Result<InstallContext, Error> {
        self.lifecycle.install().await
    }

    pub async fn activate(&self, context: InstallContext) -> Result<ActivationReport, Error> {
        self.lifecycle.activate(context).await
    }

    /// Route an intercepted request.
    pub async fn handle(&self, request: &Request) -> Dispatch {
        self.router.handle(request).await
    }
}
