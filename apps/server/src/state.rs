//! Shared application state

use std::sync::Arc;

use crate::{
    auth::AuthManager,
    batch::{BatchOrchestrator, DispatchExecutor, RequestBuilder, RetryPolicy},
    db::Databases,
    layers::LayerRegistry,
    security::{PermissionChecker, PolicyChecker},
    traversal::StoreTraverser,
    views::{ViewRegistration, ViewRegistry},
    Config, Result,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub databases: Databases,
    pub auth: AuthManager,
    pub layers: Arc<LayerRegistry>,
    pub views: Arc<ViewRegistry>,
    pub checker: Arc<dyn PermissionChecker>,
    pub executor: Arc<DispatchExecutor>,
    pub batch: Arc<BatchOrchestrator>,
}

/// Startup knobs that are not part of the configuration file.
#[derive(Default)]
pub struct AppStateOptions {
    /// Views registered in addition to the built-in ones.
    pub extra_views: Vec<ViewRegistration>,
    /// Use these databases instead of connecting from `storage` settings.
    pub databases: Option<Databases>,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self> {
        Self::new_with_options(config, AppStateOptions::default()).await
    }

    pub async fn new_with_options(config: Config, options: AppStateOptions) -> Result<Self> {
        let databases = match options.databases {
            Some(databases) => databases,
            None => Databases::connect(&config.storage).await?,
        };

        let layers = Arc::new(LayerRegistry::from_config(&config.layers));

        let mut views = ViewRegistry::with_defaults();
        for registration in options.extra_views {
            views.register(registration);
        }
        let views = Arc::new(views);
        tracing::info!(views = views.len(), "View registry ready");

        let checker: Arc<dyn PermissionChecker> = Arc::new(PolicyChecker::new());

        let executor = Arc::new(DispatchExecutor::new(
            Arc::new(StoreTraverser),
            Arc::clone(&views),
            Arc::clone(&checker),
            RetryPolicy::from(&config.batch),
        ));

        let batch = Arc::new(BatchOrchestrator::new(
            RequestBuilder::new(Arc::clone(&layers)),
            Arc::clone(&executor),
        ));

        Ok(Self {
            auth: AuthManager::new(config.auth.clone()),
            config: Arc::new(config),
            databases,
            layers,
            views,
            checker,
            executor,
            batch,
        })
    }
}
