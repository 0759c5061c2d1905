use crate::config::Config;
use crate::error::{ProxyError, Result};
use crate::fetch::{Fetcher, HttpFetcher};
use crate::intercept::{ContextRegistry, Interceptor, InterceptorSettings, NavigationContext};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub mod metrics;

pub use metrics::Metrics;

pub struct AppState {
    pub config: Arc<Config>,
    pub interceptor: Arc<Interceptor>,
    pub contexts: Arc<ContextRegistry>,
    pub metrics: Arc<Metrics>,
    pub shutdown_tx: tokio::sync::broadcast::Sender<()>,
}

impl AppState {
    /// State backed by the real HTTP fetcher.
    pub fn new(config: Config) -> Result<(Arc<Self>, tokio::sync::broadcast::Receiver<()>)> {
        let fetcher = HttpFetcher::new(&config).map_err(ProxyError::Fetch)?;
        Ok(Self::with_fetcher(config, Arc::new(fetcher)))
    }

    pub fn with_fetcher(
        config: Config,
        fetcher: Arc<dyn Fetcher>,
    ) -> (Arc<Self>, tokio::sync::broadcast::Receiver<()>) {
        let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(16);

        let interceptor = Arc::new(Interceptor::new(
            InterceptorSettings::from_config(&config),
            fetcher,
        ));

        let max_browsing_contexts = config.proxy.max_browsing_contexts;
        let state = Arc::new(Self {
            config: Arc::new(config),
            interceptor,
            contexts: Arc::new(ContextRegistry::with_capacity(
                max_browsing_contexts,
            )),
            metrics: Arc::new(Metrics::new()),
            shutdown_tx,
        });

        (state, shutdown_rx)
    }

    /// Context for `id`, created on first use.
    pub fn browsing_context(&self, id: &str) -> Arc<NavigationContext> {
        let context = self.contexts.get_or_create(id);
        self.metrics.set_browsing_contexts(self.contexts.len());
        context
    }

    pub fn close_browsing_context(&self, id: &str) -> bool {
        let removed = self.contexts.remove(id);
        self.metrics.set_browsing_contexts(self.contexts.len());
        removed
    }

    /// Drops browsing contexts idle for longer than the configured timeout.
    pub fn prune_idle_contexts(&self) -> usize {
        let Some(max_idle) = self.config.context_idle_timeout() else {
            return 0;
        };
        let pruned = self.contexts.prune_idle(max_idle);
        self.metrics.set_browsing_contexts(self.contexts.len());
        pruned
    }

    /// Periodically prunes idle browsing contexts until shutdown. Nothing is spawned
    /// when no idle timeout is configured.
    pub fn spawn_context_sweeper(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let max_idle = self.config.context_idle_timeout()?;
        let period = (max_idle / 2).max(Duration::from_secs(1));
        let state = self.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        state.prune_idle_contexts();
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        }))
    }

    /// Runs the install and activate hooks.
    pub async fn start(&self) -> Result<()> {
        self.interceptor.on_install().await;
        self.interceptor.on_activate().await?;
        Ok(())
    }

    pub fn shutdown(&self) {
        tracing::info!("Initiating application shutdown");
        let _ = self.shutdown_tx.send(());
    }
}
