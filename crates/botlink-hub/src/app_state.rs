//! Shared application state for the hub process.

use std::sync::Arc;

use botlink_core::protocol::PacketRegistry;

use crate::config::HubConfig;
use crate::environment::Environments;
use crate::filter::WordFilter;
use crate::journal::ErrorJournal;
use crate::manager::{MessageManager, MessageModule};
use crate::modules::PingModule;
use crate::sender::{HttpCatIllustrator, StatusIllustrator};

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: HubConfig,
    registry: Arc<PacketRegistry>,
    environments: Environments,
    manager: Arc<MessageManager>,
    journal: Arc<ErrorJournal>,
    filter: Arc<WordFilter>,
    illustrator: Arc<dyn StatusIllustrator>,
}

impl AppState {
    pub fn new(cfg: HubConfig) -> Self {
        let modules: Vec<Arc<dyn MessageModule>> = vec![Arc::new(PingModule::new())];
        Self::with_modules(cfg, modules)
    }

    pub fn with_modules(cfg: HubConfig, modules: Vec<Arc<dyn MessageModule>>) -> Self {
        let filter = Arc::new(WordFilter::new(cfg.filter_words.clone()));
        Self {
            inner: Arc::new(AppStateInner {
                cfg,
                registry: Arc::new(PacketRegistry::standard()),
                environments: Environments::new(),
                manager: Arc::new(MessageManager::new(modules)),
                journal: Arc::new(ErrorJournal::new()),
                filter,
                illustrator: Arc::new(HttpCatIllustrator::new()),
            }),
        }
    }

    pub fn cfg(&self) -> &HubConfig {
        &self.inner.cfg
    }

    pub fn registry(&self) -> Arc<PacketRegistry> {
        Arc::clone(&self.inner.registry)
    }

    pub fn environments(&self) -> &Environments {
        &self.inner.environments
    }

    pub fn manager(&self) -> Arc<MessageManager> {
        Arc::clone(&self.inner.manager)
    }

    pub fn journal(&self) -> Arc<ErrorJournal> {
        Arc::clone(&self.inner.journal)
    }

    pub fn filter(&self) -> Arc<WordFilter> {
        Arc::clone(&self.inner.filter)
    }

    pub fn illustrator(&self) -> Arc<dyn StatusIllustrator> {
        Arc::clone(&self.inner.illustrator)
    }
}
