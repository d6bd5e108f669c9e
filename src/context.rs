use crate::config::Config;
use crate::observer::FrameObserver;
use crate::summary_store::SummaryStore;
use crate::taint_config::TaintConfig;
use std::sync::Arc;

/// Everything an analysis of one method needs besides the method itself.
///
/// The `TaintConfig` and `SummaryStore` are shared: a batch of methods
/// analyzed in parallel sees (and contributes to) the same store.
pub struct AnalysisContext {
    taint_config: Arc<dyn TaintConfig>,
    store: Arc<SummaryStore>,
    config: Config,
    observers: Vec<Box<dyn FrameObserver>>,
}

impl AnalysisContext {
    pub fn new(taint_config: Arc<dyn TaintConfig>, store: Arc<SummaryStore>) -> Self {
        Self {
            taint_config,
            store,
            config: Config::default(),
            observers: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn with_observer(mut self, observer: Box<dyn FrameObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn taint_config(&self) -> &dyn TaintConfig {
        self.taint_config.as_ref()
    }

    pub fn store(&self) -> &SummaryStore {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn observers(&self) -> &[Box<dyn FrameObserver>] {
        &self.observers
    }
}
