use std::sync::Arc;

use url::Url;

use crate::config::Config;
use crate::jobs::{JobRegistry, JobRunner};
use crate::observability::Metrics;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// `server.public_base_url`, parsed once for building links
    pub public_base_url: Arc<Url>,
    pub runner: JobRunner,
    pub registry: Arc<JobRegistry>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(config: Config, runner: JobRunner) -> Result<Self, url::ParseError> {
        let public_base_url = Url::parse(&config.server.public_base_url)?;

        Ok(Self {
            config: Arc::new(config),
            public_base_url: Arc::new(public_base_url),
            registry: runner.registry().clone(),
            metrics: runner.metrics().clone(),
            runner,
        })
    }
}
