//! Per-scenario state: configuration, dataset and call history.

use crate::api::Api;
use crate::config::Environment;
use crate::data::DataStore;
use crate::error::{Error, Result};
use crate::model::ApiSnapshot;
use crate::response::ResponseView;
use tracing::debug;

#[derive(Debug, Default)]
pub struct ScenarioContext {
    config: Environment,
    data: DataStore,
    apis: Vec<Api>,
    /// Set by collaborators (e.g. tag filtering); not enforced here.
    pub skipped: bool,
}

impl ScenarioContext {
    pub fn new(config: Environment) -> Self {
        let mut context = Self::default();
        context.set_config(config);
        context
    }

    /// Store the configuration and start a fresh dataset seeded with
    /// its secrets.
    pub fn set_config(&mut self, config: Environment) {
        let mut data = DataStore::new();
        for (key, value) in &config.secrets {
            data.insert_secret(key, value.clone());
        }
        debug!(
            environment = %config.name,
            secrets = config.secrets.len(),
            "scenario configured"
        );
        self.data = data;
        self.config = config;
    }

    pub fn config(&self) -> &Environment {
        &self.config
    }

    pub fn data(&self) -> &DataStore {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut DataStore {
        &mut self.data
    }

    /// Start a new call; it becomes the target of later steps. Earlier
    /// calls stay in the history.
    pub fn create_api(&mut self, gateway: Option<String>) -> &mut Api {
        let api = Api::new(&self.config, gateway);
        debug!(gateway = api.request().gateway(), "new API call");
        self.apis.push(api);
        let idx = self.apis.len() - 1;
        &mut self.apis[idx]
    }

    pub fn api(&self) -> Result<&Api> {
        self.apis.last().ok_or(Error::NoActiveCall)
    }

    pub fn api_mut(&mut self) -> Result<&mut Api> {
        self.apis.last_mut().ok_or(Error::NoActiveCall)
    }

    /// Response of the current call.
    pub fn response(&self) -> Result<&ResponseView> {
        self.api()?.response().ok_or(Error::NoResponse)
    }

    /// Current response together with the dataset, for capture steps.
    pub fn response_and_data(&mut self) -> Result<(&ResponseView, &mut DataStore)> {
        let response = self
            .apis
            .last()
            .ok_or(Error::NoActiveCall)?
            .response()
            .ok_or(Error::NoResponse)?;
        Ok((response, &mut self.data))
    }

    pub fn apis(&self) -> &[Api] {
        &self.apis
    }

    pub fn snapshots(&self) -> Vec<ApiSnapshot> {
        self.apis.iter().map(Api::snapshot).collect()
    }
}
