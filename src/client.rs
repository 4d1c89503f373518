use std::fmt;
use std::sync::Arc;

use log::info;

use crate::config::{ClientConfig, Endpoint};
use crate::datasource::Datasource;
use crate::error::StatwolfResult;
use crate::fragment::Fragment;
use crate::http::{HttpTransport, Transport};

/// Main client for a Statwolf dashboard
#[derive(Clone)]
pub struct StatwolfClient {
    config: ClientConfig,
    endpoint: Endpoint,
    transport: Arc<dyn Transport>,
}

impl StatwolfClient {
    /// Validates `config` and connects over HTTP
    pub fn connect(config: ClientConfig) -> StatwolfResult<Self> {
        let transport = Arc::new(HttpTransport::new(&config)?);
        Self::with_transport(config, transport)
    }

    /// Uses a caller-supplied transport, e.g. a mock
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> StatwolfResult<Self> {
        config.validate()?;
        let endpoint = config.endpoint();
        info!("Statwolf client for {}{}", endpoint.origin, endpoint.root);

        Ok(Self {
            config,
            endpoint,
            transport,
        })
    }

    /// Connects with the configuration found in the `SW_*` environment variables
    pub fn from_env() -> StatwolfResult<Self> {
        Self::connect(ClientConfig::from_env()?)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    /// Prefixes `url` with the dashboard root
    pub fn to_dashboard(&self, url: &str) -> String {
        self.endpoint.to_dashboard(url)
    }

    pub fn datasource(&self) -> Datasource {
        Datasource::new(self.transport(), &self.endpoint)
    }

    pub fn fragment(&self) -> Fragment {
        Fragment::new(self.transport(), self.datasource())
    }
}

impl fmt::Debug for StatwolfClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatwolfClient")
            .field("host", &self.config.host)
            .field("username", &self.config.username)
            .finish()
    }
}
