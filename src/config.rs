use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub odata: ODataConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub connection_string: Option<String>,
    pub max_connections: Option<u32>,
    /// Seed the store with the demo people, records and shops when it is empty
    pub load_seed_data: bool,
}

/// Service-level settings shared with every handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ODataConfig {
    pub route_prefix: String,
    /// Absolute root used in `@odata.context` and `@odata.nextLink` URLs
    pub service_root: String,
    pub page_size: usize,
    pub max_top: usize,
    pub max_skip: usize,
    /// Person returned by the `GetTim` singleton
    pub singleton_person_id: i32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 64951,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            connection_string: None,
            max_connections: Some(20),
            load_seed_data: true,
        }
    }
}

impl Default for ODataConfig {
    fn default() -> Self {
        Self {
            route_prefix: "odata".to_string(),
            service_root: "http://localhost:64951/odata".to_string(),
            page_size: 4,
            max_top: 10,
            max_skip: 15,
            singleton_person_id: 6,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and config file
    pub fn load() -> anyhow::Result<Self> {
        let mut config = config::Config::builder();

        config = config.add_source(config::Config::try_from(&AppConfig::default())?);

        config = config.add_source(config::File::with_name("config").required(false));

        // AIRVINYL_SERVER__PORT, AIRVINYL_ODATA__PAGE_SIZE, ...
        config = config.add_source(
            config::Environment::with_prefix("AIRVINYL")
                .separator("__")
                .prefix_separator("_"),
        );

        let config = config.build()?;
        let app_config: AppConfig = config.try_deserialize()?;

        Ok(app_config)
    }

    /// Database URL from config or `DATABASE_URL`; `None` selects the in-memory store
    pub fn database_url(&self) -> Option<String> {
        if let Some(connection_string) = &self.database.connection_string {
            return Some(connection_string.clone());
        }

        std::env::var("DATABASE_URL").ok().filter(|url| !url.is_empty())
    }

    /// Get the server bind address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl ODataConfig {
    /// Route prefix as an absolute path, e.g. `/odata`
    pub fn route_path(&self) -> String {
        format!("/{}", self.route_prefix.trim_matches('/'))
    }

    /// Context URL for a payload, e.g. `http://host/odata/$metadata#People`
    pub fn context_url(&self, fragment: &str) -> String {
        format!("{}/$metadata#{}", self.service_root.trim_end_matches('/'), fragment)
    }

    pub fn resource_url(&self, path: &str) -> String {
        format!("{}/{}", self.service_root.trim_end_matches('/'), path)
    }

    /// Service root as a base URL; relative references are joined onto it
    pub fn service_root_url(&self) -> Result<url::Url, url::ParseError> {
        url::Url::parse(&format!("{}/", self.service_root.trim_end_matches('/')))
    }
}
