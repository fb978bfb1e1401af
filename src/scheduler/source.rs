//! Remote tile sources.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::coord::TileCoord;
use crate::error::{FetchError, Result as TileResult, TileError};

/// Fetches the raw bytes of one tile.
#[async_trait]
pub trait TileSource: Send + Sync {
    async fn fetch(&self, coord: TileCoord) -> Result<Vec<u8>, FetchError>;
}

/// Default user agent for tile requests.
pub const USER_AGENT: &str = concat!("tilekeeper/", env!("CARGO_PKG_VERSION"));

/// HTTP tile source expanding a `{z}/{x}/{y}` URL template.
#[derive(Clone)]
pub struct HttpTileSource {
    client: Client,
    template: String,
}

impl HttpTileSource {
    /// Fails with [`TileError::Configuration`] when a placeholder is missing
    /// and with [`TileError::Fetch`] when the HTTP client cannot be built.
    pub fn new(template: &str, timeout: Duration, user_agent: Option<&str>) -> TileResult<Self> {
        if !["{z}", "{x}", "{y}"].iter().all(|p| template.contains(p)) {
            return Err(TileError::Configuration(format!(
                "tile URL template must contain {{z}}, {{x}} and {{y}}: {}",
                template
            )));
        }

        let client = Client::builder()
            .user_agent(user_agent.unwrap_or(USER_AGENT))
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(FetchError::from)?;

        Ok(Self {
            client,
            template: template.to_string(),
        })
    }

    pub fn url_for(&self, coord: TileCoord) -> String {
        self.template
            .replace("{z}", &coord.z.to_string())
            .replace("{x}", &coord.x.to_string())
            .replace("{y}", &coord.y.to_string())
    }
}

#[async_trait]
impl TileSource for HttpTileSource {
    async fn fetch(&self, coord: TileCoord) -> Result<Vec<u8>, FetchError> {
        let url = self.url_for(coord);
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url,
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}
