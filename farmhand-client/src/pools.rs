//! Pool-related farm requests

use crate::AfanasyClient;
use crate::error::Result;
use crate::wire;

impl AfanasyClient {
    /// Lists the pool names configured on the server
    pub async fn get_pools(&self) -> Result<Vec<String>> {
        let reply = self
            .send_request(&wire::get_request("pools", &[], None))
            .await?;

        let pools = wire::parse_pools(&reply);
        tracing::debug!("Farm reported {} pool(s)", pools.len());
        Ok(pools)
    }
}
