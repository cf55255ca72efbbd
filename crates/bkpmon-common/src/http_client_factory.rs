// Creates HTTP clients with the timeouts and identification the agent uses
// for config fetches and file downloads. Proxy settings are picked up from
// the standard environment variables by reqwest itself.

use anyhow::Result;
use reqwest::Client;
use std::time::Duration;

/// Creates properly configured HTTP clients for the agent.
pub struct HttpClientFactory;

impl HttpClientFactory {
    /// Create a new `reqwest::Client` with the given request timeout.
    pub fn create_client(timeout: Duration) -> Result<Client> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!(
                "bkpmon-agent/{}",
                env!("CARGO_PKG_VERSION")
            ))
            .build()?;
        Ok(client)
    }
}
