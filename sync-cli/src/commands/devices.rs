//! List devices known to the server.

use anyhow::{bail, Context, Result};
use easysync_client::{PairingApi, SyncClient};

/// Run the devices command.
pub async fn run<A: PairingApi>(client: &SyncClient<A>) -> Result<()> {
    let Some(token) = client.token() else {
        bail!("Not paired. Run 'easy-sync pair' first.");
    };
    let url = client
        .config()
        .api_url("/api/devices")
        .context("Invalid server URL")?;

    let http = reqwest::Client::builder()
        .timeout(client.config().connect_timeout())
        .build()
        .context("Failed to build HTTP client")?;
    let response = http
        .get(url)
        .bearer_auth(token.as_str())
        .send()
        .await
        .context("Failed to reach server")?;

    let status = response.status();
    if !status.is_success() {
        bail!("Server returned {}", status);
    }

    let body: serde_json::Value = response.json().await.context("Invalid device list")?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}
