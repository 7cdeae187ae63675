//! Show pairing and connection status.

use anyhow::Result;
use easysync_client::{PairingApi, SyncClient};
use std::time::Duration;

use super::wait_until_connected;

/// How long a paired client gets to open its connection before reporting.
const SETTLE_TIME: Duration = Duration::from_secs(2);

/// Run the status command.
pub async fn run<A: PairingApi>(client: &SyncClient<A>) -> Result<()> {
    if client.is_paired() {
        wait_until_connected(client, SETTLE_TIME).await;
    }
    print!("{}", report(client));
    Ok(())
}

fn report<A: PairingApi>(client: &SyncClient<A>) -> String {
    let identity = client.identity();
    let mut out = String::new();
    out.push_str("=== easy-sync status ===\n\n");
    out.push_str("Device:\n");
    out.push_str(&format!("  ID:   {}\n", identity.device_id));
    out.push_str(&format!("  Name: {}\n", identity.device_name));
    out.push('\n');
    out.push_str(&format!("Server: {}\n", client.config().server.url));
    out.push_str(&format!(
        "Paired: {}\n",
        if client.is_paired() { "yes" } else { "no" }
    ));
    out.push_str(&format!("Status: {}\n", client.status()));

    if !client.is_paired() {
        out.push_str("\nRun 'easy-sync pair' to pair with the server.\n");
    }
    out
}
