//! Pair this device with the sync server.

use anyhow::{Context, Result};
use easysync_client::{AutoPairOutcome, PairingApi, SyncClient};

use super::wait_until_connected;

/// Run the pair command.
///
/// Without a code this is the automatic attempt: fetch a one-time pairing
/// token and submit it. With a code the typed token is submitted instead.
pub async fn run<A: PairingApi>(client: &SyncClient<A>, code: Option<&str>) -> Result<()> {
    println!("=== easy-sync pair ===");
    println!();

    match code {
        Some(code) => {
            client
                .pair_manually(code)
                .await
                .context("Manual pairing failed")?;
            println!("Paired with code.");
        }
        None => match client.auto_pair().await {
            Ok(AutoPairOutcome::AlreadyPaired) => {
                println!("Already paired. Run 'easy-sync logout' to forget this server.");
                return Ok(());
            }
            Ok(AutoPairOutcome::Skipped) => {
                println!("Pairing already attempted.");
                return Ok(());
            }
            Ok(AutoPairOutcome::Paired(_)) => println!("Paired automatically."),
            Err(e) => {
                println!("Automatic pairing failed: {}", e);
                println!();
                println!("Ask the server for a pairing code and run:");
                println!("  easy-sync pair --code <code>");
                return Err(e.into());
            }
        },
    }

    let identity = client.identity();
    println!();
    println!("  Device ID:   {}", identity.device_id);
    println!("  Device name: {}", identity.device_name);
    println!("  Server:      {}", client.config().server.url);

    if wait_until_connected(client, client.config().connect_timeout()).await {
        println!("  Connection:  connected");
    } else {
        println!("  Connection:  {}", client.status());
    }

    Ok(())
}
