//! Forget the session token.

use anyhow::{Context, Result};
use easysync_client::{PairingApi, SyncClient};

/// Run the logout command.
///
/// The device identity is kept, so pairing again reuses the same device id.
pub async fn run<A: PairingApi>(client: &SyncClient<A>) -> Result<()> {
    if !client.is_paired() {
        println!("Not paired; nothing to do.");
        return Ok(());
    }

    client.logout().context("Failed to clear credentials")?;
    println!("Logged out. Run 'easy-sync pair' to pair again.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::harness;
    use easysync_client::{CredentialStore, MemoryCredentialStore};
    use easysync_core::ConnectionStatus;
    use easysync_types::SessionToken;

    #[tokio::test(start_paused = true)]
    async fn clears_token_keeps_identity() {
        let h = harness(MemoryCredentialStore::with_token(
            SessionToken::new("tok").unwrap(),
        ));
        let device_id = h.client.identity().device_id.clone();

        run(&h.client).await.unwrap();

        assert!(h.store.get().is_none());
        assert_eq!(h.store.identity().unwrap().device_id, device_id);
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(h.client.status(), ConnectionStatus::NotPaired);
    }

    #[tokio::test(start_paused = true)]
    async fn unpaired_is_a_no_op() {
        let h = harness(MemoryCredentialStore::new());
        run(&h.client).await.unwrap();
        assert_eq!(h.transport.connect_count(), 0);
    }
}
