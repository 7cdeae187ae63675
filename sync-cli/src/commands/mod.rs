//! CLI command implementations.

pub mod chat;
pub mod devices;
pub mod logout;
pub mod pair;
pub mod status;

use easysync_client::{PairingApi, SyncClient};
use easysync_core::RenderedMessage;
use std::time::Duration;

/// Wait until the connection opens, up to `limit`.
pub async fn wait_until_connected<A: PairingApi>(client: &SyncClient<A>, limit: Duration) -> bool {
    let mut state = client.connection().watch_state();
    let connected = matches!(
        tokio::time::timeout(limit, state.wait_for(|s| s.is_open())).await,
        Ok(Ok(_))
    );
    connected
}

/// One line of terminal output for a rendered chat entry.
pub fn format_line(message: &RenderedMessage) -> String {
    match message {
        RenderedMessage::Own { text, .. } => format!("[you] {}", text),
        RenderedMessage::Remote { from, text, .. } => {
            format!("[{}] {}", from.as_deref().unwrap_or("unknown"), text)
        }
        RenderedMessage::Banner { text } => format!("--- {} ---", text),
        RenderedMessage::Plain { text } => text.clone(),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use easysync_client::{
        ClientConfig, MemoryCredentialStore, MockPairingApi, MockTransport, SyncClient,
    };
    use easysync_core::OsClassifier;
    use std::sync::Arc;

    /// A client wired to mocks, with the parts tests need to script.
    pub struct Harness {
        pub client: SyncClient<MockPairingApi>,
        pub store: Arc<MemoryCredentialStore>,
        pub transport: MockTransport,
        pub api: MockPairingApi,
    }

    pub fn harness(store: MemoryCredentialStore) -> Harness {
        let store = Arc::new(store);
        let transport = MockTransport::new();
        let api = MockPairingApi::new();
        let client = SyncClient::start(
            ClientConfig::default(),
            store.clone(),
            transport.clone(),
            api.clone(),
            Box::new(OsClassifier::new("linux")),
        )
        .unwrap();
        Harness {
            client,
            store,
            transport,
            api,
        }
    }
}
