//! Interactive chat session.

use anyhow::{Context, Result};
use easysync_client::{PairingApi, SyncClient};
use easysync_core::render;
use std::collections::HashSet;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use super::format_line;

/// One line typed by the user.
#[derive(Debug, PartialEq, Eq)]
pub enum Input<'a> {
    /// Leave the session.
    Quit,
    /// Empty the visible history.
    Clear,
    /// Send as a chat message.
    Chat(&'a str),
    /// Nothing to do.
    Empty,
}

/// Classify a typed line.
pub fn parse_input(line: &str) -> Input<'_> {
    let line = line.trim();
    match line {
        "" => Input::Empty,
        "/quit" | "/exit" => Input::Quit,
        "/clear" => Input::Clear,
        text => Input::Chat(text),
    }
}

/// Run the chat command on stdin and stdout.
pub async fn run<A: PairingApi>(client: &SyncClient<A>) -> Result<()> {
    if !client.is_paired() {
        client.auto_pair().await.context(
            "Not paired and automatic pairing failed. Run 'easy-sync pair --code <code>'",
        )?;
    }

    println!("=== easy-sync chat ({}) ===", client.identity().device_name);
    println!("Type a message and press enter. /clear empties history, /quit exits.");
    println!();

    let stdin = BufReader::new(tokio::io::stdin());
    tokio::select! {
        result = session(client, stdin, std::io::stdout()) => result,
        _ = tokio::signal::ctrl_c() => Ok(()),
    }
}

/// Print stored history, then interleave typed lines and incoming messages
/// until the input ends or the user quits.
async fn session<A, R, W>(client: &SyncClient<A>, input: R, mut out: W) -> Result<()>
where
    A: PairingApi,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let local_name = client.identity().device_name.clone();
    let mut incoming = client.subscribe();

    let history = client.history().await;
    let printed: HashSet<String> = history
        .iter()
        .filter_map(|m| m.id().map(str::to_owned))
        .collect();
    for message in history.iter().rev() {
        if let Some(rendered) = render(message, &local_name) {
            writeln!(out, "{}", format_line(&rendered))?;
        }
    }

    let mut lines = input.lines();
    loop {
        tokio::select! {
            received = incoming.recv() => match received {
                Ok(message) => {
                    if message.id().is_some_and(|id| printed.contains(id)) {
                        continue;
                    }
                    if let Some(rendered) = render(&message, &local_name) {
                        writeln!(out, "{}", format_line(&rendered))?;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "chat view fell behind");
                }
                Err(RecvError::Closed) => break,
            },
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read input")? else {
                    break;
                };
                match parse_input(&line) {
                    Input::Quit => break,
                    Input::Clear => {
                        client.clear_history();
                        writeln!(out, "(history cleared)")?;
                    }
                    Input::Chat(text) => client.send_chat(text),
                    Input::Empty => {}
                }
            }
        }
    }

    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::harness;
    use easysync_client::MemoryCredentialStore;
    use easysync_types::SessionToken;
    use std::time::Duration;

    fn paired() -> MemoryCredentialStore {
        MemoryCredentialStore::with_token(SessionToken::new("tok").unwrap())
    }

    #[test]
    fn classifies_input() {
        assert_eq!(parse_input("  hello  "), Input::Chat("hello"));
        assert_eq!(parse_input("/quit"), Input::Quit);
        assert_eq!(parse_input("/clear"), Input::Clear);
        assert_eq!(parse_input("   "), Input::Empty);
    }

    #[tokio::test(start_paused = true)]
    async fn typed_lines_are_sent() {
        let h = harness(paired());
        let peer = h.transport.accept().await;
        peer.wait_for_sent(1).await;

        let mut out = Vec::new();
        session(&h.client, &b"hello there\n\n/quit\nnot sent\n"[..], &mut out)
            .await
            .unwrap();

        let sent = peer.wait_for_sent(2).await;
        let chat: serde_json::Value = serde_json::from_str(&sent[1]).unwrap();
        assert_eq!(chat["type"], "chat");
        assert_eq!(chat["text"], "hello there");

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(peer.sent().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn prints_history_oldest_first() {
        let h = harness(paired());
        let peer = h.transport.accept().await;
        peer.wait_for_sent(1).await;
        peer.push_text(r#"{"type":"chat","id":"m1","text":"first","timestamp":1,"from":"Mobile Device"}"#);
        peer.push_text(r#"{"type":"chat","id":"m2","text":"second","timestamp":2,"from":"Mobile Device"}"#);
        tokio::time::sleep(Duration::from_millis(1)).await;

        let mut out = Vec::new();
        session(&h.client, &b"/quit\n"[..], &mut out).await.unwrap();

        let out = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(
            lines,
            vec![
                "--- connected ---",
                "[Mobile Device] first",
                "[Mobile Device] second",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn clear_empties_history() {
        let h = harness(paired());
        let peer = h.transport.accept().await;
        peer.wait_for_sent(1).await;

        let mut out = Vec::new();
        session(&h.client, &b"/clear\n"[..], &mut out).await.unwrap();

        assert!(String::from_utf8(out).unwrap().contains("(history cleared)"));
        assert!(h.client.history().await.is_empty());
    }
}
