//! DTM handshake + encrypted message demo.
//!
//! # What this does
//!
//! 1. Bind a loopback `TcpListener`
//! 2. **Server** — accept the connection and run the passive side of the
//!    nine-stage handshake
//! 3. **Client** — dial the listener and run the active side
//! 4. Once both sides report `on_session_established`, the client sends one
//!    Message packet and the server prints what it decrypted
//! 5. Print each side's `bytes_sent`/`bytes_received` counters
//!
//! # Run
//! ```
//! cargo run -p dtm-connect
//! ```

use std::sync::Arc;

use dtm::{catalog, ConnectionBuilder};
use tokio::sync::{oneshot, Mutex};

fn identity(tag: &str) -> (Vec<u8>, Vec<u8>) {
    (format!("{tag}-public").into_bytes(), format!("{tag}-secret").into_bytes())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── 1. Bind a loopback listener ──────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    println!("Listening on {addr} …");

    let params = catalog::x41rnt1r1();
    let (server_public, server_secret) = identity("server");
    let (client_public, client_secret) = identity("client");

    let received = Arc::new(Mutex::new(None));
    let received_for_server = received.clone();
    let (server_ready_tx, server_ready_rx) = oneshot::channel();
    let (client_ready_tx, client_ready_rx) = oneshot::channel();

    // ── 2. Server: accept and run the passive handshake ──────────────────────
    let server_params = params;
    let server_handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        println!("[server] accepted connection, running handshake …");
        let mut server_ready_tx = Some(server_ready_tx);
        let conn = ConnectionBuilder::new(server_params, server_public, server_secret)
            .on_session_established(move |_send, _recv| {
                println!("[server] session established");
                if let Some(tx) = server_ready_tx.take() {
                    let _ = tx.send(());
                }
            })
            .on_data_received(move |payload| {
                let payload = payload.to_vec();
                let received = received_for_server.clone();
                tokio::spawn(async move {
                    *received.lock().await = Some(payload);
                });
            })
            .accept(stream)
            .await
            .expect("server handshake");
        conn
    });

    // ── 3. Client: dial and run the active handshake ─────────────────────────
    let client_params = params;
    let client_handle = tokio::spawn(async move {
        println!("[client] dialing {addr} …");
        let mut client_ready_tx = Some(client_ready_tx);
        ConnectionBuilder::new(client_params, client_public, client_secret)
            .on_session_established(move |_send, _recv| {
                println!("[client] session established");
                if let Some(tx) = client_ready_tx.take() {
                    let _ = tx.send(());
                }
            })
            .connect(&addr.to_string())
            .await
            .expect("client handshake")
    });

    let client = client_handle.await?;
    let server = server_handle.await?;
    client_ready_rx.await?;
    server_ready_rx.await?;

    // ── 4. Exchange one Message packet ────────────────────────────────────────
    println!("\n[client] sending \"hello over the established channel\" …");
    client.send(b"hello over the established channel").await?;

    let payload = loop {
        if let Some(payload) = received.lock().await.take() {
            break payload;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    };
    println!("[server] decrypted: {:?}", String::from_utf8_lossy(&payload));

    // ── 5. Print byte counters ─────────────────────────────────────────────────
    let (client_sent, client_received) = client.byte_counters().await;
    let (server_sent, server_received) = server.byte_counters().await;
    println!("\n[client] bytes_sent={client_sent} bytes_received={client_received}");
    println!("[server] bytes_sent={server_sent} bytes_received={server_received}");

    client.teardown("demo complete").await.ok();
    server.teardown("demo complete").await.ok();

    println!("\nDone.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_tags_produce_distinct_ids() {
        let (pub_a, sec_a) = identity("a");
        let (pub_b, sec_b) = identity("b");
        assert_ne!(pub_a, pub_b);
        assert_ne!(sec_a, sec_b);
        assert_eq!(pub_a, b"a-public");
        assert_eq!(sec_a, b"a-secret");
    }
}
