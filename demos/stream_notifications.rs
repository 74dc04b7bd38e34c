//! Full session walkthrough: scan, connect to the strongest peripheral,
//! and stream its notifications as hex.
//!
//! Run with: cargo run --example stream_notifications

use ble_session::{to_hex_string, LifecycleEvent, Result, SessionManager};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ble_session=debug".parse().unwrap()),
        )
        .init();

    let manager = SessionManager::new().await?;
    let mut events = manager.subscribe();

    println!("Scanning for 10 seconds...\n");
    manager.start_scan()?;
    tokio::time::sleep(Duration::from_secs(10)).await;

    let snapshot = manager.snapshot();
    if snapshot.is_empty() {
        println!("No devices found.");
        manager.shutdown().await?;
        return Ok(());
    }

    for entry in &snapshot {
        println!("  {} (RSSI: {} dBm)", entry.handle, entry.last_rssi);
    }

    // Pick the strongest signal.
    let target = snapshot
        .iter()
        .max_by_key(|e| e.last_rssi)
        .map(|e| e.handle.clone())
        .unwrap();

    println!("\nConnecting to {}...\n", target);
    manager.connect(target)?;

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(LifecycleEvent::Connected) => println!("Connected"),
                    Ok(LifecycleEvent::ServicesReady) => println!("Services ready, streaming..."),
                    Ok(LifecycleEvent::DataReceived(payload)) => {
                        println!("Received data: {}", to_hex_string(&payload));
                    }
                    Ok(LifecycleEvent::Disconnected) => {
                        println!("Disconnected");
                        break;
                    }
                    Ok(LifecycleEvent::ConnectFailed) => {
                        println!("Connection failed");
                        break;
                    }
                    Err(_) => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nInterrupted!");
                break;
            }
        }
    }

    manager.shutdown().await?;
    println!("Done!");

    Ok(())
}
