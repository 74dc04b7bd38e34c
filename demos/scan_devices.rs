//! Basic example: scan for nearby BLE peripherals and list them
//!
//! Run with: cargo run --example scan_devices

use ble_session::{Result, SessionManager};
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

    println!("Starting BLE scan...\n");

    let manager = SessionManager::new().await?;
    manager.start_scan()?;

    println!("Scanning for 10 seconds...");
    println!("Press Ctrl+C to exit early.\n");

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(10)) => {}
        _ = tokio::signal::ctrl_c() => {
            println!("\nInterrupted!");
        }
    }

    println!("\n--- Scan Complete ---");
    let snapshot = manager.snapshot();
    println!("Devices found: {}\n", snapshot.len());

    for (index, entry) in snapshot.iter().enumerate() {
        println!("  [{}] {} (RSSI: {} dBm)", index, entry.handle, entry.last_rssi);
    }

    manager.shutdown().await?;
    println!("\nDone!");

    Ok(())
}
