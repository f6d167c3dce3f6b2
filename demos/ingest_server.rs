//! Ingest server with a stream watcher
//!
//! Run with: cargo run --example ingest_server [BIND_ADDR] [APP/STREAM]
//!
//! Examples:
//!   cargo run --example ingest_server                          # binds to 0.0.0.0:1935
//!   cargo run --example ingest_server localhost live/test      # watch rtmp://localhost/live/test
//!
//! Publish with ffmpeg:
//!   ffmpeg -re -i input.mp4 -c:v libx264 -c:a aac -f flv rtmp://localhost/live/test
//!
//! When APP/STREAM is given, the watcher attaches to that stream whenever it
//! is live and logs what it receives.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rtmp_ingest::protocol::constants::{DEFAULT_VHOST, RTMP_PORT, RTMP_SCHEMA};
use rtmp_ingest::{MediaKey, PacketKind, RtmpServer, ServerConfig};

/// Accepts "localhost", "localhost:1936", "127.0.0.1" and "0.0.0.0:1940"
fn parse_bind_addr(arg: &str) -> Result<SocketAddr, String> {
    let normalized = arg.replace("localhost", "127.0.0.1");

    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if let Ok(ip) = normalized.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, RTMP_PORT));
    }

    Err(format!(
        "Invalid bind address: '{}'. Expected format: IP:PORT or IP or 'localhost'",
        arg
    ))
}

fn print_usage() {
    eprintln!("Usage: ingest_server [BIND_ADDR] [APP/STREAM]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  BIND_ADDR    Address to bind to (default: 0.0.0.0:1935)");
    eprintln!("  APP/STREAM   Stream to watch, e.g. live/test");
}

/// Attach to `key` whenever it is live and log packet counts
async fn watch(server: Arc<RtmpServer>, key: MediaKey) {
    let transport = Arc::new(());
    loop {
        let Some(mut subscription) = server.subscribe(&key, &transport) else {
            tokio::time::sleep(Duration::from_millis(500)).await;
            continue;
        };
        tracing::info!(stream = %key, "Watching");

        let (mut video, mut audio, mut keyframes) = (0u64, 0u64, 0u64);
        while let Some(packet) = subscription.recv().await {
            match packet.kind {
                PacketKind::Video => video += 1,
                PacketKind::Audio => audio += 1,
            }
            if packet.keyframe {
                keyframes += 1;
                if keyframes % 5 == 0 {
                    tracing::info!(stream = %key, video, audio, keyframes, "Progress");
                }
            }
        }

        tracing::info!(
            stream = %key,
            video,
            audio,
            keyframes,
            normal = ?subscription.detach_reason(),
            "Stream ended"
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let bind_addr = match args.get(1) {
        Some(addr_str) => match parse_bind_addr(addr_str) {
            Ok(addr) => addr,
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!();
                print_usage();
                std::process::exit(1);
            }
        },
        None => ServerConfig::default().bind_addr,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rtmp_ingest=debug".parse()?)
                .add_directive("ingest_server=debug".parse()?),
        )
        .init();

    let server = Arc::new(RtmpServer::new(ServerConfig::with_addr(bind_addr)));

    if let Some((app, stream)) = args.get(2).and_then(|s| s.split_once('/')) {
        let key = MediaKey::new(RTMP_SCHEMA, DEFAULT_VHOST, app, stream)?;
        tokio::spawn(watch(Arc::clone(&server), key));
    }

    println!("Starting RTMP ingest on {}", bind_addr);
    println!("ffmpeg: ffmpeg -re -i input.mp4 -c copy -f flv rtmp://localhost/live/test");

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    println!("Shut down");
    Ok(())
}
