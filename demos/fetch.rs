//! Fetch a few URLs concurrently and print what comes back
//!
//! Run with: cargo run --example fetch -- http://example.com/ https://example.org/

use http_exchange::{init_logging, Client, ClientConfig, LogOptions, RequestOptions};
use std::time::Duration;

fn main() -> anyhow::Result<()> {
    init_logging(&LogOptions {
        warn: true,
        ..Default::default()
    })?;

    let mut urls: Vec<String> = std::env::args().skip(1).collect();
    if urls.is_empty() {
        urls.push("http://example.com/".to_string());
    }

    let client = Client::with_config(ClientConfig {
        request_timeout_ms: 10_000,
        ..Default::default()
    })?;

    println!("Exchange Fetch Example");
    println!("======================\n");

    let mut handles = Vec::new();
    for url in &urls {
        let options = RequestOptions::new().with_timeout(Duration::from_secs(5));
        let handle = client.request(url, options, |response| {
            if response.is_timeout() {
                println!("{}: timed out", response.url());
            } else {
                println!(
                    "{}: {} ssl={} chunked={} bytes={}",
                    response.url(),
                    response.status(),
                    response.is_ssl(),
                    response.is_chunked(),
                    response.body().map_or(0, |body| body.len())
                );
            }
            Ok(())
        })?;
        handles.push(handle);
    }

    for handle in &handles {
        if let Err(error) = handle.wait() {
            println!("{}: {}", handle.url(), error);
        }
    }

    client.stop()?;
    Ok(())
}
