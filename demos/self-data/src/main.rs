//! Polls `LoGetSelfData()` a few times and prints the player's aircraft.
//!
//! Usage: `self-data [host] [port] [count]`

use std::time::Duration;

use dcslink::prelude::*;
use dcslink::{DEFAULT_HOST, DEFAULT_PORT};

const POLL_INTERVAL: Duration = Duration::from_secs(1);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

struct Args {
    host: String,
    port: u16,
    count: u32,
}

fn parse_args() -> Result<Args, Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = match args.next() {
        Some(port) => port.parse()?,
        None => DEFAULT_PORT,
    };
    let count = match args.next() {
        Some(count) => count.parse()?,
        None => 5,
    };
    Ok(Args { host, port, count })
}

/// Renders `LatLongAlt` as one line, if the record has it.
fn position(record: &Record) -> Option<String> {
    let field = |name: &str| record.get_path(&["LatLongAlt", name]).and_then(Value::as_f64);
    Some(format!(
        "lat {:.5} long {:.5} alt {:.0} m",
        field("Lat")?,
        field("Long")?,
        field("Alt")?
    ))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dcslink::logging::init_with("info");
    let args = parse_args()?;

    let client = Client::builder().host(args.host).port(args.port).build();
    client.on(EventKind::ConnectionChanged, |event| {
        if let Event::ConnectionChanged(state) = event {
            tracing::info!(%state, "connection");
        }
        Ok(())
    });
    client.on(EventKind::Error, |event| {
        if let Event::Error(e) = event {
            tracing::warn!(error = %e, "client error");
        }
        Ok(())
    });

    client.connect().await?;

    for i in 1..=args.count {
        let response = client
            .request_timeout(API_SELF_DATA, std::iter::empty::<(&str, i64)>(), REQUEST_TIMEOUT)
            .await;
        match response {
            Ok(response) => match response.records.first() {
                Some(me) => {
                    let name = me.get("Name").and_then(Value::as_str).unwrap_or("?");
                    match position(me) {
                        Some(pos) => tracing::info!(poll = i, name, "{pos}"),
                        None => tracing::info!(poll = i, "{}", serde_json::to_string(me)?),
                    }
                }
                None => tracing::info!(poll = i, "no aircraft"),
            },
            Err(e) if e.is_connection_failure() => {
                tracing::error!(error = %e, "connection lost");
                break;
            }
            Err(e) => tracing::warn!(poll = i, error = %e, "poll failed"),
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }

    client.disconnect().await;
    Ok(())
}
