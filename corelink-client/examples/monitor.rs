//! Live monitor for a remote system core
//!
//! Connects, prints the core's identity and installed modules, then tails
//! the core's log until interrupted:
//!
//! ```text
//! cargo run --example monitor -- ws://core.local:8000 [user] [password]
//! ```

use corelink_client::CoreClient;
use corelink_utils::logging::{init_logging_with_config, LogConfig};
use corelink_utils::Result;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging_with_config(LogConfig::client())?;

    let mut args = std::env::args().skip(1);
    let url = args
        .next()
        .unwrap_or_else(|| "ws://localhost:8000".to_string());
    let user = args.next();
    let password = args.next();

    let client = CoreClient::new();
    let mut connectivity = client.connected_changed();
    client
        .connect(&url, user.as_deref(), password.as_deref())
        .await?;
    // Consume the connect event so the select below only sees a loss
    let _ = connectivity.recv().await;

    println!("connected to {}", client.identity()?);
    let modules = client.modules()?;
    if modules.is_empty() {
        println!("no modules installed");
    } else {
        let mut names: Vec<_> = modules.keys().cloned().collect();
        names.sort();
        println!("modules: {}", names.join(", "));
    }

    let log = client.log()?;
    let handle = log.subscribe("newEntry", |args| {
        let rendered: Vec<String> = args.iter().map(ToString::to_string).collect();
        println!("log: {}", rendered.join(" "));
    })?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            println!("interrupted, disconnecting");
        }
        event = connectivity.recv() => {
            if matches!(event, Ok(false)) {
                match client.close_reason() {
                    Some(reason) => println!("server closed the connection: {}", reason),
                    None => println!("connection lost"),
                }
                return Ok(());
            }
        }
    }

    handle.unsubscribe();
    client.disconnect().await;
    Ok(())
}
