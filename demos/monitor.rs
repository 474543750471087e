use std::env;
use std::time::Duration;

use heyitech_alarm::{Coordinator, Credentials, DeviceClient, Event};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> heyitech_alarm::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 5 {
        eprintln!("usage: monitor <base-url> <username> <password> <device-id> [interval-secs]");
        std::process::exit(2);
    }
    let interval = args
        .get(5)
        .and_then(|s| s.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(30));

    let client = DeviceClient::builder(&args[1]).build()?;
    let creds = Credentials::new(&args[2], &args[3]);

    println!("Connecting to {}...", args[1]);
    let coordinator = Coordinator::builder(client, creds, &args[4])
        .interval(interval)
        .on_event(|event| match event {
            Event::StateChanged { previous, current } => println!("state: {previous} -> {current}"),
            Event::FieldChanged { path, current, .. } => println!("  {path} = {current}"),
            Event::RefreshFailed { error } => eprintln!("refresh failed: {error}"),
            Event::Recovered => println!("recovered"),
        })
        .start()
        .await?;

    let snapshot = coordinator.current_snapshot();
    println!("Connected. Panel is {}. Polling every {interval:?}...", snapshot.state());

    tokio::signal::ctrl_c().await.ok();
    coordinator.shutdown();
    Ok(())
}
