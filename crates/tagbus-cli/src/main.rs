//! # tagbus CLI
//!
//! Command-line utility for reading and writing PLC tags over the databus.

use anyhow::{bail, Context, Result};
use std::env;
use std::time::Duration;
use tagbus_client::{Databus, DatabusConfig, DatabusError};
use tracing_subscriber::EnvFilter;

/// How long commands wait for the connector's metadata and first data cycle.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_help();
        return Ok(());
    }

    match args[1].as_str() {
        "list" => list().await?,
        "read" => {
            if args.len() < 3 {
                eprintln!("Usage: tagbus read <tag>");
                std::process::exit(1);
            }
            read(&args[2]).await?;
        }
        "write" => {
            if args.len() < 4 {
                eprintln!("Usage: tagbus write <tag> <value>");
                std::process::exit(1);
            }
            write(&args[2], &args[3]).await?;
        }
        "watch" => {
            if args.len() < 5 {
                eprintln!("Usage: tagbus watch <tag> <threshold> <trigger-tag>");
                std::process::exit(1);
            }
            let threshold: f64 = args[3]
                .parse()
                .with_context(|| format!("Invalid threshold: {}", args[3]))?;
            watch(&args[2], threshold, &args[4]).await?;
        }
        "help" | "--help" | "-h" => {
            print_help();
        }
        cmd => {
            eprintln!("Unknown command: {cmd}");
            print_help();
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Connect with environment configuration and start listening.
fn connect() -> Result<Databus> {
    let config = DatabusConfig::from_env().context("Failed to load databus configuration")?;
    tracing::info!(broker = %config.broker, "Connecting to databus");

    let databus = Databus::connect(config).context("Failed to connect to databus")?;
    databus.start();
    Ok(databus)
}

/// Wait until a tag shows up in the store, or time out.
async fn wait_for_tag(databus: &Databus, name: &str) -> Result<tagbus_client::Tag> {
    let deadline = tokio::time::Instant::now() + SETTLE_TIMEOUT;
    loop {
        if let Some(tag) = databus.tag(name).await {
            return Ok(tag);
        }
        if tokio::time::Instant::now() >= deadline {
            bail!("Tag '{name}' not seen on the databus within {SETTLE_TIMEOUT:?}");
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

async fn list() -> Result<()> {
    let databus = connect()?;

    // Let the metadata and at least one data cycle arrive
    tokio::time::sleep(Duration::from_secs(2)).await;

    let tags = databus.tags().await;
    if tags.is_empty() {
        eprintln!("No tags received; is the connector publishing?");
        return Ok(());
    }

    for (name, tag) in tags.iter() {
        println!("{name}: {}", tag.val);
    }
    Ok(())
}

async fn read(name: &str) -> Result<()> {
    let databus = connect()?;
    let tag = wait_for_tag(&databus, name).await?;

    println!("{}", tag.val);
    println!("ts: {}", tag.ts.to_rfc3339());
    if !tag.is_good() {
        eprintln!("warning: quality is {:?}", tag.qc);
    }
    Ok(())
}

async fn write(name: &str, raw: &str) -> Result<()> {
    // Accept JSON literals; anything that doesn't parse is sent as a string
    let value: serde_json::Value =
        serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));

    let databus = connect()?;

    // The tag directory arrives with the retained metadata frame; retry
    // until it resolves the name or the settle window closes.
    let deadline = tokio::time::Instant::now() + SETTLE_TIMEOUT;
    loop {
        match databus.write_to_tag(name, value.clone()).await {
            Ok(()) => {
                tracing::info!(tag = name, %value, "Write published");
                return Ok(());
            }
            Err(DatabusError::UnknownTag(_)) if tokio::time::Instant::now() < deadline => {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to write tag '{name}'")),
        }
    }
}

async fn watch(name: &str, threshold: f64, trigger: &str) -> Result<()> {
    let databus = connect()?;
    wait_for_tag(&databus, name).await?;

    tracing::info!(tag = name, threshold, trigger, "Watching tag");

    loop {
        if let Some(tag) = databus.tag(name).await {
            let value = tag
                .val
                .as_f64()
                .with_context(|| format!("Tag '{name}' is not numeric"))?;

            if value > threshold {
                tracing::info!(tag = name, value, "Threshold exceeded, firing trigger");
                databus
                    .write_to_tag(trigger, true)
                    .await
                    .with_context(|| format!("Failed to write trigger tag '{trigger}'"))?;
                break;
            }
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    Ok(())
}

fn print_help() {
    println!(
        r#"tagbus CLI

USAGE:
    tagbus <COMMAND> [OPTIONS]

COMMANDS:
    list                                Print every known tag and its value
    read <tag>                          Print a tag's value and timestamp
    write <tag> <value>                 Publish a value for a tag (JSON literal or string)
    watch <tag> <threshold> <trigger>   When the tag's value exceeds the threshold,
                                        write `true` to the trigger tag and exit
    help                                Show this help message

ENVIRONMENT:
    TAGBUS_BROKER        MQTT broker URL (default: tcp://ie-databus:1883)
    TAGBUS_USERNAME      Broker username (default: edge)
    TAGBUS_PASSWORD      Broker password (default: edge)
    TAGBUS_PREFIX        Topic prefix (default: ie)
    TAGBUS_PROVIDER      Data provider segment (default: simatic)
    TAGBUS_CONNECTION    Connector instance segment (default: s7c1)

EXAMPLES:
    tagbus read Q_VFD3_Temperature
    tagbus write I_TwoWayCommunicator true
    tagbus watch Q_VFD4_Temperature 100 I_TwoWayCommunicator
"#
    );
}
