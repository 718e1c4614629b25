//! A host and two clients on one in-process LAN.
//!
//! ```text
//! cargo run -p lan-lobby [matchmaker.json]
//! ```
//!
//! The optional JSON file overrides `MatchmakerConfig` fields, e.g.
//! `{"match_type": "Team", "num_public_connections": 1}`.

use std::sync::Arc;
use std::time::Duration;

use lobbyforge::prelude::*;
use lobbyforge::telemetry;

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

fn load_config() -> Result<MatchmakerConfig, Box<dyn std::error::Error>> {
    let Some(path) = std::env::args().nth(1) else {
        return Ok(MatchmakerConfig {
            timeout: Some(Duration::from_secs(5)),
            ..MatchmakerConfig::default()
        });
    };
    let text = std::fs::read_to_string(&path)?;
    Ok(serde_json::from_str(&text)?)
}

/// One simulated machine: a LAN provider and the matchmaker that drives it.
fn machine(
    network: &LanNetwork,
    address: &str,
    player: &str,
    config: &MatchmakerConfig,
) -> Result<(Arc<LocalProvider>, Matchmaker), LobbyforgeError> {
    let provider = Arc::new(LocalProvider::new(
        network.clone(),
        LocalProviderConfig {
            host_address: address.to_string(),
            latency: Duration::from_millis(20),
            ..LocalProviderConfig::default()
        },
    )?);
    let orchestrator = SessionOrchestrator::builder()
        .local_player(NetId::new(player))
        .provider(&provider)
        .build();
    Ok((provider, Matchmaker::new(orchestrator, config.clone())))
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::init();
    let config = load_config()?;
    tracing::info!(?config, "lan lobby starting");

    let network = LanNetwork::new();
    let (_host_provider, mut host) = machine(&network, "192.168.1.10:7777", "host", &config)?;
    let (_alice_provider, mut alice) =
        machine(&network, "192.168.1.11:7777", "alice", &config)?;
    let (_bob_provider, mut bob) = machine(&network, "192.168.1.12:7777", "bob", &config)?;

    let travel = host.host().await?;
    println!("host: {travel}");

    for (name, client) in [("alice", &mut alice), ("bob", &mut bob)] {
        match client.find_and_join().await {
            Ok(travel) => println!("{name}: {travel}"),
            Err(e) => println!("{name}: could not join ({e})"),
        }
    }

    host.start_match().await?;
    println!("host: match started, {} session(s) on the LAN", network.beacon_count());

    alice.leave().await?;
    host.leave().await?;
    println!("host: session closed");
    Ok(())
}
