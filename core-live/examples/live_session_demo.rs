//! Live session demo: a conductor and a follower on the in-process bus.
//!
//! Run with: cargo run --example live_session_demo

use core_live::{
    DeviceId, LiveReplicator, LiveState, LocalBus, ReplicatorConfig, RolePolicy,
};
use core_runtime::logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
use core_store::OfflineStore;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging(
        LoggingConfig::default()
            .with_format(LogFormat::Compact)
            .with_level(LogLevel::Debug),
    )?;

    let store = OfflineStore::open_in_memory().await?;
    let bus = Arc::new(LocalBus::default());

    let device_path = std::env::temp_dir().join("live_session_demo").join("device_id");
    let conductor = LiveReplicator::new(
        bus.clone(),
        DeviceId::load_or_create(&device_path),
        ReplicatorConfig {
            role_policy: RolePolicy::Strict,
        },
    );
    conductor
        .start_as_conductor(LiveState::new("demo-setlist"))
        .await?;
    println!("Conductor {} is live", conductor.device_id());

    let follower = LiveReplicator::new(
        bus.clone(),
        DeviceId::generate(),
        ReplicatorConfig::default(),
    );
    follower.connect_as_follower("demo-setlist").await?;
    let subscription = follower.on_message(|message| {
        println!("  follower saw: {}", message.kind);
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    println!("Follower mirror after handshake: {:?}", follower.state());

    conductor.change_song(1)?;
    conductor.set_playing(true)?;
    conductor.update_bar(4)?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let state = conductor.state().expect("conductor always has state");
    println!(
        "Conductor position: song {} / section {} / bar {}",
        state.song_index, state.section_index, state.bar
    );

    conductor.checkpoint(&store).await?;
    println!("Checkpoint written: {:?}", store.live_checkpoint().await?);

    subscription.unsubscribe();
    follower.disconnect();
    conductor.disconnect();
    store.clear_live_checkpoint().await?;
    store.close().await;

    Ok(())
}
