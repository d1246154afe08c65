//! Demo command implementation.
//!
//! Starts a server event loop and a handful of clients wired together with
//! in-process channels. Each client picks a skin from the catalog; skins the
//! client is not entitled to are silently dropped by the server.

use perksync_client::{
    ClientConfig, ClientReplicationManager, MoaSkinPreferences, ReconcileOutcome,
};
use perksync_protocol::{
    frame_channel, MoaSkin, MoaSkinPerk, PerkGate, StaticIdentities, UserKey, VerificationContext,
};
use perksync_server::{
    event_channel, ConnectionId, EventLoop, InboundEvent, ServerConfig, ServerRegistry,
    ServerReplicationManager,
};
use perksync_store::{FilePersistence, MemoryPersistence, PersistenceProvider};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

struct DemoClient {
    user: UserKey,
    connection: ConnectionId,
    wanted: &'static MoaSkin,
    client: Arc<ClientReplicationManager<MoaSkinPerk>>,
}

/// Runs the demo.
pub async fn run(
    clients: u8,
    snapshot: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let clients = clients.max(1);
    let identities = Arc::new(StaticIdentities::new());
    for n in 1..=clients {
        let mut context = VerificationContext::new(UserKey::from_bytes([n; 16])).with_tier(n % 4);
        if n == 1 {
            context = context.with_entitlement("founder");
        }
        identities.insert(context);
    }

    let persistence: Arc<dyn PersistenceProvider<MoaSkinPerk>> = match &snapshot {
        Some(path) => Arc::new(FilePersistence::<MoaSkinPerk>::new(path)),
        None => Arc::new(MemoryPersistence::<MoaSkinPerk>::new()),
    };
    let manager = Arc::new(ServerReplicationManager::<MoaSkinPerk>::new(
        ServerConfig::default(),
        Arc::new(PerkGate),
        identities,
        persistence,
    ));
    manager.load()?;

    let mut registry = ServerRegistry::new();
    registry.register(manager.clone())?;
    let (events, inbox) = event_channel();
    let server = tokio::spawn(
        EventLoop::new(Arc::new(registry))
            .with_checkpoint_interval(Duration::from_secs(1))
            .run(inbox),
    );

    let catalog = MoaSkin::all();
    let mut demo_clients = Vec::new();
    let mut pumps = Vec::new();

    for n in 1..=clients {
        let user = UserKey::from_bytes([n; 16]);
        let connection = ConnectionId::new(n as u64);
        let wanted = &catalog[(n as usize * 2 + 2) % catalog.len()];

        let preferences = Arc::new(MoaSkinPreferences::new(user));
        preferences.set_skin(Some(wanted.id()))?;
        let client = Arc::new(ClientReplicationManager::<MoaSkinPerk>::new(
            ClientConfig::new(user).with_reconcile_on_sync(false),
            preferences,
            Arc::new(PerkGate),
        ));

        let (up_tx, mut upstream) = frame_channel();
        let (down_tx, mut downstream) = frame_channel();
        client.connect(Arc::new(up_tx));
        events.send(InboundEvent::Connected {
            connection,
            user,
            sink: Arc::new(down_tx),
        })?;

        let pump_client = Arc::clone(&client);
        let pump_events = events.clone();
        pumps.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(frame) = downstream.recv() => {
                        if let Err(e) = pump_client.handle_frame(&frame) {
                            warn!(%connection, error = %e, "client rejected frame");
                        }
                    }
                    Some(frame) = upstream.recv() => {
                        if pump_events.send(InboundEvent::Frame { connection, frame }).is_err() {
                            break;
                        }
                    }
                    else => break,
                }
            }
        }));

        info!(%user, skin = wanted.id(), "client joined");
        demo_clients.push(DemoClient {
            user,
            connection,
            wanted,
            client,
        });
    }

    if !settle(|| demo_clients.iter().all(|demo| demo.client.is_synced())).await {
        warn!("not every client received its sync");
    }

    let mut requested = 0;
    for demo in &demo_clients {
        if demo.client.reconcile_local()? == ReconcileOutcome::SentApply {
            requested += 1;
        }
    }

    let converged = settle(|| {
        let stats = manager.stats();
        let handled = stats.applies_accepted + stats.applies_unchanged + stats.applies_ineligible;
        let truth = manager.snapshot();
        handled >= requested
            && demo_clients
                .iter()
                .all(|demo| demo.client.mirror_snapshot() == truth)
    })
    .await;
    if !converged {
        warn!("mirrors did not converge before the timeout");
    }

    println!();
    println!("Server records: {}", manager.record_count());
    for demo in &demo_clients {
        let accepted = manager.get(&demo.user).is_some();
        println!(
            "  {}  wanted={:<10} {}  mirror={} records",
            demo.user,
            demo.wanted.id(),
            if accepted { "accepted" } else { "dropped " },
            demo.client.mirror_snapshot().len()
        );
    }

    let stats = manager.stats();
    println!();
    println!(
        "Applies: {} accepted, {} ineligible; {} frames broadcast, {} syncs sent",
        stats.applies_accepted, stats.applies_ineligible, stats.frames_broadcast, stats.syncs_sent
    );

    for demo in &demo_clients {
        demo.client.on_disconnect();
        events.send(InboundEvent::Disconnected {
            connection: demo.connection,
        })?;
    }
    drop(events);

    for pump in pumps {
        pump.await?;
    }
    server.await?;

    if let Some(path) = snapshot {
        println!();
        println!("Snapshot written to {}", path.display());
    }
    Ok(())
}

/// Polls `done` until it holds or [`SETTLE_TIMEOUT`] passes.
async fn settle(mut done: impl FnMut() -> bool) -> bool {
    let poll = async move {
        while !done() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(SETTLE_TIMEOUT, poll).await.is_ok()
}
