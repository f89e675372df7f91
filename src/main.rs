use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use clubslot::config::Config;
use clubslot::engine::{Session, SystemClock, Window};
use clubslot::feed::FacilityScope;
use clubslot::store::MemoryStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    clubslot::observability::init(config.metrics_port)?;

    let catalog = Arc::new(config.load_catalog()?);
    let members = config.load_members()?;
    info!("catalog: {} facilities", catalog.len());
    info!("members: {}", members.len());

    let store = MemoryStore::new();
    let seeded = store.seed(config.load_seed()?).await;
    info!("seeded {seeded} reservations");

    let clock = SystemClock {
        offset: config.utc_offset,
    };
    let session = Session::with_clock(catalog.clone(), Arc::new(clock));
    let subscription = session
        .activate(&store, FacilityScope::facility(config.facility.clone()))
        .await?;
    if !subscription.wait_for(1).await {
        warn!("feed ended before the first snapshot arrived");
    }

    let today = session.today();
    let window = Window::month_of(today);
    let grid = session.grid(&config.facility, &window).await?;

    let contested: Vec<String> = session
        .ledger()
        .await
        .contested()
        .into_iter()
        .map(|(slot, _)| slot.to_string())
        .collect();
    if !contested.is_empty() {
        warn!("{} slots held by more than one request", contested.len());
    }

    let output = json!({
        "facility": config.facility,
        "today": today,
        "can_go_back": window.can_go_back(today),
        "contested": contested,
        "grid": grid,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    subscription.unsubscribe().await;
    info!("clubslot stopped");
    Ok(())
}
