use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::feed::FacilityScope;
use crate::model::ChangeEvent;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub fanning change events out per facility, plus one channel
/// carrying every facility.
pub struct FeedHub {
    channels: DashMap<String, broadcast::Sender<ChangeEvent>>,
    all: broadcast::Sender<ChangeEvent>,
}

impl Default for FeedHub {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
            all: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    /// Subscribe to events for a scope. A single-facility scope gets that
    /// facility's channel (created on demand); anything wider listens to the
    /// combined channel and must filter by scope itself.
    pub fn subscribe(&self, scope: &FacilityScope) -> broadcast::Receiver<ChangeEvent> {
        match scope.single() {
            Some(facility_id) => self
                .channels
                .entry(facility_id.to_string())
                .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
                .subscribe(),
            None => self.all.subscribe(),
        }
    }

    /// Send an event. No-op if nobody is listening.
    pub fn send(&self, event: &ChangeEvent) {
        if let Some(sender) = self.channels.get(&event.record.slot.facility_id) {
            let _ = sender.send(event.clone());
        }
        let _ = self.all.send(event.clone());
    }

    /// Drop facility channels nobody listens to any more.
    pub fn prune(&self) {
        self.channels.retain(|_, sender| sender.receiver_count() > 0);
    }

    pub fn facility_channels(&self) -> usize {
        self.channels.len()
    }
}
