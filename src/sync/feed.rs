use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::common::{GeoPoint, SyncEvent};
use crate::network::MitzvotApi;

use super::sequencer::FetchSequencer;
use super::task::PollJob;

pub const DEFAULT_RADIUS_KM: f64 = 5.0;

/// Keeps the list of open requests near the viewer current.
///
/// Nothing is fetched until a location is known. Manual refreshes share the
/// sequencer so a slow poll cannot overwrite a newer list.
pub struct RequestFeed<A> {
    api: Arc<A>,
    location: watch::Receiver<Option<GeoPoint>>,
    radius_km: f64,
    sequencer: FetchSequencer,
    events: mpsc::Sender<SyncEvent>,
}

impl<A: MitzvotApi> RequestFeed<A> {
    pub fn new(
        api: Arc<A>,
        location: watch::Receiver<Option<GeoPoint>>,
        radius_km: f64,
        sequencer: FetchSequencer,
        events: mpsc::Sender<SyncEvent>,
    ) -> Self {
        Self {
            api,
            location,
            radius_km,
            sequencer,
            events,
        }
    }

    /// Returns whether a new list was published.
    pub async fn refresh(&self) -> bool {
        let Some(center) = *self.location.borrow() else {
            log::debug!("No location yet; skipping feed refresh");
            return false;
        };
        refresh_feed(
            self.api.as_ref(),
            center,
            self.radius_km,
            &self.sequencer,
            &self.events,
        )
        .await
    }
}

impl<A: MitzvotApi> PollJob for RequestFeed<A> {
    async fn poll(&mut self, _first: bool) {
        self.refresh().await;
    }
}

/// One sequenced fetch of the nearby feed.
pub(crate) async fn refresh_feed<A: MitzvotApi>(
    api: &A,
    center: GeoPoint,
    radius_km: f64,
    sequencer: &FetchSequencer,
    events: &mpsc::Sender<SyncEvent>,
) -> bool {
    let ticket = sequencer.issue();
    let requests = match api.fetch_nearby_requests(center, radius_km).await {
        Ok(requests) => requests,
        Err(err) => {
            log::warn!("Failed to fetch nearby requests: {err}");
            return false;
        }
    };
    let open: Vec<_> = requests
        .into_iter()
        .filter(|request| !request.is_completed)
        .collect();
    let count = open.len();
    if !sequencer
        .publish(ticket, events, SyncEvent::FeedUpdated(open))
        .await
    {
        log::debug!("Dropping stale nearby feed");
        return false;
    }
    log::debug!("{count} open requests within {radius_km} km");
    true
}
