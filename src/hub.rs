use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::DeliveryError;
use crate::pixel::{EncodedFrame, Frame};

/// Something that wants every frame.
pub trait Viewer: Send + Sync {
    fn deliver(&self, frame: &EncodedFrame) -> Result<(), DeliveryError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewerId(u64);

#[derive(Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

struct Viewers {
    next_id: u64,
    by_id: HashMap<ViewerId, Arc<dyn Viewer>>,
}

/// Fans frames out to the connected viewers.
pub struct BroadcastHub {
    viewers: Mutex<Viewers>,
}

impl BroadcastHub {
    pub fn new() -> BroadcastHub {
        BroadcastHub {
            viewers: Mutex::new(Viewers {
                next_id: 0,
                by_id: HashMap::new(),
            }),
        }
    }

    fn viewers(&self) -> MutexGuard<'_, Viewers> {
        self.viewers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_viewer(&self, viewer: Arc<dyn Viewer>) -> ViewerId {
        let mut viewers = self.viewers();
        let id = ViewerId(viewers.next_id);
        viewers.next_id += 1;
        viewers.by_id.insert(id, viewer);
        id
    }

    /// Removing a viewer twice is fine.
    pub fn remove_viewer(&self, id: ViewerId) {
        self.viewers().by_id.remove(&id);
    }

    pub fn viewer_count(&self) -> usize {
        self.viewers().by_id.len()
    }

    /// Drops every viewer. Their transports notice and hang up.
    pub fn close_all(&self) {
        let closed: Vec<_> = self.viewers().by_id.drain().collect();
        if !closed.is_empty() {
            log::info!("Closed {} viewer(s)", closed.len());
        }
    }

    /// Encodes `frame` once and offers it to every viewer present when the
    /// broadcast starts. A failed delivery is logged and the viewer stays.
    pub fn broadcast(&self, frame: &Frame) -> BroadcastReport {
        // Copy out so Add/Remove never wait on slow viewers.
        let targets: Vec<(ViewerId, Arc<dyn Viewer>)> = self
            .viewers()
            .by_id
            .iter()
            .map(|(id, viewer)| (*id, Arc::clone(viewer)))
            .collect();

        let mut report = BroadcastReport::default();
        if targets.is_empty() {
            return report;
        }

        log::trace!("Frame: {} pixels to {} viewer(s)", frame.len(), targets.len());
        let encoded = frame.encode();
        for (id, viewer) in targets {
            match viewer.deliver(&encoded) {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    log::warn!("Delivery to viewer {} failed: {err}", id.0);
                    report.failed += 1;
                }
            }
        }
        report
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        BroadcastHub::new()
    }
}
