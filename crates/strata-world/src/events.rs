//! Event channel for world-state notifications.
//!
//! Systems that track columns (relight queue, mesh cache, occluder cache,
//! debug overlays) subscribe here instead of registering callbacks on the
//! manager, so nothing holds a closure that can outlive its column.

use crossbeam_channel::{bounded, Receiver, Sender};
use strata_common::{BlockPos, ColumnPos};

/// Events published by the chunk manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorldEvent {
    /// A column finished generating and lighting.
    ColumnLoaded {
        /// The column
        column: ColumnPos,
    },
    /// A column was unloaded; all per-column tracking must be dropped.
    ColumnUnloaded {
        /// The column
        column: ColumnPos,
    },
    /// A block changed; the listed sub-chunks need remeshing.
    BlockChanged {
        /// The mutated block
        pos: BlockPos,
        /// Sub-chunks (own plus boundary neighbors) marked dirty
        dirty: Vec<ColumnPos>,
    },
    /// Background lighting updated one or more sub-chunks of a column.
    LightingUpdated {
        /// The column
        column: ColumnPos,
        /// Sub-chunk indices whose light arrays changed
        sub_chunks: Vec<u8>,
    },
}

/// Broadcast bus for [`WorldEvent`]s.
#[derive(Debug)]
pub struct WorldEvents {
    sender: Sender<WorldEvent>,
    receiver: Receiver<WorldEvent>,
}

impl Default for WorldEvents {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl WorldEvents {
    /// Creates a bus with the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self { sender, receiver }
    }

    /// Publishes an event. Non-blocking; if the bus is full the event is
    /// dropped.
    pub fn publish(&self, event: WorldEvent) {
        let _ = self.sender.try_send(event);
    }

    /// Drains all pending events.
    #[must_use]
    pub fn drain(&self) -> Vec<WorldEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_drain() {
        let bus = WorldEvents::new(8);
        bus.publish(WorldEvent::ColumnLoaded {
            column: ColumnPos::new(1, 2),
        });
        bus.publish(WorldEvent::ColumnUnloaded {
            column: ColumnPos::new(1, 2),
        });
        let events = bus.drain();
        assert_eq!(events.len(), 2);
        assert!(bus.drain().is_empty());
    }

    #[test]
    fn test_full_bus_drops() {
        let bus = WorldEvents::new(1);
        bus.publish(WorldEvent::ColumnLoaded {
            column: ColumnPos::new(0, 0),
        });
        bus.publish(WorldEvent::ColumnLoaded {
            column: ColumnPos::new(1, 1),
        });
        assert_eq!(bus.drain().len(), 1);
    }
}
