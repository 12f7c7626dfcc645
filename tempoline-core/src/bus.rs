//! Generic single-writer broadcast bus.
//!
//! Grounded on the teacher's `MasterClock` subscriber list
//! (`src/audio/clock.rs`): a `Vec<Sender<T>>` that `retain`s only the
//! subscribers still listening on every emit. Used both for transport events
//! (spec §6 "Event emission") and the project edit bus (spec §4.9) — the
//! scheduling loop only ever emits, UI/edit threads only ever receive.

use crossbeam_channel::{unbounded, Receiver, Sender};

pub struct Bus<T: Clone> {
    subscribers: Vec<Sender<T>>,
}

impl<T: Clone> Default for Bus<T> {
    fn default() -> Self {
        Self {
            subscribers: Vec::new(),
        }
    }
}

impl<T: Clone> Bus<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> Receiver<T> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    pub fn emit(&mut self, event: T) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivers_to_all_subscribers() {
        let mut bus: Bus<u32> = Bus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();
        bus.emit(7);
        assert_eq!(a.try_recv(), Ok(7));
        assert_eq!(b.try_recv(), Ok(7));
    }

    #[test]
    fn drops_disconnected_subscribers() {
        let mut bus: Bus<u32> = Bus::new();
        {
            let _rx = bus.subscribe();
        }
        assert_eq!(bus.subscriber_count(), 1);
        bus.emit(1);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
