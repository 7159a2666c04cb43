//! Published events (§3, §6): the tagged variants the outer operator
//! observes over a depth-1 channel.

use std::sync::Mutex;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChangeType {
    Changed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleChange {
    pub name: String,
    pub change_type: ChangeType,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    GlobalChanged,
    ModulesChanged(Vec<ModuleChange>),
    AmbigousState,
}

/// Publishes `Event`s on a bounded depth-1 channel (§5). A full channel
/// means the consumer hasn't drained the previous send yet; `publish` must
/// not block, so a send that can't fit is held in a single pending slot and
/// merged with whatever comes next rather than dropped outright.
/// Same-kind `GlobalChanged`/`AmbigousState` collisions collapse to one
/// (both are idempotent), and `ModulesChanged` collisions union their
/// per-module entries so a burst of distinct module changes is never lost
/// (§5: "coalesces `ModulesChanged` payloads"). A kind mismatch between the
/// pending slot and the newest event means the pending one is stale and is
/// superseded.
pub struct EventPublisher {
    tx: mpsc::Sender<Event>,
    pending: Mutex<Option<Event>>,
}

impl EventPublisher {
    pub fn new(tx: mpsc::Sender<Event>) -> Self {
        Self {
            tx,
            pending: Mutex::new(None),
        }
    }

    pub fn publish(&self, event: Event) {
        let mut pending = self.pending.lock().expect("event pending lock poisoned");
        let outgoing = match pending.take() {
            Some(held) => coalesce(held, event),
            None => event,
        };
        match self.tx.try_send(outgoing) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => *pending = Some(event),
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

fn coalesce(older: Event, newer: Event) -> Event {
    match (older, newer) {
        (Event::ModulesChanged(mut existing), Event::ModulesChanged(incoming)) => {
            for change in incoming {
                match existing.iter_mut().find(|c| c.name == change.name) {
                    Some(slot) => slot.change_type = change.change_type,
                    None => existing.push(change),
                }
            }
            Event::ModulesChanged(existing)
        }
        (Event::GlobalChanged, Event::GlobalChanged) => Event::GlobalChanged,
        (Event::AmbigousState, Event::AmbigousState) => Event::AmbigousState,
        (_, newer) => newer,
    }
}

pub fn channel(depth: usize) -> (mpsc::Sender<Event>, mpsc::Receiver<Event>) {
    mpsc::channel(depth.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn modules_changed_bursts_coalesce_instead_of_dropping() {
        let (tx, mut rx) = channel(1);
        let publisher = EventPublisher::new(tx);

        publisher.publish(Event::ModulesChanged(vec![ModuleChange {
            name: "a".into(),
            change_type: ChangeType::Changed,
        }]));
        // Channel is now full; this one must be held, not dropped.
        publisher.publish(Event::ModulesChanged(vec![ModuleChange {
            name: "b".into(),
            change_type: ChangeType::Changed,
        }]));

        assert_eq!(
            rx.recv().await.unwrap(),
            Event::ModulesChanged(vec![ModuleChange {
                name: "a".into(),
                change_type: ChangeType::Changed,
            }])
        );

        // The channel has capacity again; this publish flushes the merged
        // pending slot (`b`, accumulated above) together with `c`.
        publisher.publish(Event::ModulesChanged(vec![ModuleChange {
            name: "c".into(),
            change_type: ChangeType::Changed,
        }]));

        assert_eq!(
            rx.recv().await.unwrap(),
            Event::ModulesChanged(vec![
                ModuleChange {
                    name: "b".into(),
                    change_type: ChangeType::Changed,
                },
                ModuleChange {
                    name: "c".into(),
                    change_type: ChangeType::Changed,
                },
            ])
        );
    }

    #[test]
    fn repeated_global_changed_collapses_to_one() {
        assert_eq!(
            coalesce(Event::GlobalChanged, Event::GlobalChanged),
            Event::GlobalChanged
        );
    }

    #[test]
    fn mismatched_kinds_let_the_newer_event_supersede() {
        assert_eq!(
            coalesce(Event::AmbigousState, Event::GlobalChanged),
            Event::GlobalChanged
        );
    }
}
