use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::mpsc::{channel, Receiver, SendError, Sender};

use crate::engine::Direction;
use crate::error::{Error, Result};

/// Event is a player intent delivered to the presenter.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Event {
    Load,
    Move(Direction),
    StartNewGame,
    Undo,
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Event::Load => write!(f, "load"),
            Event::Move(direction) => write!(f, "move {}", direction),
            Event::StartNewGame => write!(f, "start new game"),
            Event::Undo => write!(f, "undo"),
        }
    }
}

pub trait EventSource {
    /// Blocks until the next event. Returns None once the source is exhausted.
    fn next_event(&self) -> Result<Option<Event>>;
}

/// EventSender is the producer side of an [`EventBus`]; clone it for every producer.
#[derive(Clone)]
pub struct EventSender {
    sender: Sender<Event>,
}

impl EventSender {
    pub fn send(&self, event: Event) -> Result<()> {
        self.sender
            .send(event)
            .map_err(|SendError(_)| Error::EventBusClosed)
    }
}

/// EventBus funnels events from any number of producers into a single ordered stream.
pub struct EventBus {
    receiver: Receiver<Event>,
}

impl EventBus {
    pub fn new() -> (EventSender, EventBus) {
        let (sender, receiver) = channel();
        (EventSender { sender }, EventBus { receiver })
    }
}

impl EventSource for EventBus {
    fn next_event(&self) -> Result<Option<Event>> {
        // a closed channel just means every producer hung up
        Ok(self.receiver.recv().ok())
    }
}

/// ScriptedEvents replays a fixed list of events.
pub struct ScriptedEvents {
    events: RefCell<VecDeque<Event>>,
}

impl ScriptedEvents {
    pub fn new(events: impl IntoIterator<Item = Event>) -> Self {
        Self {
            events: RefCell::new(events.into_iter().collect()),
        }
    }
}

impl EventSource for ScriptedEvents {
    fn next_event(&self) -> Result<Option<Event>> {
        Ok(self.events.borrow_mut().pop_front())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bus_preserves_order_across_producers() {
        let (sender, bus) = EventBus::new();
        let other = sender.clone();
        sender.send(Event::Load).unwrap();
        other.send(Event::Move(Direction::West)).unwrap();
        sender.send(Event::Undo).unwrap();
        drop(sender);
        drop(other);

        assert_eq!(bus.next_event().unwrap(), Some(Event::Load));
        assert_eq!(bus.next_event().unwrap(), Some(Event::Move(Direction::West)));
        assert_eq!(bus.next_event().unwrap(), Some(Event::Undo));
        assert_eq!(bus.next_event().unwrap(), None);
    }

    #[test]
    fn send_after_bus_dropped() {
        let (sender, bus) = EventBus::new();
        drop(bus);
        assert!(matches!(
            sender.send(Event::Load),
            Err(Error::EventBusClosed)
        ));
    }

    #[test]
    fn scripted() {
        let events = ScriptedEvents::new([Event::Load, Event::StartNewGame]);
        assert_eq!(events.next_event().unwrap(), Some(Event::Load));
        assert_eq!(events.next_event().unwrap(), Some(Event::StartNewGame));
        assert_eq!(events.next_event().unwrap(), None);
    }
}
