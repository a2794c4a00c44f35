use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::navigation::{Direction, ResizeOrigin};
use crate::progress::ChapterStatus;
use crate::xapi::{Statement, XapiReport};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BookEvent {
    ChapterAttached {
        chapter: usize,
    },
    ChapterActivated {
        from: usize,
        to: usize,
    },
    TransitionStarted {
        from: usize,
        to: usize,
        direction: Direction,
    },
    TransitionFinished {
        chapter: usize,
    },
    AddressBarUpdated {
        fragment: String,
    },
    ScrollToSection {
        chapter: usize,
        section: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        header_number: Option<u32>,
    },
    ScrollToTop,
    ChapterStatusChanged {
        chapter: usize,
        status: ChapterStatus,
    },
    SectionTaskDone {
        chapter: usize,
        section: usize,
    },
    ChapterCompleted {
        chapter: usize,
        chapter_id: String,
        score: u32,
        max_score: u32,
        statement: Box<Statement>,
    },
    BookCompleted {
        score: u32,
        max_score: u32,
        report: Box<XapiReport>,
    },
    IndicatorsReset,
    CoverRemoved,
    ResizeRequested {
        origin: ResizeOrigin,
    },
    ContentFault {
        chapter: usize,
        section: String,
        operation: String,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ChapterAttached,
    ChapterActivated,
    TransitionStarted,
    TransitionFinished,
    AddressBarUpdated,
    ScrollToSection,
    ScrollToTop,
    ChapterStatusChanged,
    SectionTaskDone,
    ChapterCompleted,
    BookCompleted,
    IndicatorsReset,
    CoverRemoved,
    ResizeRequested,
    ContentFault,
}

impl BookEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ChapterAttached { .. } => EventKind::ChapterAttached,
            Self::ChapterActivated { .. } => EventKind::ChapterActivated,
            Self::TransitionStarted { .. } => EventKind::TransitionStarted,
            Self::TransitionFinished { .. } => EventKind::TransitionFinished,
            Self::AddressBarUpdated { .. } => EventKind::AddressBarUpdated,
            Self::ScrollToSection { .. } => EventKind::ScrollToSection,
            Self::ScrollToTop => EventKind::ScrollToTop,
            Self::ChapterStatusChanged { .. } => EventKind::ChapterStatusChanged,
            Self::SectionTaskDone { .. } => EventKind::SectionTaskDone,
            Self::ChapterCompleted { .. } => EventKind::ChapterCompleted,
            Self::BookCompleted { .. } => EventKind::BookCompleted,
            Self::IndicatorsReset => EventKind::IndicatorsReset,
            Self::CoverRemoved => EventKind::CoverRemoved,
            Self::ResizeRequested { .. } => EventKind::ResizeRequested,
            Self::ContentFault { .. } => EventKind::ContentFault,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Box<dyn FnMut(&BookEvent) + Send>;

struct Subscriber {
    id: SubscriptionId,
    kind: Option<EventKind>,
    handler: Handler,
}

/// Per-book event bus. Several books on one page never see each other's events.
#[derive(Default)]
pub struct Mediator {
    subscribers: Vec<Subscriber>,
    next_id: u64,
}

impl std::fmt::Debug for Mediator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mediator")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl Mediator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &mut self,
        kind: EventKind,
        handler: impl FnMut(&BookEvent) + Send + 'static,
    ) -> SubscriptionId {
        self.add(Some(kind), Box::new(handler))
    }

    pub fn subscribe_all(
        &mut self,
        handler: impl FnMut(&BookEvent) + Send + 'static,
    ) -> SubscriptionId {
        self.add(None, Box::new(handler))
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.id != id);
        before != self.subscribers.len()
    }

    pub fn publish(&mut self, event: BookEvent) {
        tracing::trace!(?event, "publish");
        let kind = event.kind();
        for subscriber in &mut self.subscribers {
            if subscriber.kind.is_none_or(|k| k == kind) {
                (subscriber.handler)(&event);
            }
        }
    }

    /// Subscribes a recorder that keeps every published event.
    pub fn record_all(&mut self) -> EventLog {
        let log = EventLog::default();
        let sink = log.clone();
        self.subscribe_all(move |event| sink.push(event.clone()));
        log
    }

    fn add(&mut self, kind: Option<EventKind>, handler: Handler) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.subscribers.push(Subscriber { id, kind, handler });
        id
    }
}

#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<BookEvent>>>,
}

impl EventLog {
    fn push(&self, event: BookEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    pub fn snapshot(&self) -> Vec<BookEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Removes and returns everything recorded so far.
    pub fn drain(&self) -> Vec<BookEvent> {
        self.events
            .lock()
            .map(|mut e| std::mem::take(&mut *e))
            .unwrap_or_default()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.snapshot().iter().filter(|e| e.kind() == kind).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_filtered_subscribers_only_see_their_kind() {
        let mut mediator = Mediator::new();
        let all = mediator.record_all();
        let seen = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&seen);
        mediator.subscribe(EventKind::CoverRemoved, move |_| {
            *counter.lock().unwrap() += 1;
        });

        mediator.publish(BookEvent::ScrollToTop);
        mediator.publish(BookEvent::CoverRemoved);

        assert_eq!(*seen.lock().unwrap(), 1);
        assert_eq!(all.snapshot().len(), 2);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let mut mediator = Mediator::new();
        let log = EventLog::default();
        let sink = log.clone();
        let id = mediator.subscribe_all(move |e| sink.push(e.clone()));
        assert!(mediator.unsubscribe(id));
        assert!(!mediator.unsubscribe(id));
        mediator.publish(BookEvent::IndicatorsReset);
        assert!(log.snapshot().is_empty());
    }

    #[test]
    fn drain_empties_the_log() {
        let mut mediator = Mediator::new();
        let log = mediator.record_all();
        mediator.publish(BookEvent::ScrollToTop);
        assert_eq!(log.drain().len(), 1);
        assert!(log.snapshot().is_empty());
    }
}
