use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{DonationUpdatedEvent, EventHandler, EventProducer, Handler, MatchingRequested};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub matching_requested_producer: Vec<EventProducer<MatchingRequested>>,
    pub donation_updated_producer: Vec<EventProducer<DonationUpdatedEvent>>,
}

impl EventProducers {
    /// Queues `event` for every matching subscriber without waiting for room in the queue. Returns the number of
    /// subscribers that accepted it.
    pub fn request_matching(&self, event: MatchingRequested) -> usize {
        self.matching_requested_producer.iter().filter(|p| p.try_publish_event(event.clone())).count()
    }

    /// Queues `event` for every donation update subscriber without waiting for room in the queue. Returns the number
    /// of subscribers that accepted it.
    pub fn publish_donation_updated(&self, event: DonationUpdatedEvent) -> usize {
        self.donation_updated_producer.iter().filter(|p| p.try_publish_event(event.clone())).count()
    }
}

pub struct EventHandlers {
    pub on_matching_requested: Option<EventHandler<MatchingRequested>>,
    pub on_donation_updated: Option<EventHandler<DonationUpdatedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_matching_requested = hooks.on_matching_requested.map(|f| EventHandler::new(buffer_size, f));
        let on_donation_updated = hooks.on_donation_updated.map(|f| EventHandler::new(buffer_size, f));
        Self { on_matching_requested, on_donation_updated }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_matching_requested {
            result.matching_requested_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_donation_updated {
            result.donation_updated_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_matching_requested {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_donation_updated {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_matching_requested: Option<Handler<MatchingRequested>>,
    pub on_donation_updated: Option<Handler<DonationUpdatedEvent>>,
}

impl EventHooks {
    pub fn on_matching_requested<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(MatchingRequested) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_matching_requested = Some(Arc::new(f));
        self
    }

    pub fn on_donation_updated<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(DonationUpdatedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_donation_updated = Some(Arc::new(f));
        self
    }
}
