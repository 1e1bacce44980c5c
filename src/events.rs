use tokio::sync::broadcast;

/// Process-wide domain signals the engine publishes and consumes. Collaborator
/// features (uploads, employee CRUD, holiday management) publish on the same
/// bus to invalidate the engine's caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainEvent {
    AttendanceUpdated,
    RefreshEmployeeData,
    DataUploaded,
    EmployeeAdded,
    HolidayUpdated,
}

/// Thin wrapper over a broadcast channel so collaborators share one explicit
/// pub/sub seam instead of ambient global signaling.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish to all current subscribers. Dropped when nobody listens.
    pub fn publish(&self, event: DomainEvent) {
        let n = self.tx.send(event).unwrap_or(0);
        tracing::debug!(?event, subscribers = n, "domain event published");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        bus.publish(DomainEvent::DataUploaded);
        assert_eq!(rx.recv().await.unwrap(), DomainEvent::DataUploaded);
    }

    #[tokio::test]
    async fn publishing_without_subscribers_is_harmless() {
        let bus = EventBus::new(8);
        bus.publish(DomainEvent::HolidayUpdated);
    }
}
