use serde_json::Value;
use tokio::sync::broadcast;

/// Store mutations, sent after they are applied
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
  /// Records of this type were written
  Ingested { type_name: String },
  /// A record was evicted
  Removed { type_name: String, identity: Value },
}

impl ChangeEvent {
  pub fn type_name(&self) -> &str {
    match self {
      ChangeEvent::Ingested { type_name } | ChangeEvent::Removed { type_name, .. } => type_name,
    }
  }
}

/// Fan-out of change events to any number of subscribers
#[derive(Debug, Clone)]
pub struct EventBus {
  tx: broadcast::Sender<ChangeEvent>,
}

impl EventBus {
  /// Create a bus buffering up to `capacity` events per lagging subscriber
  pub fn new(capacity: usize) -> Self {
    let (tx, _) = broadcast::channel(capacity);
    Self { tx }
  }

  pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
    self.tx.subscribe()
  }

  /// Send an event. Having no subscribers is not an error.
  pub fn emit(&self, event: ChangeEvent) {
    let _ = self.tx.send(event);
  }
}

impl Default for EventBus {
  fn default() -> Self {
    Self::new(64)
  }
}
