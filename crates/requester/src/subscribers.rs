use std::sync::{Arc, RwLock};

use viridian_execution_data::ExecutionData;
use viridian_types::Height;

/// Callback invoked once per notified height, in strict height order.
///
/// Implementations must be concurrency safe, non-blocking, and idempotent:
/// a crash between the fan-out and the checkpoint write replays the last
/// height on restart.
pub type ExecutionDataCallback = Box<dyn Fn(Height, Arc<ExecutionData>) + Send + Sync>;

/// Append-only subscriber registry. Registering the same callback twice
/// means it runs twice per height.
#[derive(Default)]
pub(crate) struct SubscriberSet {
    subscribers: RwLock<Vec<ExecutionDataCallback>>,
}

impl SubscriberSet {
    pub(crate) fn add(
        &self,
        callback: impl Fn(Height, Arc<ExecutionData>) + Send + Sync + 'static,
    ) {
        self.subscribers.write().unwrap().push(Box::new(callback));
    }

    pub(crate) fn notify(&self, height: Height, data: &Arc<ExecutionData>) {
        let subscribers = self.subscribers.read().unwrap();
        for subscriber in subscribers.iter() {
            subscriber(height, Arc::clone(data));
        }
    }
}
