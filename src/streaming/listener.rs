// =============================================================================
// Bar listeners — typed push delivery with per-handler isolation
// =============================================================================

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::BridgeError;
use crate::types::{Bar, SubscriberId};

/// Receives the updated in-progress bar of one subscription.
pub trait BarListener: Send + Sync {
    fn on_bar(&self, bar: &Bar) -> anyhow::Result<()>;
}

impl<F> BarListener for F
where
    F: Fn(&Bar) + Send + Sync,
{
    fn on_bar(&self, bar: &Bar) -> anyhow::Result<()> {
        self(bar);
        Ok(())
    }
}

/// A (subscriber id, listener) pair attached to a subscription entry.
#[derive(Clone)]
pub struct Handler {
    pub id: SubscriberId,
    pub listener: Arc<dyn BarListener>,
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler").field("id", &self.id).finish_non_exhaustive()
    }
}

/// Invoke every handler with `bar`, in order.
///
/// A listener that returns an error or panics is logged and skipped; the
/// remaining handlers still run. Returns the number of successful deliveries.
pub fn deliver(handlers: &[Handler], bar: &Bar) -> usize {
    let mut delivered = 0;

    for handler in handlers {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.listener.on_bar(bar)));
        let reason = match outcome {
            Ok(Ok(())) => {
                delivered += 1;
                continue;
            }
            Ok(Err(e)) => format!("{e:#}"),
            Err(payload) => panic_message(payload.as_ref()),
        };

        let err = BridgeError::Callback {
            subscriber: handler.id.clone(),
            reason,
        };
        warn!(error = %err, "bar listener failed");
    }

    debug!(delivered, handlers = handlers.len(), close = bar.close, "bar delivered");
    delivered
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "listener panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Failing;

    impl BarListener for Failing {
        fn on_bar(&self, _bar: &Bar) -> anyhow::Result<()> {
            anyhow::bail!("chart detached")
        }
    }

    fn sample_bar() -> Bar {
        Bar {
            time: 1000,
            open: 100.0,
            high: 105.0,
            low: 100.0,
            close: 105.0,
            volume: None,
        }
    }

    fn recording(id: &str, sink: &Arc<Mutex<Vec<String>>>) -> Handler {
        let sink = sink.clone();
        let tag = id.to_string();
        Handler {
            id: id.to_string(),
            listener: Arc::new(move |_bar: &Bar| sink.lock().push(tag.clone())),
        }
    }

    #[test]
    fn delivers_in_insertion_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handlers = vec![recording("A", &seen), recording("B", &seen)];
        assert_eq!(deliver(&handlers, &sample_bar()), 2);
        assert_eq!(*seen.lock(), vec!["A", "B"]);
    }

    #[test]
    fn failing_listener_does_not_stop_others() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handlers = vec![
            Handler {
                id: "bad".into(),
                listener: Arc::new(Failing),
            },
            recording("good", &seen),
        ];
        assert_eq!(deliver(&handlers, &sample_bar()), 1);
        assert_eq!(*seen.lock(), vec!["good"]);
    }

    #[test]
    fn panicking_listener_is_contained() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handlers = vec![
            Handler {
                id: "panics".into(),
                listener: Arc::new(|_bar: &Bar| panic!("boom")),
            },
            recording("after", &seen),
        ];
        assert_eq!(deliver(&handlers, &sample_bar()), 1);
        assert_eq!(*seen.lock(), vec!["after"]);
    }

    #[test]
    fn panic_message_extracts_text() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
    }
}
