use std::{future::Future, pin::Pin, sync::Arc};

use log::*;
use tokio::{sync::mpsc, task::JoinSet};

pub type Handler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Receives events of one type and runs the handler for each of them on its own task.
///
/// The handler shuts down once every [`EventProducer`] has been dropped and all in-flight handler tasks have finished.
pub struct EventHandler<E: Send + Sync + 'static> {
    listener: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    handler: Handler<E>,
}

impl<E: Send + Sync + 'static> EventHandler<E> {
    pub fn new(buffer_size: usize, handler: Handler<E>) -> Self {
        let (sender, listener) = mpsc::channel(buffer_size.max(1));
        Self { listener, sender, handler }
    }

    pub fn subscribe(&self) -> EventProducer<E> {
        EventProducer::new(self.sender.clone())
    }

    pub async fn start_handler(self) {
        let Self { mut listener, sender, handler } = self;
        // Only producers keep the channel open from here on
        drop(sender);
        debug!("📬️ Event handler started");
        let mut in_flight = JoinSet::new();
        loop {
            tokio::select! {
                ev = listener.recv() => match ev {
                    Some(ev) => {
                        let handler = Arc::clone(&handler);
                        in_flight.spawn(async move { (handler)(ev).await });
                    },
                    None => break,
                },
                Some(done) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = done {
                        warn!("📬️ An event handler task failed. {e}");
                    }
                },
            }
        }
        trace!("📬️ All producers are gone. Waiting for {} handler tasks", in_flight.len());
        while let Some(done) = in_flight.join_next().await {
            if let Err(e) = done {
                warn!("📬️ An event handler task failed. {e}");
            }
        }
        debug!("📬️ Event handler has shut down");
    }
}

#[derive(Clone)]
pub struct EventProducer<E: Send + Sync> {
    sender: mpsc::Sender<E>,
}

impl<E: Send + Sync> EventProducer<E> {
    pub fn new(sender: mpsc::Sender<E>) -> Self {
        Self { sender }
    }

    pub async fn publish_event(&self, event: E) {
        if self.sender.send(event).await.is_err() {
            error!("📬️ Event dropped. The handler is no longer running.");
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;

    #[tokio::test]
    async fn handler_drains_every_event_before_exiting() {
        let _ = env_logger::try_init();
        let total = Arc::new(AtomicU64::new(0));
        let t2 = Arc::clone(&total);
        let handler: Handler<u64> = Arc::new(move |v| {
            let total = Arc::clone(&total);
            Box::pin(async move {
                tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;
                total.fetch_add(v, Ordering::SeqCst);
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        });
        let event_handler = EventHandler::new(2, handler);
        let customers = event_handler.subscribe();
        let vendors = event_handler.subscribe();
        tokio::spawn(async move {
            for v in [1, 3, 5, 7] {
                customers.publish_event(v).await;
            }
        });
        tokio::spawn(async move {
            for v in [2, 4, 6, 8] {
                vendors.publish_event(v).await;
            }
        });
        event_handler.start_handler().await;
        assert_eq!(t2.load(Ordering::SeqCst), 36);
    }
}
