use crate::error::InfernumError;
use std::{
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicUsize, Ordering},
        mpsc,
    },
    time::Duration,
};

/// Result of polling a [`CorrelationChannel`].
#[derive(Debug, PartialEq)]
pub enum Polled<T> {
    /// The next message in FIFO order.
    Message(T),
    /// Nothing arrived within the timeout.
    Empty,
    /// The channel was closed and every queued message has been delivered.
    Closed,
}

/// Unbounded FIFO queue shared between any number of producers and one consumer.
///
/// Pushing never blocks. Closing the channel stops intake but keeps the queued
/// messages available to the consumer, which sees [`Polled::Closed`] once the
/// queue is drained.
pub struct CorrelationChannel<T> {
    tx: Mutex<Option<mpsc::Sender<T>>>,
    rx: Mutex<mpsc::Receiver<T>>,
    len: AtomicUsize,
}

impl<T> CorrelationChannel<T> {
    /// Creates an open, empty channel.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(rx),
            len: AtomicUsize::new(0),
        }
    }

    /// Enqueues a message and returns immediately.
    pub fn push(&self, message: T) -> Result<(), InfernumError> {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = tx.as_ref() else {
            return Err(InfernumError::ChannelClosed);
        };
        // count before sending so a fast consumer never underflows the counter
        self.len.fetch_add(1, Ordering::SeqCst);
        tx.send(message).map_err(|_| {
            self.len.fetch_sub(1, Ordering::SeqCst);
            InfernumError::ChannelClosed
        })
    }

    /// Waits at most `timeout` for the next message.
    ///
    /// Meant for a single consumer: concurrent pollers queue up on an internal
    /// lock and may wait longer than their timeout.
    pub fn poll(&self, timeout: Duration) -> Polled<T> {
        let rx = self.rx.lock().unwrap_or_else(PoisonError::into_inner);
        match rx.recv_timeout(timeout) {
            Ok(message) => {
                self.len.fetch_sub(1, Ordering::SeqCst);
                Polled::Message(message)
            }
            Err(mpsc::RecvTimeoutError::Timeout) => Polled::Empty,
            Err(mpsc::RecvTimeoutError::Disconnected) => Polled::Closed,
        }
    }

    /// Stops accepting new messages. Already queued messages stay deliverable.
    pub fn close(&self) {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    /// Returns true once [`CorrelationChannel::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Number of messages pushed but not yet polled.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::SeqCst)
    }

    /// Returns true when no message is waiting to be polled.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for CorrelationChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, thread};

    const SHORT: Duration = Duration::from_millis(20);

    #[test]
    fn keeps_fifo_order() {
        let channel = CorrelationChannel::new();
        for i in 0..5 {
            channel.push(i).unwrap();
        }
        assert_eq!(channel.len(), 5);
        for i in 0..5 {
            assert_eq!(channel.poll(SHORT), Polled::Message(i));
        }
        assert!(channel.is_empty());
    }

    #[test]
    fn poll_times_out_when_empty() {
        let channel = CorrelationChannel::<u8>::new();
        let started = std::time::Instant::now();
        assert_eq!(channel.poll(SHORT), Polled::Empty);
        assert!(started.elapsed() >= SHORT);
    }

    #[test]
    fn close_drains_before_reporting_closed() {
        let channel = CorrelationChannel::new();
        channel.push("a").unwrap();
        channel.push("b").unwrap();
        channel.close();

        assert!(channel.is_closed());
        assert!(matches!(channel.push("c"), Err(InfernumError::ChannelClosed)));
        assert_eq!(channel.poll(SHORT), Polled::Message("a"));
        assert_eq!(channel.poll(SHORT), Polled::Message("b"));
        assert_eq!(channel.poll(SHORT), Polled::Closed);
    }

    #[test]
    fn concurrent_producers_lose_nothing() {
        let channel = Arc::new(CorrelationChannel::new());
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let channel = channel.clone();
                thread::spawn(move || {
                    for i in 0..100 {
                        channel.push((p, i)).unwrap();
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        let mut last_seen = [None; 4];
        let mut received = 0;
        while let Polled::Message((p, i)) = channel.poll(SHORT) {
            // per producer order is preserved
            assert!(last_seen[p].is_none_or(|last| last < i));
            last_seen[p] = Some(i);
            received += 1;
        }
        assert_eq!(received, 400);
    }
}
