//! Periodic level monitor.
//!
//! Runs a background thread that samples at a fixed interval and pushes each
//! value to a sink. The only wait is the interval ticker; cancellation is
//! observed at tick boundaries and a sample that finishes after cancellation
//! is discarded.

use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error};

/// Handle to a running monitor thread.
pub struct LevelMonitor {
    cancel: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl LevelMonitor {
    /// Spawn a monitor calling `sample` every `interval` and passing the
    /// value to `sink`.
    pub fn spawn<S, F>(interval: Duration, mut sample: S, mut sink: F) -> std::io::Result<Self>
    where
        S: FnMut() -> f32 + Send + 'static,
        F: FnMut(f32) + Send + 'static,
    {
        let (cancel_tx, cancel_rx) = channel::bounded::<()>(1);
        let ticker = channel::tick(interval);

        let handle = thread::Builder::new()
            .name("level-monitor".into())
            .spawn(move || {
                debug!(?interval, "Level monitor started");
                loop {
                    channel::select! {
                        recv(cancel_rx) -> _ => break,
                        recv(ticker) -> _ => {
                            let value = sample();
                            if cancelled(&cancel_rx) {
                                break;
                            }
                            sink(value);
                        }
                    }
                }
                debug!("Level monitor stopped");
            })?;

        Ok(Self {
            cancel: Some(cancel_tx),
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Cancel and wait for the thread to exit. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            // A full channel or a gone receiver both mean the thread will exit.
            let _ = cancel.try_send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Level monitor thread panicked");
            }
        }
    }
}

impl Drop for LevelMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn cancelled(cancel_rx: &Receiver<()>) -> bool {
    !matches!(cancel_rx.try_recv(), Err(TryRecvError::Empty))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn test_monitor_delivers_samples() {
        let (tx, rx) = channel::unbounded();
        let mut next = 0.0f32;

        let mut monitor = LevelMonitor::spawn(
            Duration::from_millis(5),
            move || {
                next += 0.1;
                next
            },
            move |v| {
                let _ = tx.send(v);
            },
        )
        .unwrap();

        let values: Vec<f32> = (0..3).map(|_| rx.recv_timeout(WAIT).unwrap()).collect();
        monitor.stop();

        assert!(values.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn test_no_samples_after_stop() {
        let count = Arc::new(AtomicUsize::new(0));
        let sink_count = count.clone();
        let (first_tx, first_rx) = channel::bounded::<()>(1);

        let mut monitor = LevelMonitor::spawn(
            Duration::from_millis(5),
            || 0.5,
            move |_| {
                sink_count.fetch_add(1, Ordering::SeqCst);
                let _ = first_tx.try_send(());
            },
        )
        .unwrap();

        first_rx.recv_timeout(WAIT).unwrap();
        monitor.stop();
        assert!(!monitor.is_running());

        let after_stop = count.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(count.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn test_sample_racing_stop_is_discarded() {
        let delivered = Arc::new(AtomicUsize::new(0));
        let sink_delivered = delivered.clone();
        let (entered_tx, entered_rx) = channel::bounded::<()>(1);
        let (release_tx, release_rx) = channel::bounded::<()>(1);

        let mut monitor = LevelMonitor::spawn(
            Duration::from_millis(5),
            move || {
                let _ = entered_tx.try_send(());
                let _ = release_rx.recv();
                1.0
            },
            move |_| {
                sink_delivered.fetch_add(1, Ordering::SeqCst);
            },
        )
        .unwrap();

        // Cancel while the first sample is in flight, then let it finish.
        entered_rx.recv().unwrap();
        let cancel = monitor.cancel.take().unwrap();
        cancel.send(()).unwrap();
        release_tx.send(()).unwrap();
        monitor.stop();

        assert_eq!(delivered.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_stop_twice() {
        let mut monitor = LevelMonitor::spawn(Duration::from_millis(5), || 0.0, |_| {}).unwrap();
        monitor.stop();
        monitor.stop();
        assert!(!monitor.is_running());
    }
}
