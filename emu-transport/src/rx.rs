use crate::channel::MessageRx;
use crate::stats::VethStats;
use crossbeam::channel::Sender;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Body of the receive worker: forwards whole messages, unparsed, to the delivery queue.
///
/// Channel errors are counted and retried after `backoff`; the loop only ends once `stop` is
/// set or the consumer dropped the queue.
pub(crate) fn rx_loop(
    mut rx: Box<dyn MessageRx>,
    queue: Sender<Vec<u8>>,
    stop: Arc<AtomicBool>,
    stats: Arc<VethStats>,
    backoff: Duration,
) {
    let mut failing = false;
    loop {
        if stop.load(Ordering::Acquire) {
            break;
        }
        match rx.recv_msg() {
            Ok(msg) => {
                failing = false;
                if queue.send(msg).is_err() {
                    break;
                }
            }
            Err(e) => {
                if stop.load(Ordering::Acquire) {
                    break;
                }
                VethStats::inc(&stats.rx_channel_err);
                if failing {
                    debug!(error = %e, "receive still failing");
                } else {
                    warn!(error = %e, "receive failed, retrying");
                    failing = true;
                }
                thread::sleep(backoff);
            }
        }
    }
    debug!("receive worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{self, MessageTx};
    use crossbeam::channel::bounded;

    #[test]
    fn forwards_in_order_and_stops_on_close() {
        let (mut tx, rx) = channel::channel();
        let closer = rx.close_handle();
        let (queue_tx, queue_rx) = bounded(4);
        let stop = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(VethStats::new());

        let worker = {
            let stop = Arc::clone(&stop);
            let stats = Arc::clone(&stats);
            thread::spawn(move || {
                rx_loop(Box::new(rx), queue_tx, stop, stats, Duration::from_millis(1))
            })
        };
        tx.send_msg(b"a").unwrap();
        tx.send_msg(b"b").unwrap();
        assert_eq!(queue_rx.recv().unwrap(), b"a");
        assert_eq!(queue_rx.recv().unwrap(), b"b");

        stop.store(true, Ordering::Release);
        closer.close();
        worker.join().unwrap();
        assert_eq!(stats.snapshot().rx_channel_err, 0);
    }

    #[test]
    fn errors_are_retried() {
        let (tx, rx) = channel::channel();
        drop(tx);
        let (queue_tx, _queue_rx) = bounded(1);
        let stop = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(VethStats::new());

        let worker = {
            let stop = Arc::clone(&stop);
            let stats = Arc::clone(&stats);
            thread::spawn(move || {
                rx_loop(Box::new(rx), queue_tx, stop, stats, Duration::from_millis(1))
            })
        };
        while stats.snapshot().rx_channel_err < 3 {
            thread::sleep(Duration::from_millis(1));
        }
        stop.store(true, Ordering::Release);
        worker.join().unwrap();
    }

    #[test]
    fn stops_when_queue_dropped() {
        let (mut tx, rx) = channel::channel();
        let (queue_tx, queue_rx) = bounded(1);
        drop(queue_rx);
        tx.send_msg(b"x").unwrap();
        rx_loop(
            Box::new(rx),
            queue_tx,
            Arc::new(AtomicBool::new(false)),
            Arc::new(VethStats::new()),
            Duration::from_millis(1),
        );
    }
}
