//! Async adapter over the blocking read loop.
//!
//! The source's `produce` call blocks for up to its read timeout, so it runs
//! on a dedicated blocking thread; samples cross into async land through an
//! SPSC ring buffer with a shared waker slot.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

use log::*;
use ringbuf::{Consumer, RingBuffer};
use tokio::task;

use super::transport::Sample;
use super::SdrSource;

/// Samples read from the source per loop iteration.
const READ_CHUNK: usize = 8192;

/// Ring capacity in samples between the read loop and the consumer.
pub const STREAM_BUFFER_SAMPLES: usize = 512_000;

pub struct SampleStream {
    consumer: Consumer<Sample>,
    waker: Arc<Mutex<Option<Waker>>>,
    stop: Arc<AtomicBool>,
    done: Arc<AtomicBool>,
}

impl SampleStream {
    /// Start `source` and drive its read loop on a blocking thread. The
    /// loop runs until [`SampleStream::stop`] (or drop), then stops the
    /// source; a stop request latches within one read timeout.
    pub fn spawn<S: SdrSource + 'static>(mut source: S) -> SampleStream {
        let buffer = RingBuffer::<Sample>::new(STREAM_BUFFER_SAMPLES);
        let (mut producer, consumer) = buffer.split();

        let shared_waker_slot = Arc::new(Mutex::new(Option::<Waker>::None));
        let stop = Arc::new(AtomicBool::new(false));
        let done = Arc::new(AtomicBool::new(false));

        let loop_waker_slot = shared_waker_slot.clone();
        let loop_stop = stop.clone();
        let loop_done = done.clone();

        task::spawn_blocking(move || {
            if source.start() {
                let mut chunk = vec![Sample::default(); READ_CHUNK];

                while !loop_stop.load(Ordering::Acquire) {
                    let n = source.produce(&mut chunk);
                    if n == 0 {
                        // failed or empty cycle; the next produce is the retry
                        continue;
                    }

                    let pushed = producer.push_slice(&chunk[..n]);
                    if pushed < n {
                        warn!("sample stream overrun, dropped {} samples", n - pushed);
                    }
                    wake(&loop_waker_slot);
                }

                if !source.stop() {
                    error!("source failed to stop cleanly");
                }
            } else {
                error!("source failed to start");
            }

            loop_done.store(true, Ordering::Release);
            wake(&loop_waker_slot);
            debug!("sample stream read loop finished");
        });

        SampleStream {
            consumer,
            waker: shared_waker_slot,
            stop,
            done,
        }
    }

    /// Request shutdown of the read loop. The stream yields whatever is
    /// still buffered and then ends.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }
}

fn wake(slot: &Arc<Mutex<Option<Waker>>>) {
    let mut guard = slot.lock().unwrap();
    if let Some(waker) = &*guard {
        waker.wake_by_ref();
    }
    *guard = None;
}

impl tokio_stream::Stream for SampleStream {
    type Item = Sample;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Sample>> {
        let this = self.get_mut();

        if let Some(sample) = this.consumer.pop() {
            return Poll::Ready(Some(sample));
        }
        if this.done.load(Ordering::Acquire) {
            return Poll::Ready(None);
        }

        *this.waker.lock().unwrap() = Some(cx.waker().clone());

        // the producer may have pushed between the pop and the waker store
        if let Some(sample) = this.consumer.pop() {
            return Poll::Ready(Some(sample));
        }
        if this.done.load(Ordering::Acquire) {
            return Poll::Ready(None);
        }

        Poll::Pending
    }
}

impl Drop for SampleStream {
    fn drop(&mut self) {
        self.stop();
        trace!("sample stream dropped, read loop canceled");
    }
}
