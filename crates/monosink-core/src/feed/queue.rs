use crate::error::SinkError;
use monosink_ports::types::Sample;
use rtrb::{Consumer, Producer, RingBuffer};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread;
use std::time::{Duration, Instant};

/// Closed flag shared by both ends of a feed.
#[derive(Debug, Default)]
pub struct FeedShared {
    closed: AtomicBool,
}

impl FeedShared {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Result of a single non-blocking dequeue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dequeue {
    Sample(Sample),
    Empty,
    Closed,
}

/// Bounded FIFO between the producer and the real-time consumer.
pub fn sample_queue(
    capacity: usize,
    backoff: Duration,
    shared: Arc<FeedShared>,
) -> (SampleProducer, SampleConsumer) {
    let (producer, consumer) = RingBuffer::new(capacity.max(1));
    (
        SampleProducer {
            producer,
            shared: Arc::clone(&shared),
            backoff,
        },
        SampleConsumer { consumer, shared },
    )
}

pub struct SampleProducer {
    producer: Producer<Sample>,
    shared: Arc<FeedShared>,
    backoff: Duration,
}

impl SampleProducer {
    pub fn capacity(&self) -> usize {
        self.producer.buffer().capacity()
    }

    /// Samples waiting to be consumed.
    pub fn queued(&self) -> usize {
        self.capacity() - self.producer.slots()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Enqueue as many samples as currently fit, without waiting.
    pub fn try_push(&mut self, samples: &[Sample]) -> Result<usize, SinkError> {
        if self.shared.is_closed() {
            return Err(SinkError::FeedClosed);
        }
        Ok(self.write_available(samples))
    }

    /// Enqueue every sample, waiting for space while the queue is full.
    pub fn push_blocking(&mut self, samples: &[Sample]) -> Result<(), SinkError> {
        self.push_until(samples, None).map(|_| ())
    }

    /// Like [`push_blocking`](Self::push_blocking) but gives up after
    /// `timeout`, returning how many samples made it into the queue.
    pub fn push_timeout(
        &mut self,
        samples: &[Sample],
        timeout: Duration,
    ) -> Result<usize, SinkError> {
        self.push_until(samples, Some(Instant::now() + timeout))
    }

    pub(crate) fn push_until(
        &mut self,
        samples: &[Sample],
        deadline: Option<Instant>,
    ) -> Result<usize, SinkError> {
        let mut written = 0;
        loop {
            if self.shared.is_closed() {
                return Err(SinkError::FeedClosed);
            }

            written += self.write_available(&samples[written..]);
            if written == samples.len() {
                return Ok(written);
            }

            let mut pause = self.backoff;
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    return Ok(written);
                }
                pause = pause.min(deadline - now);
            }
            thread::sleep(pause);
        }
    }

    /// Wait until the consumer has drained the queue. Returns false on timeout.
    pub fn wait_drained(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.queued() > 0 {
            if self.shared.is_closed() || Instant::now() >= deadline {
                return false;
            }
            thread::sleep(self.backoff);
        }
        true
    }

    fn write_available(&mut self, samples: &[Sample]) -> usize {
        let count = samples.len().min(self.producer.slots());
        if count == 0 {
            return 0;
        }
        match self.producer.write_chunk_uninit(count) {
            Ok(chunk) => chunk.fill_from_iter(samples[..count].iter().copied()),
            Err(_) => 0,
        }
    }
}

pub struct SampleConsumer {
    consumer: Consumer<Sample>,
    shared: Arc<FeedShared>,
}

impl SampleConsumer {
    /// Never blocks.
    pub fn dequeue(&mut self) -> Dequeue {
        if self.shared.is_closed() {
            return Dequeue::Closed;
        }
        match self.consumer.pop() {
            Ok(sample) => Dequeue::Sample(sample),
            Err(_) if self.consumer.is_abandoned() => Dequeue::Closed,
            Err(_) => Dequeue::Empty,
        }
    }

    pub fn available(&self) -> usize {
        self.consumer.slots()
    }
}
