use crate::error::{IntegrityViolation, SinkError};
use crate::feed::queue::{sample_queue, Dequeue, FeedShared, SampleConsumer, SampleProducer};
use crate::state::StateCell;
use crate::stats::FeedStats;
use monosink_ports::audio::RenderCallback;
use parking_lot::Mutex;
use std::ffi::{c_int, c_void};
use std::mem;
use std::ptr::NonNull;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;
use tracing::error;

pub const CONTEXT_TAG: u64 = u64::from_be_bytes(*b"MONOSINK");
pub const RELEASED_TAG: u64 = u64::from_be_bytes(*b"RELEASED");

/// State reachable from the driver's render callback through an untyped
/// pointer. The leading tag is checked on every invocation.
#[repr(C)]
pub struct CallbackContext {
    tag: AtomicU64,
    state: Arc<StateCell>,
    stats: Arc<FeedStats>,
    consumer: Mutex<Option<SampleConsumer>>,
}

impl CallbackContext {
    pub fn new(state: Arc<StateCell>, stats: Arc<FeedStats>) -> Self {
        Self {
            tag: AtomicU64::new(CONTEXT_TAG),
            state,
            stats,
            consumer: Mutex::new(None),
        }
    }

    pub fn install(&self, consumer: SampleConsumer) {
        *self.consumer.lock() = Some(consumer);
    }

    pub fn validate(&self) -> Result<(), IntegrityViolation> {
        let found = self.tag.load(Ordering::Acquire);
        if found == CONTEXT_TAG {
            Ok(())
        } else {
            Err(IntegrityViolation { found })
        }
    }

    /// # Safety
    /// `userdata` must be null or point to memory that is at least as large
    /// as a `CallbackContext` and readable for the duration of the call.
    pub unsafe fn from_userdata<'a>(
        userdata: *mut c_void,
    ) -> Result<&'a CallbackContext, IntegrityViolation> {
        if userdata.is_null() || userdata as usize % mem::align_of::<CallbackContext>() != 0 {
            return Err(IntegrityViolation {
                found: userdata as usize as u64,
            });
        }
        let context = &*(userdata as *const CallbackContext);
        context.validate()?;
        Ok(context)
    }

    /// Fill `out` with native-endian samples. Once the queue reports empty
    /// or closed, the rest of `out` is silence. Returns samples delivered.
    pub fn render(&self, out: &mut [u8]) -> usize {
        let open = self.state.is_open();
        let mut guard = if open { self.consumer.try_lock() } else { None };
        let mut source = guard
            .as_mut()
            .and_then(|slot| Option::as_mut(&mut **slot));

        let mut delivered = 0;
        let mut chunks = out.chunks_exact_mut(2);
        for slot in &mut chunks {
            let sample = match source.as_mut().map(|consumer| consumer.dequeue()) {
                Some(Dequeue::Sample(sample)) => {
                    delivered += 1;
                    sample
                }
                _ => {
                    source = None;
                    0
                }
            };
            slot.copy_from_slice(&sample.to_ne_bytes());
        }
        chunks.into_remainder().fill(0);

        let underrun = open && delivered < out.len() / 2;
        self.stats.record_callback(delivered, underrun);
        delivered
    }
}

/// Render callback handed to drivers for the pull strategy.
///
/// # Safety
/// `userdata` must come from [`PinnedContext::render_callback`] and `stream`
/// must be valid for `len` writable bytes. A context that fails validation
/// aborts the process.
pub unsafe extern "C" fn fill_buffer(userdata: *mut c_void, stream: *mut u8, len: c_int) {
    let context = match CallbackContext::from_userdata(userdata) {
        Ok(context) => context,
        Err(violation) => {
            error!("{}", violation);
            std::process::abort();
        }
    };
    if stream.is_null() || len <= 0 {
        return;
    }
    let out = std::slice::from_raw_parts_mut(stream, len as usize);
    context.render(out);
}

/// Heap-allocated callback context with a stable address. Dropping it
/// poisons the tag before freeing.
pub struct PinnedContext {
    ptr: NonNull<CallbackContext>,
}

// The pointee is Send + Sync; the raw pointer only exists so the driver
// thread can reach it without a Rust reference.
unsafe impl Send for PinnedContext {}
unsafe impl Sync for PinnedContext {}

impl PinnedContext {
    pub fn new(context: CallbackContext) -> Self {
        Self {
            ptr: NonNull::from(Box::leak(Box::new(context))),
        }
    }

    pub fn context(&self) -> &CallbackContext {
        unsafe { self.ptr.as_ref() }
    }

    pub fn render_callback(&self) -> RenderCallback {
        RenderCallback {
            func: fill_buffer,
            userdata: self.ptr.as_ptr() as *mut c_void,
        }
    }
}

impl Drop for PinnedContext {
    fn drop(&mut self) {
        unsafe {
            self.ptr.as_ref().tag.store(RELEASED_TAG, Ordering::SeqCst);
            drop(Box::from_raw(self.ptr.as_ptr()));
        }
    }
}

/// Pull strategy: the producer fills a bounded queue, the driver drains it
/// through [`fill_buffer`].
pub struct PullFeed {
    shared: Arc<FeedShared>,
    producer: Option<SampleProducer>,
    context: Option<PinnedContext>,
}

impl PullFeed {
    pub fn new(state: Arc<StateCell>, stats: Arc<FeedStats>) -> Self {
        Self {
            shared: Arc::new(FeedShared::new()),
            producer: None,
            context: Some(PinnedContext::new(CallbackContext::new(state, stats))),
        }
    }

    pub fn render_callback(&self) -> Option<RenderCallback> {
        self.context.as_ref().map(PinnedContext::render_callback)
    }

    /// Create the queue once the granted buffer size is known.
    pub fn attach_queue(&mut self, capacity: usize, backoff: Duration) {
        let (producer, consumer) = sample_queue(capacity, backoff, Arc::clone(&self.shared));
        if let Some(context) = self.context.as_ref() {
            context.context().install(consumer);
        }
        self.producer = Some(producer);
    }

    pub fn producer_mut(&mut self) -> Result<&mut SampleProducer, SinkError> {
        if self.shared.is_closed() {
            return Err(SinkError::FeedClosed);
        }
        self.producer.as_mut().ok_or(SinkError::FeedClosed)
    }

    pub fn producer(&self) -> Option<&SampleProducer> {
        self.producer.as_ref()
    }

    pub fn take_producer(&mut self) -> Result<SampleProducer, SinkError> {
        if self.shared.is_closed() {
            return Err(SinkError::FeedClosed);
        }
        self.producer.take().ok_or(SinkError::FeedClosed)
    }

    pub fn close(&self) {
        self.shared.close();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Must only run after the device has been closed.
    pub fn release_context(&mut self) -> bool {
        self.context.take().is_some()
    }
}
