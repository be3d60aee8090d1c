use crate::types::Sample;

/// Produces mono samples on demand. Must not assume any call cadence.
pub trait FrameSource: Send {
    /// Called with the granted sample rate before production starts.
    fn set_sample_rate(&mut self, _sample_rate_hz: u32) {}

    /// Write up to `out.len()` samples and return how many were written.
    /// Returning fewer than requested means the source is exhausted.
    fn fill(&mut self, out: &mut [Sample]) -> usize;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn set_sample_rate(&mut self, sample_rate_hz: u32) {
        (**self).set_sample_rate(sample_rate_hz)
    }

    fn fill(&mut self, out: &mut [Sample]) -> usize {
        (**self).fill(out)
    }
}

/// Plays back a fixed sequence of samples once.
#[derive(Clone, Debug, Default)]
pub struct SampleSequence {
    samples: Vec<Sample>,
    position: usize,
}

impl SampleSequence {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self {
            samples,
            position: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.samples.len() - self.position
    }
}

impl FrameSource for SampleSequence {
    fn fill(&mut self, out: &mut [Sample]) -> usize {
        let count = out.len().min(self.remaining());
        out[..count].copy_from_slice(&self.samples[self.position..self.position + count]);
        self.position += count;
        count
    }
}
