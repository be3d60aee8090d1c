use monosink_ports::source::FrameSource;
use monosink_ports::types::Sample;
use std::f32::consts::TAU;
use std::time::Duration;

const RELEASE_SECS: f32 = 0.02;

/// Sine tone generator. Unbounded unless given a duration, in which case
/// the last few milliseconds ramp down to silence.
#[derive(Clone, Debug)]
pub struct ToneSource {
    freq_hz: f32,
    amplitude: f32,
    sample_rate_hz: f32,
    phase: f32,
    duration: Option<Duration>,
    total_samples: Option<u64>,
    produced: u64,
}

impl ToneSource {
    pub fn new(freq_hz: f32, amplitude: f32) -> Self {
        Self {
            freq_hz: freq_hz.max(0.0),
            amplitude: amplitude.clamp(0.0, 1.0),
            sample_rate_hz: 48_000.0,
            phase: 0.0,
            duration: None,
            total_samples: None,
            produced: 0,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self.recompute_total();
        self
    }

    pub fn freq_hz(&self) -> f32 {
        self.freq_hz
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz as u32
    }

    pub fn remaining(&self) -> Option<u64> {
        self.total_samples
            .map(|total| total.saturating_sub(self.produced))
    }

    fn recompute_total(&mut self) {
        self.total_samples = self
            .duration
            .map(|duration| (duration.as_secs_f64() * self.sample_rate_hz as f64).round() as u64);
    }

    fn gain_at(&self, index: u64) -> f32 {
        let Some(total) = self.total_samples else {
            return 1.0;
        };
        let release = (self.sample_rate_hz * RELEASE_SECS) as u64;
        let left = total.saturating_sub(index);
        if release == 0 || left >= release {
            1.0
        } else {
            left as f32 / release as f32
        }
    }
}

impl Default for ToneSource {
    fn default() -> Self {
        Self::new(440.0, 0.5)
    }
}

impl FrameSource for ToneSource {
    fn set_sample_rate(&mut self, sample_rate_hz: u32) {
        self.sample_rate_hz = sample_rate_hz.max(1) as f32;
        self.recompute_total();
    }

    fn fill(&mut self, out: &mut [Sample]) -> usize {
        let count = match self.remaining() {
            Some(remaining) => out.len().min(remaining as usize),
            None => out.len(),
        };

        let phase_step = TAU * self.freq_hz / self.sample_rate_hz;
        let peak = Sample::MAX as f32 * self.amplitude;
        for (offset, slot) in out[..count].iter_mut().enumerate() {
            let gain = self.gain_at(self.produced + offset as u64);
            *slot = (self.phase.sin() * peak * gain) as Sample;
            self.phase += phase_step;
            if self.phase >= TAU {
                self.phase -= TAU;
            }
        }

        self.produced += count as u64;
        count
    }
}
