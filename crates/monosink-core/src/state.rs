use std::sync::atomic::{AtomicU8, Ordering};

/// Sink lifecycle. `Closed` is terminal: a closed sink is never reopened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SinkState {
    Closed,
    Opening,
    Open,
    Closing,
}

impl SinkState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Opening,
            2 => Self::Open,
            3 => Self::Closing,
            _ => Self::Closed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Closed => 0,
            Self::Opening => 1,
            Self::Open => 2,
            Self::Closing => 3,
        }
    }
}

/// Single-writer (the sink), multi-reader (the real-time path) state flag.
#[derive(Debug)]
pub struct StateCell {
    state: AtomicU8,
}

impl StateCell {
    pub fn new(state: SinkState) -> Self {
        Self {
            state: AtomicU8::new(state.as_u8()),
        }
    }

    pub fn set(&self, state: SinkState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    pub fn get(&self) -> SinkState {
        SinkState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_open(&self) -> bool {
        self.get() == SinkState::Open
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new(SinkState::Closed)
    }
}
