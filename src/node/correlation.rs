//! Cache bridging an outbound remote-value query to its later result.
//!
//! A query only returns the send outcome. The value arrives on a later,
//! separate dispatcher invocation and lands here; readers look here after a
//! subsequent reactor iteration, never at the send call.
//!
//! There is a single slot: any result refreshes it regardless of which query
//! it answers, so at most one outstanding query is meaningful at a time.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationState {
    last_known_value: i32,
    /// Poll cycles since the last refresh.
    staleness: u32,
    valid: bool,
    max_staleness: u32,
}

impl CorrelationState {
    pub fn new(max_staleness: u32) -> Self {
        Self {
            last_known_value: 0,
            staleness: 0,
            valid: false,
            max_staleness,
        }
    }

    /// Stores a freshly correlated value.
    pub fn refresh(&mut self, value: i32) {
        self.last_known_value = value;
        self.valid = true;
        self.staleness = 0;
    }

    /// Whether a value has ever been correlated. Not gated by staleness.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Valid and younger than the maximum age. The only staleness check.
    pub fn is_fresh(&self) -> bool {
        self.valid && self.staleness < self.max_staleness
    }

    pub fn fresh_value(&self) -> Option<i32> {
        self.is_fresh().then_some(self.last_known_value)
    }

    pub fn last_known_value(&self) -> i32 {
        self.last_known_value
    }

    pub fn staleness(&self) -> u32 {
        self.staleness
    }

    /// Returns the value to publish this poll cycle, then ages the cache by one cycle.
    pub fn take_for_publish(&mut self) -> Option<i32> {
        let value = self.fresh_value();
        if self.valid {
            self.staleness = self.staleness.saturating_add(1);
        }
        value
    }
}
