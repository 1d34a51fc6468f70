use rand::Rng;
use tokio::time::Duration;
use tokio::time::Instant;

#[derive(Clone, Debug)]
pub struct ElectionTimer {
    pub next_deadline: Instant,
    pub timeout_range: (u64, u64),
}

impl ElectionTimer {
    /// @param: timeout_range: (election_timeout_min_ms, election_timeout_max_ms)
    pub fn new(timeout_range: (u64, u64)) -> Self {
        let (min, max) = timeout_range;
        Self {
            next_deadline: Instant::now() + Self::random_duration(min, max),
            timeout_range,
        }
    }

    pub fn reset(&mut self) {
        let (min, max) = self.timeout_range;
        self.next_deadline = Instant::now() + Self::random_duration(min, max);
    }

    /// Expire on the next check
    pub fn expire_now(&mut self) {
        self.next_deadline = Instant::now();
    }

    pub fn random_duration(
        min: u64,
        max: u64,
    ) -> Duration {
        let mut rng = rand::thread_rng();
        let timeout = rng.gen_range(min..max);
        Duration::from_millis(timeout)
    }

    pub fn remaining(&self) -> Duration {
        self.next_deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        self.next_deadline <= Instant::now()
    }
}

/// Fixed-period deadline, used for heartbeats and retransmissions
#[derive(Clone, Debug)]
pub struct IntervalTimer {
    period: Duration,
    next_deadline: Instant,
}

impl IntervalTimer {
    pub fn new(period_ms: u64) -> Self {
        let period = Duration::from_millis(period_ms);
        Self {
            period,
            next_deadline: Instant::now() + period,
        }
    }

    /// Returns true and re-arms when the deadline has passed
    pub fn fire(
        &mut self,
        now: Instant,
    ) -> bool {
        if now < self.next_deadline {
            return false;
        }
        self.next_deadline = now + self.period;
        true
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}
