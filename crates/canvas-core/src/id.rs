//! Node id minting.
//!
//! `id = nowMillis * 1000 + rand(0..999)`, with a per-process counter
//! fallback so two mints in the same millisecond never collide.

use std::sync::atomic::{AtomicI64, Ordering};

use rand::Rng;

/// Mints globally-unique (within this process) 64-bit node ids.
pub struct IdMinter {
    last: AtomicI64,
}

impl Default for IdMinter {
    fn default() -> Self {
        Self::new()
    }
}

impl IdMinter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            last: AtomicI64::new(0),
        }
    }

    /// Mint a fresh id. Monotonic: never returns a value less than or equal
    /// to a previously-minted one.
    pub fn mint(&self) -> i64 {
        let now_millis = chrono::Utc::now().timestamp_millis();
        let rand_component: i64 = rand::thread_rng().gen_range(0..1000);
        let candidate = now_millis * 1000 + rand_component;

        let mut prev = self.last.load(Ordering::SeqCst);
        loop {
            let next = if candidate > prev { candidate } else { prev + 1 };
            match self
                .last
                .compare_exchange(prev, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mints_are_strictly_increasing() {
        let minter = IdMinter::new();
        let mut prev = minter.mint();
        for _ in 0..2000 {
            let next = minter.mint();
            assert!(next > prev, "{next} should exceed {prev}");
            prev = next;
        }
    }
}
