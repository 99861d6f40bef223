use thiserror::Error;

pub const DEFAULT_MAX_ROUNDS: u32 = 3;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("turn exceeded {bound} model rounds")]
pub struct LoopGuardExceeded {
    pub bound: u32,
}

/// Counts model rounds within one user turn.
#[derive(Debug, Clone)]
pub struct LoopGuard {
    bound: u32,
    rounds: u32,
}

impl LoopGuard {
    /// A bound of zero is raised to one so every turn reaches the model once.
    pub fn new(bound: u32) -> Self {
        Self {
            bound: bound.max(1),
            rounds: 0,
        }
    }

    pub fn reset(&mut self) {
        self.rounds = 0;
    }

    /// Claims the next round, or fails once `bound` rounds have been used.
    pub fn advance(&mut self) -> Result<u32, LoopGuardExceeded> {
        if self.rounds >= self.bound {
            return Err(LoopGuardExceeded { bound: self.bound });
        }
        self.rounds += 1;
        Ok(self.rounds)
    }

    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    pub fn bound(&self) -> u32 {
        self.bound
    }
}

impl Default for LoopGuard {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ROUNDS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_exactly_bound_rounds() {
        let mut guard = LoopGuard::new(3);

        assert_eq!(guard.advance(), Ok(1));
        assert_eq!(guard.advance(), Ok(2));
        assert_eq!(guard.advance(), Ok(3));
        assert_eq!(guard.advance(), Err(LoopGuardExceeded { bound: 3 }));
        assert_eq!(guard.rounds(), 3);
    }

    #[test]
    fn reset_starts_a_new_turn() {
        let mut guard = LoopGuard::new(1);
        guard.advance().unwrap();
        assert!(guard.advance().is_err());

        guard.reset();

        assert_eq!(guard.advance(), Ok(1));
    }

    #[test]
    fn zero_bound_still_permits_one_round() {
        let mut guard = LoopGuard::new(0);

        assert_eq!(guard.bound(), 1);
        assert!(guard.advance().is_ok());
        assert!(guard.advance().is_err());
    }
}
