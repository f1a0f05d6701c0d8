//! Short, human-typeable clip codes.

use crate::types::{CODE_ALPHABET, CODE_LENGTH, Code, MAX_CODE_LENGTH};
use rand::Rng;
use tracing::debug;

/// Draws random codes until one is free, widening the code after repeated
/// collisions and giving up after a bounded number of attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeGenerator {
    /// Length of the first candidates.
    pub length: usize,
    /// Every this many collisions the candidates grow by one symbol.
    pub widen_every: usize,
    pub max_attempts: usize,
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self {
            length: CODE_LENGTH,
            widen_every: 4,
            max_attempts: 16,
        }
    }
}

impl CodeGenerator {
    /// Returns the candidate for the given zero-based attempt.
    pub fn candidate<R: Rng + ?Sized>(&self, rng: &mut R, attempt: usize) -> Code {
        let len = (self.length + attempt / self.widen_every.max(1)).clamp(1, MAX_CODE_LENGTH);
        let code: String = (0..len)
            .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
            .collect();

        // SAFETY: non-empty, at most MAX_CODE_LENGTH lowercase alphanumerics.
        unsafe { Code::new_unchecked(code) }
    }

    /// Mints a code accepted by `is_free`.
    ///
    /// Returns `Ok(None)` once `max_attempts` candidates have all collided.
    pub fn mint<R, E>(
        &self,
        rng: &mut R,
        mut is_free: impl FnMut(&Code) -> Result<bool, E>,
    ) -> Result<Option<Code>, E>
    where
        R: Rng + ?Sized,
    {
        for attempt in 0..self.max_attempts {
            let code = self.candidate(rng, attempt);
            if is_free(&code)? {
                return Ok(Some(code));
            }
            debug!(attempt, code = %code, "code collision");
        }
        Ok(None)
    }
}
