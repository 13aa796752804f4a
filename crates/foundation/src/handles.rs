/// Monotonic generation token.
///
/// Asynchronous work captures the owner's generation when it is issued; the
/// result is applied only if the owner still reports the same generation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(u64);

impl Generation {
    pub const ZERO: Generation = Generation(0);

    pub fn new(value: u64) -> Self {
        Generation(value)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    pub fn next(self) -> Self {
        Generation(self.0.wrapping_add(1))
    }
}

/// Owner-side counter for [`Generation`] tokens.
#[derive(Debug, Clone, Default)]
pub struct GenerationCounter {
    current: Generation,
}

impl GenerationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Generation {
        self.current
    }

    /// Invalidates every token handed out so far.
    pub fn bump(&mut self) -> Generation {
        self.current = self.current.next();
        self.current
    }

    pub fn is_current(&self, token: Generation) -> bool {
        self.current == token
    }
}
