use rand::Rng;
use serde::Serialize;

/// Per-process token sent with every submission so the server can collapse
/// retried requests from the same run. Eight decimal digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct DeduplicationId(String);

impl DeduplicationId {
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let n: u32 = rng.gen_range(0..100_000_000);
        Self(format!("{n:08}"))
    }

    pub fn from_entropy() -> Self {
        Self::generate(&mut rand::thread_rng())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeduplicationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
