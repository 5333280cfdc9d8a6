use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Identifier of one relay session (one per accepted connection)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// How session ids are minted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IdStrategy {
    /// `<connect-millis>-<sequence>`: sortable, unique within the process
    #[default]
    Sequential,
    /// Random UUIDv4 (simple form), unguessable file names
    Random,
}

type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Collision-free session id source
///
/// The millisecond timestamp only makes ids readable; uniqueness comes from
/// the atomic sequence, so connections accepted within the same tick still
/// get distinct ids. The sequence belongs to the generator (clones share it);
/// a relay owns one generator.
#[derive(Clone)]
pub struct SessionIdGenerator {
    strategy: IdStrategy,
    sequence: Arc<AtomicU64>,
    clock: Clock,
}

impl SessionIdGenerator {
    pub fn new(strategy: IdStrategy) -> Self {
        Self::with_clock(strategy, || chrono::Utc::now().timestamp_millis())
    }

    /// Generator reading time from `clock` (tests pin it to force same-tick connects)
    pub fn with_clock<F>(strategy: IdStrategy, clock: F) -> Self
    where
        F: Fn() -> i64 + Send + Sync + 'static,
    {
        Self {
            strategy,
            sequence: Arc::new(AtomicU64::new(0)),
            clock: Arc::new(clock),
        }
    }

    pub fn next_id(&self) -> SessionId {
        match self.strategy {
            IdStrategy::Sequential => {
                let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
                SessionId(format!("{}-{}", (self.clock)(), seq))
            }
            IdStrategy::Random => SessionId(uuid::Uuid::new_v4().simple().to_string()),
        }
    }
}

impl Default for SessionIdGenerator {
    fn default() -> Self {
        Self::new(IdStrategy::default())
    }
}

impl fmt::Debug for SessionIdGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionIdGenerator")
            .field("strategy", &self.strategy)
            .field("sequence", &self.sequence.load(Ordering::SeqCst))
            .finish()
    }
}
