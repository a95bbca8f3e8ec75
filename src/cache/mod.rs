//! Fast read-side cache guarded by a circuit breaker, with the durable store
//! as fallback.

mod backend;
mod circuit_breaker;
mod guarded;
pub mod leaderboard;
mod memory;
pub mod profiles;
pub mod ranges;
mod redis_backend;

pub use backend::{leaderboard_key, profile_key, CacheError, FastCache};
pub use circuit_breaker::{CircuitBreaker, DEFAULT_COOLDOWN, DEFAULT_THRESHOLD};
pub use guarded::GuardedCache;
pub use leaderboard::Leaderboard;
pub use memory::MemoryCache;
pub use profiles::ProfileResolver;
pub use ranges::RangeKey;
pub use redis_backend::RedisCache;
