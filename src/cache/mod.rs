//! Cache Module
//!
//! TTL cache over a memory mirror and pluggable persistent backends, with a
//! versioned encoding pipeline, background sweeping and a
//! stale-while-revalidate helper.

mod clock;
mod codec;
mod entry;
mod events;
mod mirror;
mod refresh;
mod stats;
mod store;


// Re-export public types
pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::{Codec, EncodeFlags, RECORD_VERSION};
pub use entry::CacheEntry;
pub use events::{CacheEvent, EVENT_CAPACITY};
pub use mirror::MemoryMirror;
pub use refresh::RefreshOptions;
pub use stats::{CacheStats, SweepReport};
pub use store::{Cache, GetOptions, SetOptions};
