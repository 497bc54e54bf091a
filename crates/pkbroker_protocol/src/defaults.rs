//! Canonical default values shared by the engine and its clients.

/// Percentage value meaning "progress is not known".
pub const PERCENTAGE_UNKNOWN: u32 = 101;

/// Cache age meaning "use whatever the backend has".
pub const CACHE_AGE_UNSET: u32 = u32::MAX;

/// Nice value applied to background worker threads.
pub const DEFAULT_BACKGROUND_NICE: i32 = 19;
