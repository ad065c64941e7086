//! Stream quality checking subsystem
//!
//! The channel queue feeds a pool of workers that probe each channel's
//! streams through the media analyzer, score the results and write the
//! re-ordered membership back upstream.

pub mod limiter;
pub mod ordering;
pub mod prober;
pub mod queue;
pub mod runner;
pub mod scorer;
pub mod stats;

pub use limiter::{AccountLimiter, LeaseToken};
pub use ordering::RankedStream;
pub use prober::{ProbeRequest, StreamProber};
pub use queue::{ChannelQueue, ChannelQueueEntry, QueueStats};
pub use runner::StreamChecker;
pub use scorer::{FALLBACK_SCORE, ScoreContext, score_probe};
pub use stats::ProbeCache;
