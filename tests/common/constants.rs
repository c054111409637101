//! Shared constants for end-to-end tests
//!
//! URLs understood by the scripted extractor and the titles it reports.
//! When fixture behavior changes, update only this file.

// ============================================================================
// Fixture URLs
// ============================================================================

/// A single track that downloads successfully
pub const SINGLE_TRACK_URL: &str = "https://www.youtube.com/watch?v=fixture-ok";

/// A single track whose extraction fails with "Video unavailable"
pub const UNAVAILABLE_TRACK_URL: &str = "https://www.youtube.com/watch?v=fixture-gone";

/// A playlist of three tracks where the second one is unavailable
pub const PLAYLIST_URL: &str = "https://www.youtube.com/playlist?list=PLfixture";

/// A playlist listing with no entries
pub const EMPTY_PLAYLIST_URL: &str = "https://www.youtube.com/playlist?list=PLempty";

/// Member URLs of `PLAYLIST_URL`, in order
pub const PLAYLIST_TRACK_URLS: [&str; 3] = [
    "https://www.youtube.com/watch?v=fixture-first",
    "https://www.youtube.com/watch?v=fixture-gone",
    "https://www.youtube.com/watch?v=fixture-third",
];

// ============================================================================
// Fixture Metadata
// ============================================================================

pub const SINGLE_TRACK_TITLE: &str = "Fixture Song";
pub const FIRST_TRACK_TITLE: &str = "First Song";
pub const THIRD_TRACK_TITLE: &str = "Third Song";
pub const FIXTURE_ARTIST: &str = "Fixture Artist";
pub const FIXTURE_PLAYLIST_TITLE: &str = "Fixture Mix";

/// Bytes written as the "transcoded" audio of every fixture track
pub const FIXTURE_AUDIO_BYTES: &[u8] = b"ID3fixture-audio";

/// Friendly message for unavailable content
pub const UNAVAILABLE_MESSAGE: &str =
    "This video is not available. It may be private, deleted, or region-restricted.";

// ============================================================================
// Timing
// ============================================================================

/// Maximum time to wait for the server to become ready
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Timeout for individual requests
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Poll interval while waiting for the server
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 50;

/// Maximum time to wait for a job to reach a terminal state
pub const JOB_TIMEOUT_MS: u64 = 10_000;

/// Poll interval while waiting for a job
pub const JOB_POLL_INTERVAL_MS: u64 = 25;

/// Cleanup delay used by tests that watch files disappear
pub const SHORT_CLEANUP_DELAY_SECS: u64 = 1;

/// Maximum time to wait for a scheduled deletion
pub const CLEANUP_TIMEOUT_MS: u64 = 5000;
