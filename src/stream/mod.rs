//! Stream Module
//!
//! Debounce, throttle, distinct, switch-to-latest and retry operators over
//! `futures::Stream`, plus factories wiring them into the interactive
//! streams (search, filter, infinite scroll, retryable, realtime, auto-save).
//!
//! Operators that need timers run their state machine on a spawned tokio
//! task, so they must be built inside a runtime.

mod channel;
mod factories;
mod operators;

pub use channel::{replay_latest, sink, StreamOutput, StreamSink};
pub use factories::{
    create_autosave_stream, create_filter_stream, create_infinite_scroll_stream,
    create_realtime_stream, create_retryable_stream, create_search_stream, debounce_distinct,
    scroll_triggers, AutoSaveStream, FilterStream, InfiniteScrollStream, Page, PageCursor,
    RealtimeStream, RetryableStream, SaveStatus, ScrollConfig, SearchStream,
};
pub use operators::{
    debounce, distinct_until_changed, retry_with_delay, switch_map, throttle, BoxStream,
    DistinctUntilChanged, ScrollEvent, Settled, StreamRetryPolicy, Throttle,
};
