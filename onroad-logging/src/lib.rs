// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Structured trace events for the on-road index.
//!
//! ```
//! # use onroad_logging::onroad_trace;
//! onroad_trace!("index.cache.push", { "height": 12, "slot": 3 });
//! ```

#[doc(hidden)]
pub use serde_json;
#[doc(hidden)]
pub use tracing;

/// Emit a `tracing::trace!` event named `$evt` carrying a JSON payload
#[macro_export]
macro_rules! onroad_trace {
    ($evt:expr, $params:tt) => {
        $crate::tracing::trace!(
            "onroad_trace:{}:{}",
            $evt,
            $crate::serde_json::json!($params)
        );
    };
}
