//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter    | Implements | Connects to                          |
//! |------------|------------|--------------------------------------|
//! | `log_sink` | EventSink  | `log` facade                         |
//! | `relay`    | EventSink  | NDJSON over any `std::io::Write`     |
//! | `sim`      | Transport  | In-process simulated PM5             |
//! | `time`     | Clock      | `std::time::Instant` / manual source |

pub mod log_sink;
pub mod relay;
pub mod sim;
pub mod time;
