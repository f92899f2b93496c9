//! CLI command implementations.
//!
//! | Module    | Commands handled |
//! |-----------|------------------|
//! | `serve`   | `Serve`          |
//! | `extract` | `Extract`        |

pub mod extract;
pub mod serve;

pub use extract::cmd_extract;
pub use serve::cmd_serve;
