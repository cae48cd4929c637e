//! CLI command implementations.
//!
//! | Module   | Commands handled |
//! |----------|------------------|
//! | `run`    | `Run`            |
//! | `config` | `Config`         |
//! | `audit`  | `Audit`          |

pub mod audit;
pub mod config;
pub mod run;

pub use audit::cmd_audit;
pub use config::cmd_config;
pub use run::{RunArgs, cmd_run};
