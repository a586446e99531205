//! Session persistence and widget orchestration.
//!
//! Provides:
//! - `SessionManager` - Drive login, channel and uploads for one user
//! - Storage implementations (memory, file)

pub mod manager;
pub mod storage;

pub use manager::{ManagerError, SessionManager};
