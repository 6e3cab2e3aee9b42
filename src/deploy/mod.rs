// ABOUTME: Deployment core: release store, lease lock, staged pipeline,
// ABOUTME: rollback, and the append-only journal.

mod error;
pub mod lock;
mod pipeline;
pub mod record;
mod release;
pub mod rollback;
pub mod steps;
pub mod store;

pub use error::{DeployError, Result};
pub use pipeline::{clean_up, deploy, roll_back};
pub use release::Release;
