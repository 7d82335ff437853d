/// Tandem - like, match and conversation engine
///
/// Records directional likes, super-likes and passes between users, turns
/// mutual likes into exactly one match and conversation per pair, and
/// notifies participants of every qualifying transition.

pub mod api;
pub mod auth;
pub mod config;
pub mod context;
pub mod conversations;
pub mod db;
pub mod error;
pub mod identity;
pub mod interactions;
pub mod jobs;
pub mod metrics;
pub mod notifications;
pub mod rate_limit;
pub mod server;

pub use config::ServerConfig;
pub use context::AppContext;
pub use error::{EngineError, EngineResult};
pub use interactions::InteractionEngine;
