pub mod config;
pub mod core_access;
pub mod logging;
pub mod metrics;

#[cfg(test)]
pub mod test_utils;

pub use config::{AccessConfig, Config, ConfigError};
pub use core_access::{
    AccessError, ConversationAccessService, ConversationId, ErrorKind, ParticipantRole, UserId,
};
pub use logging::{init_logging, LogLevel};
