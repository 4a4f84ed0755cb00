//! Telegram delivery: transports, content classification and the dispatcher

pub mod bot_api;
pub mod delivery;
pub mod media;
pub mod mtproto;
pub mod notifications;
pub mod transport;

// Re-exports for convenience
pub use bot_api::{BotApiTransport, BotIdentity};
pub use delivery::{validate_bot_token, ConnectionReport, DeliveryDispatcher, DeliveryOutcome, DispatchState};
pub use media::MediaKind;
pub use mtproto::{MtProtoError, MtProtoTransport};
pub use transport::Transport;
