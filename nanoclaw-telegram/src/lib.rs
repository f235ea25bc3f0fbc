//! Reference Messenger adapter over Telegram's bot API. Concrete transports are an external
//! collaborator of the router; this adapter exists so the interface has at least one real
//! implementation behind it.

mod telegram;

pub use telegram::TelegramMessenger;
