pub mod bus;
pub mod session;

pub use bus::{ChatMessage, ClientFrame, Hub, HubEvent, SentimentUpdate};
pub use session::Session;
