pub mod assets;
pub mod bridge;
pub mod channel;
pub mod codec;
pub mod outbound;
pub mod protocol;
pub mod session;
pub mod theme;

pub use bridge::EditorBridge;
pub use channel::{ContentChannel, InboundHandler};
pub use protocol::{BridgeMessage, MessageType};
pub use session::{EditorSession, Handled, SessionOptions, SessionState};
