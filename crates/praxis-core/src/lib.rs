mod agent_loop;
mod cancellation;
mod session;

pub use agent_loop::{AgentLoop, TurnCancelled};
pub use cancellation::CancellationRegistry;
pub use session::SessionStore;
