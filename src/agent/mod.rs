//! Agent module — per-session queues and the main event loop.

pub mod agent_loop;
pub mod session_manager;

pub use agent_loop::SurveyAgent;
pub use session_manager::SessionManager;
