// server/src/services/mod.rs

pub mod mock_gateway;
pub mod tracing_notifier;

pub use mock_gateway::MockGateway;
pub use tracing_notifier::TracingNotifier;
