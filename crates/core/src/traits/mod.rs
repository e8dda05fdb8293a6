pub mod broker_client;
pub mod callback;
pub mod task_executor;
pub mod transport;

pub use broker_client::*;
pub use callback::*;
pub use task_executor::*;
pub use transport::*;
