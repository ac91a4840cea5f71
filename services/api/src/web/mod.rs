pub mod middleware;
pub mod rest;
pub mod state;

pub use middleware::attach_caller;
pub use rest::{router, ApiDoc};
