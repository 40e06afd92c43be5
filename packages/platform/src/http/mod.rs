pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod router;
pub mod state;

pub use router::make_router;
pub use state::HttpState;
