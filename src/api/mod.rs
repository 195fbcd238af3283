pub mod handlers;
pub mod link_handlers;
pub mod payload;
pub mod record_store_handlers;
pub mod routes;

pub use handlers::*;
pub use payload::*;
pub use routes::*;
