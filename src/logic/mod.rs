pub mod links;
pub mod ratings;
pub mod resolve;

pub use links::*;
pub use ratings::*;
pub use resolve::*;
