pub mod common;
pub mod odata_path;
pub mod person;
pub mod record_store;
pub mod vinyl_record;

pub use common::*;
pub use odata_path::{PersonTarget, Resource};
pub use person::*;
pub use record_store::*;
pub use vinyl_record::*;
