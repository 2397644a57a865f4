pub mod event;
pub mod outcome;
pub mod request;

pub use event::*;
pub use outcome::*;
pub use request::*;
