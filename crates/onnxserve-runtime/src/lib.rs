pub mod coerce;
pub mod context;
pub mod handler;
pub mod hooks;
pub mod invoker;
pub mod sample;

pub use coerce::*;
pub use context::*;
pub use handler::*;
pub use hooks::*;
pub use invoker::*;
pub use sample::*;
