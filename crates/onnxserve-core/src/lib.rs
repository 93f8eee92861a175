pub mod artifact;
pub mod backend;
pub mod dtype;
pub mod error;
pub mod json;
pub mod spec;
pub mod tensor;

pub use artifact::*;
pub use backend::*;
pub use dtype::*;
pub use error::*;
pub use json::*;
pub use spec::*;
pub use tensor::*;
