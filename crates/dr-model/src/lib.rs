pub mod architecture;
pub mod error;
pub mod reference;

pub use architecture::Model;
pub use error::{ModelError, Result};
pub use reference::{ReferenceConfig, ReferenceModel};
