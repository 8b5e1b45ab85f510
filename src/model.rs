pub mod endpoint;
pub mod error;
pub mod rule;
pub mod rule_set;

pub use endpoint::*;
pub use error::*;
pub use rule::*;
pub use rule_set::*;
