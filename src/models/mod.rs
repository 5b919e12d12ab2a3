pub mod enums;
pub mod agent;
pub mod material;
pub mod session;
pub mod submission;

pub use agent::*;
pub use enums::*;
pub use material::*;
pub use session::*;
pub use submission::*;
