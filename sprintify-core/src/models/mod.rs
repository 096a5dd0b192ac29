mod ai_usage;
mod milestone;
mod notification;
mod sprint;
mod stats;
mod task;
mod upgrade;
mod user;

pub use ai_usage::*;
pub use milestone::*;
pub use notification::*;
pub use sprint::*;
pub use stats::*;
pub use task::*;
pub use upgrade::*;
pub use user::*;
