pub mod dry_run;
pub mod mocks;
pub mod traits;

pub use traits::{Gateway, GatewayEvent};
