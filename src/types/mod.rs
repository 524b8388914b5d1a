pub mod instrument;
pub mod observation;
pub mod opinion;
pub mod signal;
pub mod snapshot;

pub use instrument::*;
pub use observation::*;
pub use opinion::*;
pub use signal::*;
pub use snapshot::*;
