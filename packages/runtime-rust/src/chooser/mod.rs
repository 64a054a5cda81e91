//! Built-in endpoint choosers.

pub mod random;
pub mod round_robin;

pub use random::RandomServiceChooser;
pub use round_robin::RoundRobinServiceChooser;
