//! Command implementations.

mod keygen;
mod receive;
mod send;

pub use keygen::run_keygen;
pub use receive::run_receive;
pub use send::run_send;
