pub mod pool;
pub mod servers;
pub mod session;
pub mod transport;
