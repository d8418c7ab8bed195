pub mod credentials;
pub mod loopback;
pub mod transport;
