pub mod client;
pub mod operation;

pub use client::Client;
pub use operation::Operation;
