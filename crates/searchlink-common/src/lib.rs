//! Shared types for the searchlink transport.
//!
//! - [`error`] - the error taxonomy every layer reports through
//! - [`node`] - [`NodeDescriptor`], the identity of one cluster member
//! - [`response`] - [`RequestResult`], what a successful request returns
//! - [`serializer`] - body encoding behind the [`Serializer`] trait

pub mod error;
pub mod node;
pub mod response;
pub mod serializer;

pub use error::{Result, SearchlinkError};
pub use node::{NodeDescriptor, DEFAULT_PORT};
pub use response::{RequestResult, ResponseMeta};
pub use serializer::{JsonSerializer, Serializer};
