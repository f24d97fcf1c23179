//! The Strata administrative client.
//!
//! This crate carries the client side of the native admin protocol: the
//! unauthenticated info snapshot, the authenticated administrative
//! connection, and the one-shot load command. The [`ClusterLink`] trait
//! bundles these node-level capabilities behind one seam so callers can
//! substitute them wholesale in tests.

mod admin;
mod info;
mod link;
mod load;
pub mod proto;


pub use admin::{AdminClient, Connection};
pub use info::{server_info, InfoSnapshot, CONNECT_TIMEOUT, REQUEST_TIMEOUT};
pub use link::{ClusterLink, NativeLink};
pub use load::load_database;
pub use proto::OpCode;
