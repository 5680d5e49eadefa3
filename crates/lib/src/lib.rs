//! converge-lib: declarative reconciliation of REST resources.
//!
//! A resource kind is described by a [`schema::ResourceSchema`]: its paths,
//! fields and update operations. Given a desired [`resource::Resource`], the
//! [`reconcile::Reconciler`] discovers the remote state, diffs it against the
//! desired state and issues the create or update calls needed to converge.
//!
//! - `value`: three-state fields (unset, empty, set) and dynamic values
//! - `codec`: JSON wire encoding driven by the schema
//! - `canonical` / `diff`: normalization and field differences
//! - `transport` / `client`: HTTP with retries, schema-driven CRUD and paging
//! - `state`: last observed states on disk, used as hints

pub mod canonical;
pub mod client;
pub mod codec;
pub mod config;
pub mod consts;
pub mod diff;
pub mod platform;
pub mod reconcile;
pub mod resource;
pub mod schema;
pub mod state;
pub mod transport;
pub mod util;
pub mod value;
