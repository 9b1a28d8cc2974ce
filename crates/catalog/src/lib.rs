//! Collaborator data the core reads: product expiry policy and location kinds.
//!
//! Catalog and registry maintenance (CRUD, labels, groups) lives outside the
//! core; this crate only defines what the core consumes.

pub mod location;
pub mod product;
pub mod registry;

pub use location::{Location, LocationKind};
pub use product::{ExpiryPolicy, Product};
pub use registry::{
    InMemoryCatalog, LocationRegistry, ProductCatalog, require_location, require_product,
};
