//! Database module: the fixed PACS study table and its provisioning.
//!
//! Layout:
//! - `models.rs`: Rust struct mirroring a table row, plus the seed row
//! - `schema.rs`: identifier checks and SQL DDL for the table and indexes
//! - `postgres.rs`: storage wrapper running the DDL/DML over one connection
//! - `provision.rs`: the idempotent create-database-then-schema sequence

pub mod models;
pub mod postgres;
pub mod provision;
pub mod schema;

pub use models::PacsStudy;
pub use postgres::PacsStorage;
pub use provision::{ProvisionReport, provision_schema};
