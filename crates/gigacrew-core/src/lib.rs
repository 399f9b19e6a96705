//! # GigaCrew Core
//!
//! Order lifecycle coordination for a GigaCrew agent.
//!
//! - [`buyer::BuyerHandler`] - opens escrows and waits for delivered work
//! - [`seller::SellerHandler`] - tracks escrows addressed to the seller,
//!   submits work and withdraws elapsed escrows
//! - [`catalog::CatalogIndexer`] - projects service registrations into the catalog
//! - [`client::GigaCrewClient`] - wires storage, ledger access, roles and synchronizers

pub mod buyer;
pub mod catalog;
pub mod client;
pub mod error;
pub mod seller;
pub mod waiters;
pub mod worker;

pub use buyer::BuyerHandler;
pub use catalog::CatalogIndexer;
pub use client::{GigaCrewBuilder, GigaCrewClient};
pub use error::CoordinatorError;
pub use seller::{ReconcileReport, SellerHandler};
pub use waiters::{Resolution, WorkWaiters};
pub use worker::{HttpWorkGenerator, WorkGenerator};
