//! # Clinic Core
//!
//! Core logic of the clinic patient-records viewer.
//!
//! This crate holds everything between the backends and the screen:
//! - A document store abstraction with realtime queries ([`store`])
//! - Patients, catalogs and clinical entries ([`patient`], [`catalog`], [`model`])
//! - The live entry listing with incremental paging ([`pager`])
//! - Entry creation with attachments and admin maintenance ([`writer`], [`admin`])
//! - Upcoming appointments ([`upcoming`])
//! - Pure view descriptions and the [`app::App`] controller that drives them
//!
//! **No rendering**: presenting the views is left to the binary on top.

pub mod admin;
pub mod app;
pub mod catalog;
pub mod config;
pub mod constants;
pub mod error;
pub mod identity;
pub mod model;
pub mod notify;
pub mod pager;
pub mod patient;
pub mod store;
pub mod upcoming;
pub mod validation;
pub mod view;
pub mod writer;

pub use app::{App, AppState, Services};
pub use config::{BackendConfig, CoreConfig};
pub use error::{CoreError, CoreResult};
pub use identity::{AccessPolicy, IdentityProvider, Principal, StaticIdentity};
pub use model::{AppointmentForm, CatalogKind, EntryEdit, EntryKind, ExamForm};
pub use store::{DocumentStore, MemoryDocumentStore};
pub use writer::SelectedFile;
