#![forbid(unsafe_code)]
//! Asynchronous NFSv4 OPEN processing for Rust.
//!
//! This crate implements the request-processing core of the NFSv4 OPEN
//! operation (minor versions 0 and 1+): claim handling, create modes,
//! share access enforcement, grace period reclaim, and the per-client open
//! state that a successful OPEN creates.
//!
//! # Getting Started
//!
//! 1. Implement the [`vfs::VirtualFileSystem`] trait for your storage, or use
//!    [`memfs::MemoryFs`]
//! 2. Create one [`state::StateHandler`] per server from a [`config::ServerConfig`]
//! 3. For every OPEN, build a [`context::CompoundContext`] and call
//!    [`open::handle_open`]
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use nfs4::{
//!     config::ServerConfig, context::CompoundContext, memfs::MemoryFs,
//!     open::handle_open, state::StateHandler, vfs::Subject, *,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let fs = Arc::new(MemoryFs::new());
//!     let state = Arc::new(StateHandler::new(&ServerConfig::default()));
//!     let client = state.create_client("client", Verifier::default(), false).await;
//!     client.confirm();
//!
//!     let mut ctx = CompoundContext::new(0, fs.clone(), state, Subject::new(1000, 1000));
//!     ctx.set_current_inode(fs.root());
//!
//!     let args = OpenArgs {
//!         seqid: 0,
//!         share_access: ShareAccess::BOTH,
//!         share_deny: ShareDeny::NONE,
//!         owner: OpenOwner { clientid: client.id(), owner: b"owner".to_vec() },
//!         openhow: OpenHow::NoCreate,
//!         claim: OpenClaim::Null(b"a.txt".to_vec()),
//!     };
//!     println!("{:?}", handle_open(&args, &mut ctx).await?);
//!     Ok(())
//! }
//! ```
//!
//! # Error Handling
//!
//! Operations return [`error::Error`]. [`Error::status`] gives the `nfsstat4`
//! code to send to the client. OPEN itself turns the two storage faults,
//! [`Error::Exist`] and [`Error::NoEnt`], into an error result.
//!
//! # Safety
//!
//! This crate forbids unsafe code (`#![forbid(unsafe_code)]`).
pub mod access;
pub mod attr;
pub mod config;
pub mod context;
pub mod error;
pub mod memfs;
pub mod name;
pub mod open;
pub mod proto;
pub mod setattr;
pub mod state;
#[macro_use]
pub mod utils;
pub mod vfs;
pub mod xdr;

pub use crate::error::Error;
pub use crate::proto::*;
pub use crate::utils::Result;
