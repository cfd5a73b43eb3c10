//! Per-COMPOUND request context.

use std::sync::Arc;

use crate::{
    nfs_err,
    state::{Client, StateHandler},
    utils::Result,
    vfs::{Inode, Subject, VirtualFileSystem},
};

/// Everything an operation needs to know about the request it serves
pub struct CompoundContext {
    minor_version: u32,
    fs: Arc<dyn VirtualFileSystem>,
    state_handler: Arc<StateHandler>,
    subject: Subject,
    current_inode: Option<Inode>,
    session_client: Option<Arc<Client>>,
}

impl CompoundContext {
    pub fn new(
        minor_version: u32,
        fs: Arc<dyn VirtualFileSystem>,
        state_handler: Arc<StateHandler>,
        subject: Subject,
    ) -> CompoundContext {
        CompoundContext {
            minor_version,
            fs,
            state_handler,
            subject,
            current_inode: None,
            session_client: None,
        }
    }

    /// Attach the client owning the session of an NFSv4.1+ request
    pub fn with_session(mut self, client: Arc<Client>) -> CompoundContext {
        self.session_client = Some(client);
        self
    }

    pub fn minor_version(&self) -> u32 {
        self.minor_version
    }

    pub fn fs(&self) -> &dyn VirtualFileSystem {
        &*self.fs
    }

    pub fn state_handler(&self) -> &StateHandler {
        &self.state_handler
    }

    /// The caller
    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    /// The current filehandle
    pub fn current_inode(&self) -> Result<&Inode> {
        self.current_inode
            .as_ref()
            .ok_or_else(|| nfs_err!(Nfs4errNofilehandle))
    }

    pub fn set_current_inode(&mut self, inode: Inode) {
        self.current_inode = Some(inode);
    }

    /// Client of the session this request arrived on
    pub fn session_client(&self) -> Result<Arc<Client>> {
        self.session_client
            .clone()
            .ok_or_else(|| nfs_err!(Nfs4errOpNotInSession))
    }
}
