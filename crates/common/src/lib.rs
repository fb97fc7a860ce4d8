//! Data client contract shared across `fieldcrypt` crates: operations, actions and errors.

pub mod client;
pub mod error;
pub mod operation;

pub use client::DataClient;
pub use error::ClientError;
pub use operation::{
    Action, ActionKind, Operation, OtherOperation, ReadAction, ReadOperation, Record,
    WriteAction, WriteOperation, WritePayload,
};
