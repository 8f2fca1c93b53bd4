pub mod database;
pub mod entity;
pub mod error;
pub mod models;
pub mod store;

pub use error::StoreError;
pub use models::{
    CommitRef, CreateSessionParams, FileRef, NewCommit, RepoRef, SessionRecord, TrackingRecord,
    UserRef,
};
pub use store::{SeaStore, Store};
