#![forbid(unsafe_code)]

//! Boundary contracts consumed by the apiweave engine: the hierarchical
//! live-value ("tag") store and the record store, plus in-memory reference
//! implementations used by tests and the CLI runtime.

pub mod record;
pub mod tag;
mod types;

pub use record::{MemoryRecordStore, RecordStore};
pub use tag::{MemoryTagStore, TagStore, TagSubscription, WriteHandler, WriteQuality};
pub use types::{
    ApiConfigRecord, CertificateRecord, ConfigEvent, StoreError, StoredFileRecord, TagDataType,
    UdtDefinition, UdtInstance, UdtMember, VariableRecord, WebhookKeyRecord,
};
