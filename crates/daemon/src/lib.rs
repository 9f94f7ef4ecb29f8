//! Media processing pipeline
//!
//! Storage layout, variant pairing, modification handling and filter
//! graphs for the transcoder, plus the scheduling pieces around them: the
//! admission gate, debounced update publishing, reconciliation of variant
//! rows against disk, and the daemon that wires them together.

pub mod admission;
pub mod batcher;
pub mod daemon;
pub mod filter_graph;
pub mod json_store;
pub mod maintenance;
pub mod models;
pub mod modifications;
pub mod paths;
pub mod preserve;
pub mod probe;
pub mod publisher;
pub mod reconcile;
pub mod status;
pub mod status_server;
pub mod store;
pub mod transcode;
pub mod variant;

pub use media_pipeline_config as config;
pub use media_pipeline_config::Config;

pub use admission::{Admission, AdmissionQueue, AdmissionStats};
pub use batcher::{BatcherStats, UpdateBatcher};
pub use daemon::{Daemon, DaemonError};
pub use filter_graph::FilterGraphBuilder;
pub use json_store::JsonStore;
pub use maintenance::{StaleProcessingSweeper, SweepReport};
pub use models::{
    CropMetadata, FileId, FileUpdate, FileVariant, MediaFile, MediaType, Modification,
    ProcessingStatus, TrimMetadata,
};
pub use modifications::{ModificationError, SourceDimensions, TrimSpec};
pub use paths::{LayoutError, LegacyKind, PathLayout};
pub use preserve::{preserve_unmodified, restore_unmodified, PreserveError};
pub use probe::{probe_source, ProbeError, SourceInfo};
pub use publisher::{BroadcastPublisher, PublishError, Publisher, FILE_UPDATED_TOPIC};
pub use reconcile::{
    ReconcileAction, ReconcileError, ReconcileIssue, ReconcileOptions, ReconcileReport,
    ReconciliationScanner, RowError,
};
pub use status::{new_shared_status, PipelineStatus, SharedStatus};
pub use status_server::{create_status_router, run_status_server, ServerError};
pub use store::{MemoryStore, StoreError, TaskState, VariantStore};
pub use transcode::{build_transcode_args, build_transcode_command, TranscodeRequest};
pub use variant::{modifiable_kinds, VariantKind, VariantRole};
