// Copyright 2025
// Licensed under the Elastic License v2.0

pub mod checkpoint;
pub mod error;
pub mod record;
pub mod traits;

pub use checkpoint::Checkpoint;
pub use error::{SyncError, SyncResult};
pub use record::{CanonicalRecord, RawRecord, SourceDescriptor};
pub use traits::{Extractor, LoadSink, OffsetStore};
