//! CropUploadFanout - publish the best frame of a group
//!
//! ## Responsibilities
//!
//! - Crop every valid box and upload each crop on its own task
//! - Barrier on all crop uploads, then upload the annotated summary frame
//! - Never upload an artifact twice (`UploadLedger`)
//! - Trigger camera actuation for samples carrying a marker
//! - Optional detection alert with the annotated frame

mod ledger;
mod render;
mod service;
mod uploader;

pub use ledger::{LedgerState, UploadLedger};
pub use render::{render, RenderedFrame};
pub use service::{CropUploadFanout, PublishReport};
pub use uploader::{Artifact, ArtifactUploader, HttpArtifactUploader};

#[cfg(test)]
pub(crate) use uploader::testing;
