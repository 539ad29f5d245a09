pub mod client;

pub use client::{AskResponse, HttpRagClient, RagClient, RagError, RemoteDocument, ScoredContext, UploadOutcome};
