pub mod delete_document;
pub mod list_directory;
mod mutation;
pub mod read_document;
pub mod write_document;

pub use delete_document::{
    DeleteDocumentOperation, DeleteDocumentOperationOutcome, DeleteDocumentOperationRequest,
};
pub use list_directory::{
    ListDirectoryOperation, ListDirectoryOperationRequest, ListDirectoryOperationResult,
};
pub use read_document::{
    ReadDocumentOperation, ReadDocumentOperationRequest, ReadDocumentOperationResult, ReadSource,
};
pub use write_document::{
    DocumentLayout, WriteDocumentOperation, WriteDocumentOperationRequest,
    WriteDocumentOperationResult,
};
