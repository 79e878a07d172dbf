use crate::blob::{DirEntry, DynBlobApi};
use crate::Result;

#[derive(Clone)]
pub struct ListDirectoryOperation {
    blob_api: DynBlobApi,
}

#[derive(Debug, Clone)]
pub struct ListDirectoryOperationRequest {
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct ListDirectoryOperationResult {
    pub entries: Vec<DirEntry>,
}

impl ListDirectoryOperation {
    pub fn new(blob_api: DynBlobApi) -> Self {
        Self { blob_api }
    }

    pub async fn run(
        &self,
        request: ListDirectoryOperationRequest,
    ) -> Result<ListDirectoryOperationResult> {
        let entries = self.blob_api.list_dir(&request.path).await?;
        Ok(ListDirectoryOperationResult { entries })
    }
}
