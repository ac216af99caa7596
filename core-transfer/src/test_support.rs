//! Shared mocks for unit tests.

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{
    BeginUpload, ByteStream, RemoteEntry, RemoteStore, UploadCoordinates, UploadDeclaration,
};
use bytes::Bytes;

mockall::mock! {
    pub Store {}

    #[async_trait]
    impl RemoteStore for Store {
        async fn list_directory(&self, folder_id: &str) -> BridgeResult<Vec<RemoteEntry>>;
        async fn create_folder(
            &self,
            parent_id: &str,
            name: &str,
            fail_if_exists: bool,
        ) -> BridgeResult<String>;
        async fn create_new_folder(&self, parent_id: &str, name: &str) -> BridgeResult<String>;
        async fn begin_upload(&self, declaration: &UploadDeclaration) -> BridgeResult<BeginUpload>;
        async fn issue_part_url(
            &self,
            session: &UploadCoordinates,
            part_number: u32,
        ) -> BridgeResult<String>;
        async fn put_part(&self, url: &str, bytes: Bytes) -> BridgeResult<()>;
        async fn complete_upload(&self, session: &UploadCoordinates) -> BridgeResult<()>;
        async fn finalize(&self, file_id: &str) -> BridgeResult<()>;
        async fn delete_object(&self, id: &str) -> BridgeResult<()>;
        async fn ranged_get(&self, url: &str, start: u64, end: u64) -> BridgeResult<ByteStream>;
        async fn get(&self, url: &str) -> BridgeResult<ByteStream>;
        async fn probe_size(&self, url: &str) -> BridgeResult<Option<u64>>;
        async fn resolve_download_url(&self, entry: &RemoteEntry) -> BridgeResult<String>;
    }
}

pub fn remote_file(id: &str, name: &str, digest: &str) -> RemoteEntry {
    RemoteEntry {
        id: id.to_string(),
        name: name.to_string(),
        is_directory: false,
        digest: Some(digest.to_string()),
        size: 3,
        storage_tag: None,
    }
}

pub fn coordinates(file_id: &str) -> UploadCoordinates {
    UploadCoordinates {
        file_id: file_id.to_string(),
        bucket: "bucket".to_string(),
        key: format!("key-{}", file_id),
        upload_id: format!("upload-{}", file_id),
        storage_node: "node-1".to_string(),
    }
}
