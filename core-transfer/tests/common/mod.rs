//! In-memory collaborators for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_desktop::TokioFileSystem;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{
    BeginUpload, BridgeError, ByteStream, DuplicateMode, FileMetadata, LocalFilesystem,
    ReadStream, RemoteEntry, RemoteStore, UploadCoordinates, UploadDeclaration, WriteStream,
};
use bytes::Bytes;
use core_runtime::config::TransferSettings;
use core_transfer::{ContentHasher, TransferContext};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const ROOT_ID: &str = "0";

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub id: String,
    pub parent_id: String,
    pub name: String,
    pub is_directory: bool,
    pub content: Vec<u8>,
    pub digest: Option<String>,
    pub finalized: bool,
}

#[derive(Debug)]
struct PendingUpload {
    declaration: UploadDeclaration,
    file_id: String,
    parts: BTreeMap<u32, Vec<u8>>,
    /// Part numbers in the order they arrived
    arrival: Vec<u32>,
}

#[derive(Debug, Clone)]
struct Resource {
    content: Vec<u8>,
    advertise_size: bool,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    objects: BTreeMap<String, StoredObject>,
    uploads: HashMap<String, PendingUpload>,
    part_urls: HashMap<String, (String, u32)>,
    resources: HashMap<String, Resource>,
    /// Digests the store can reuse without receiving bytes
    known_content: HashSet<String>,
    failing_files: HashSet<String>,
    failing_ranges: HashMap<(String, u64), usize>,
    folder_calls: Vec<(String, String)>,
    part_arrivals: HashMap<String, Vec<u32>>,
}

impl State {
    fn allocate_id(&mut self) -> String {
        self.next_id += 1;
        format!("id-{}", self.next_id)
    }

    fn child(&self, parent_id: &str, name: &str, directory: bool) -> Option<&StoredObject> {
        self.objects
            .values()
            .find(|o| o.parent_id == parent_id && o.name == name && o.is_directory == directory)
    }

    /// `name`, or `name(n)` with the smallest free `n`.
    fn free_name(&self, parent_id: &str, name: &str, directory: bool) -> String {
        if self.child(parent_id, name, directory).is_none() {
            return name.to_string();
        }
        let mut n = 1;
        while self
            .child(parent_id, &format!("{}({})", name, n), directory)
            .is_some()
        {
            n += 1;
        }
        format!("{}({})", name, n)
    }

    fn insert_folder(&mut self, parent_id: &str, name: &str) -> String {
        let id = self.allocate_id();
        self.objects.insert(
            id.clone(),
            StoredObject {
                id: id.clone(),
                parent_id: parent_id.to_string(),
                name: name.to_string(),
                is_directory: true,
                content: Vec::new(),
                digest: None,
                finalized: true,
            },
        );
        id
    }
}

/// Remote store backed by process memory, with call counters and failure
/// injection.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    pub begin_upload_calls: AtomicUsize,
    pub sessions_opened: AtomicUsize,
    pub put_part_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub ranged_get_calls: AtomicUsize,
    pub get_calls: AtomicUsize,
    pub resolve_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Insert a finalized file directly.
    pub fn seed_file(&self, parent_id: &str, name: &str, content: &[u8]) -> String {
        let mut state = self.state.lock().unwrap();
        let id = state.allocate_id();
        state.objects.insert(
            id.clone(),
            StoredObject {
                id: id.clone(),
                parent_id: parent_id.to_string(),
                name: name.to_string(),
                is_directory: false,
                content: content.to_vec(),
                digest: Some(ContentHasher::digest_bytes(content)),
                finalized: true,
            },
        );
        id
    }

    pub fn seed_folder(&self, parent_id: &str, name: &str) -> String {
        self.state.lock().unwrap().insert_folder(parent_id, name)
    }

    /// Listing entry for a stored object, as `list_directory` reports it.
    pub fn entry(&self, id: &str) -> Option<RemoteEntry> {
        let state = self.state.lock().unwrap();
        state.objects.get(id).map(to_entry)
    }

    /// Let `begin_upload` short-circuit uploads of `content`.
    pub fn remember_content(&self, content: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .known_content
            .insert(ContentHasher::digest_bytes(content));
    }

    /// Make every part upload of files named `name` fail.
    pub fn fail_uploads_of(&self, name: &str) {
        self.state.lock().unwrap().failing_files.insert(name.to_string());
    }

    pub fn add_resource(&self, url: &str, content: Vec<u8>, advertise_size: bool) {
        self.state.lock().unwrap().resources.insert(
            url.to_string(),
            Resource {
                content,
                advertise_size,
            },
        );
    }

    /// Fail the next `times` fetches of the range starting at `start`.
    pub fn fail_range(&self, url: &str, start: u64, times: usize) {
        self.state
            .lock()
            .unwrap()
            .failing_ranges
            .insert((url.to_string(), start), times);
    }

    pub fn child(&self, parent_id: &str, name: &str) -> Option<StoredObject> {
        let state = self.state.lock().unwrap();
        state
            .objects
            .values()
            .find(|o| o.parent_id == parent_id && o.name == name)
            .cloned()
    }

    pub fn children(&self, parent_id: &str) -> Vec<StoredObject> {
        let state = self.state.lock().unwrap();
        state
            .objects
            .values()
            .filter(|o| o.parent_id == parent_id)
            .cloned()
            .collect()
    }

    /// Every `create_folder` call as `(parent_id, name)`.
    pub fn folder_calls(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().folder_calls.clone()
    }

    pub fn folder_calls_named(&self, name: &str) -> usize {
        self.folder_calls().iter().filter(|(_, n)| n == name).count()
    }

    /// Part numbers received for the file `name`, in arrival order.
    pub fn part_arrivals(&self, name: &str) -> Vec<u32> {
        self.state
            .lock()
            .unwrap()
            .part_arrivals
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn list_directory(&self, folder_id: &str) -> BridgeResult<Vec<RemoteEntry>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        Ok(state
            .objects
            .values()
            .filter(|o| o.parent_id == folder_id && o.finalized)
            .map(to_entry)
            .collect())
    }

    async fn create_folder(
        &self,
        parent_id: &str,
        name: &str,
        fail_if_exists: bool,
    ) -> BridgeResult<String> {
        let mut state = self.state.lock().unwrap();
        state
            .folder_calls
            .push((parent_id.to_string(), name.to_string()));

        if let Some(existing) = state.child(parent_id, name, true) {
            if fail_if_exists {
                return Err(BridgeError::rejected(5060, "folder already exists"));
            }
            return Ok(existing.id.clone());
        }

        Ok(state.insert_folder(parent_id, name))
    }

    async fn create_new_folder(&self, parent_id: &str, name: &str) -> BridgeResult<String> {
        let mut state = self.state.lock().unwrap();
        state
            .folder_calls
            .push((parent_id.to_string(), name.to_string()));

        let name = state.free_name(parent_id, name, true);
        Ok(state.insert_folder(parent_id, &name))
    }

    async fn begin_upload(&self, declaration: &UploadDeclaration) -> BridgeResult<BeginUpload> {
        self.begin_upload_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        let mut declaration = declaration.clone();

        if let Some(existing) = state
            .child(&declaration.parent_id, &declaration.name, false)
            .cloned()
        {
            match declaration.duplicate {
                DuplicateMode::Reject => return Ok(BeginUpload::Conflict),
                DuplicateMode::KeepBoth => {
                    declaration.name =
                        state.free_name(&declaration.parent_id, &declaration.name, false);
                }
                DuplicateMode::Overwrite => {
                    state.objects.remove(&existing.id);
                }
            }
        }

        if state
            .known_content
            .contains(&declaration.digest.to_lowercase())
        {
            let id = state.allocate_id();
            state.objects.insert(
                id.clone(),
                StoredObject {
                    id: id.clone(),
                    parent_id: declaration.parent_id.clone(),
                    name: declaration.name.clone(),
                    is_directory: false,
                    content: Vec::new(),
                    digest: Some(declaration.digest.clone()),
                    finalized: true,
                },
            );
            return Ok(BeginUpload::Reused { file_id: Some(id) });
        }

        self.sessions_opened.fetch_add(1, Ordering::SeqCst);
        let file_id = state.allocate_id();
        let upload_id = format!("upload-{}", file_id);
        state.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                declaration,
                file_id: file_id.clone(),
                parts: BTreeMap::new(),
                arrival: Vec::new(),
            },
        );

        Ok(BeginUpload::Session(UploadCoordinates {
            file_id,
            bucket: "memory".to_string(),
            key: format!("key/{}", upload_id),
            upload_id,
            storage_node: "node-0".to_string(),
        }))
    }

    async fn issue_part_url(
        &self,
        session: &UploadCoordinates,
        part_number: u32,
    ) -> BridgeResult<String> {
        let mut state = self.state.lock().unwrap();
        if !state.uploads.contains_key(&session.upload_id) {
            return Err(BridgeError::rejected(404, "unknown upload session"));
        }
        let url = format!("mem://{}/{}", session.upload_id, part_number);
        state
            .part_urls
            .insert(url.clone(), (session.upload_id.clone(), part_number));
        Ok(url)
    }

    async fn put_part(&self, url: &str, bytes: Bytes) -> BridgeResult<()> {
        self.put_part_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        let (upload_id, part_number) = state
            .part_urls
            .remove(url)
            .ok_or_else(|| BridgeError::rejected(403, "part url already used"))?;

        let name = match state.uploads.get(&upload_id) {
            Some(upload) => upload.declaration.name.clone(),
            None => return Err(BridgeError::rejected(404, "unknown upload session")),
        };
        if state.failing_files.contains(&name) {
            return Err(BridgeError::OperationFailed("connection reset".to_string()));
        }

        state
            .part_arrivals
            .entry(name)
            .or_default()
            .push(part_number);
        if let Some(upload) = state.uploads.get_mut(&upload_id) {
            upload.parts.insert(part_number, bytes.to_vec());
            upload.arrival.push(part_number);
        }
        Ok(())
    }

    async fn complete_upload(&self, session: &UploadCoordinates) -> BridgeResult<()> {
        let mut state = self.state.lock().unwrap();
        let upload = state
            .uploads
            .remove(&session.upload_id)
            .ok_or_else(|| BridgeError::rejected(404, "unknown upload session"))?;

        let expected: Vec<u32> = (1..=upload.parts.len() as u32).collect();
        if upload.arrival != expected {
            return Err(BridgeError::rejected(400, "parts out of order"));
        }

        let content: Vec<u8> = upload.parts.into_values().flatten().collect();
        if content.len() as u64 != upload.declaration.size {
            return Err(BridgeError::rejected(400, "size mismatch"));
        }

        state.objects.insert(
            upload.file_id.clone(),
            StoredObject {
                id: upload.file_id,
                parent_id: upload.declaration.parent_id,
                name: upload.declaration.name,
                is_directory: false,
                digest: Some(ContentHasher::digest_bytes(&content)),
                content,
                finalized: false,
            },
        );
        Ok(())
    }

    async fn finalize(&self, file_id: &str) -> BridgeResult<()> {
        let mut state = self.state.lock().unwrap();
        let object = state
            .objects
            .get_mut(file_id)
            .ok_or_else(|| BridgeError::rejected(404, "unknown file"))?;
        object.finalized = true;
        Ok(())
    }

    async fn delete_object(&self, id: &str) -> BridgeResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        state
            .objects
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| BridgeError::NotFound(id.to_string()))
    }

    async fn ranged_get(&self, url: &str, start: u64, end: u64) -> BridgeResult<ByteStream> {
        self.ranged_get_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();

        if let Some(remaining) = state.failing_ranges.get_mut(&(url.to_string(), start)) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(BridgeError::OperationFailed(format!(
                    "range {}-{} reset",
                    start, end
                )));
            }
        }

        let resource = state
            .resources
            .get(url)
            .ok_or_else(|| BridgeError::rejected(404, "no such resource"))?;
        let end = (end as usize).min(resource.content.len().saturating_sub(1));
        let slice = resource.content[start as usize..=end].to_vec();
        Ok(Box::new(Cursor::new(slice)))
    }

    async fn get(&self, url: &str) -> BridgeResult<ByteStream> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        let resource = state
            .resources
            .get(url)
            .ok_or_else(|| BridgeError::rejected(404, "no such resource"))?;
        Ok(Box::new(Cursor::new(resource.content.clone())))
    }

    async fn probe_size(&self, url: &str) -> BridgeResult<Option<u64>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .resources
            .get(url)
            .filter(|r| r.advertise_size)
            .map(|r| r.content.len() as u64))
    }

    /// Publishes the object's content as a resource at `mem://download/<id>`.
    async fn resolve_download_url(&self, entry: &RemoteEntry) -> BridgeResult<String> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        let object = state
            .objects
            .get(&entry.id)
            .filter(|o| o.finalized)
            .cloned()
            .ok_or_else(|| BridgeError::rejected(404, "no such object"))?;
        if object.is_directory {
            return Err(BridgeError::rejected(400, "folder archives are not supported"));
        }

        let url = format!("mem://download/{}", object.id);
        state.resources.insert(
            url.clone(),
            Resource {
                content: object.content,
                advertise_size: true,
            },
        );
        Ok(url)
    }
}

fn to_entry(object: &StoredObject) -> RemoteEntry {
    RemoteEntry {
        id: object.id.clone(),
        name: object.name.clone(),
        is_directory: object.is_directory,
        digest: object.digest.clone(),
        size: object.content.len() as u64,
        storage_tag: None,
    }
}

/// Real filesystem that counts how often each file is opened for reading.
#[derive(Debug, Default)]
pub struct CountingFs {
    inner: TokioFileSystem,
    reads: Mutex<HashMap<PathBuf, usize>>,
}

impl CountingFs {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reads_of(&self, path: &Path) -> usize {
        self.reads.lock().unwrap().get(path).copied().unwrap_or(0)
    }
}

#[async_trait]
impl LocalFilesystem for CountingFs {
    async fn exists(&self, path: &Path) -> BridgeResult<bool> {
        self.inner.exists(path).await
    }

    async fn metadata(&self, path: &Path) -> BridgeResult<FileMetadata> {
        self.inner.metadata(path).await
    }

    async fn create_dir_all(&self, path: &Path) -> BridgeResult<()> {
        self.inner.create_dir_all(path).await
    }

    async fn delete_file(&self, path: &Path) -> BridgeResult<()> {
        self.inner.delete_file(path).await
    }

    async fn list_directory(&self, path: &Path) -> BridgeResult<Vec<PathBuf>> {
        self.inner.list_directory(path).await
    }

    async fn open_read_stream(&self, path: &Path) -> BridgeResult<ReadStream> {
        *self
            .reads
            .lock()
            .unwrap()
            .entry(path.to_path_buf())
            .or_default() += 1;
        self.inner.open_read_stream(path).await
    }

    async fn open_write_stream(&self, path: &Path) -> BridgeResult<WriteStream> {
        self.inner.open_write_stream(path).await
    }
}

pub fn settings() -> TransferSettings {
    TransferSettings::default().without_delays()
}

pub fn context(store: Arc<MemoryStore>) -> TransferContext {
    TransferContext::new(store, Arc::new(TokioFileSystem::new()), settings())
}

/// Write `content` to `root/relative`, creating parent directories.
pub fn write_file(root: &Path, relative: &str, content: &[u8]) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
}

/// Deterministic, non-repeating-looking bytes.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 31 + i / 251) % 256) as u8).collect()
}
