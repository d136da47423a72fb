//! External services the import pipelines call, plus in-memory fakes.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::RwLock;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use light_core::UserId;

use crate::error::JobError;

/// Export state of a requested document archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveStatus {
    Pending,
    Ready { location: String },
}

/// Source documents (e.g. Google Docs) and their archive export.
pub trait DocumentSource: Send + Sync {
    /// Whether `owner` has granted access to `resource_id`.
    fn is_authorized(&self, owner: UserId, resource_id: &str) -> Result<bool, JobError>;

    fn document_title(&self, resource_id: &str) -> Result<String, JobError>;

    /// Start exporting `resource_id`; returns the archive id.
    fn request_archive(&self, resource_id: &str) -> Result<String, JobError>;

    fn archive_status(&self, archive_id: &str) -> Result<ArchiveStatus, JobError>;
}

/// Module repository: creation, versioning, publication and search indexing.
pub trait ModuleCatalog: Send + Sync {
    /// Create an empty module; returns its id.
    fn create_module(&self, owner: UserId, title: &str) -> Result<String, JobError>;

    /// Reserve the next version number of `module_id` (starting at 1).
    fn reserve_version(&self, module_id: &str) -> Result<u32, JobError>;

    fn publish(&self, module_id: &str, version: u32, archive_location: &str) -> Result<(), JobError>;

    fn index(&self, module_id: &str, version: u32) -> Result<(), JobError>;
}

fn poisoned<T>(_: T) -> JobError {
    JobError::collaborator("lock poisoned")
}

#[derive(Debug)]
struct Archive {
    resource_id: String,
    polls_left: u32,
}

/// In-memory document source for tests/dev.
///
/// Archives become ready after a configurable number of status checks.
#[derive(Debug, Default)]
pub struct InMemoryDocumentSource {
    titles: RwLock<HashMap<String, String>>,
    grants: RwLock<HashSet<(UserId, String)>>,
    archives: RwLock<HashMap<String, Archive>>,
    export_polls: AtomicU32,
    next_archive: AtomicU64,
}

impl InMemoryDocumentSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `Pending` answers before an archive turns ready.
    pub fn with_export_polls(self, polls: u32) -> Self {
        self.export_polls.store(polls, Ordering::SeqCst);
        self
    }

    pub fn add_document(&self, resource_id: &str, title: &str) -> Result<(), JobError> {
        self.titles
            .write()
            .map_err(poisoned)?
            .insert(resource_id.to_string(), title.to_string());
        Ok(())
    }

    pub fn grant(&self, owner: UserId, resource_id: &str) -> Result<(), JobError> {
        self.grants
            .write()
            .map_err(poisoned)?
            .insert((owner, resource_id.to_string()));
        Ok(())
    }

    /// Number of export requests made so far.
    pub fn archive_requests(&self) -> u64 {
        self.next_archive.load(Ordering::SeqCst)
    }
}

impl DocumentSource for InMemoryDocumentSource {
    fn is_authorized(&self, owner: UserId, resource_id: &str) -> Result<bool, JobError> {
        let grants = self.grants.read().map_err(poisoned)?;
        Ok(grants.contains(&(owner, resource_id.to_string())))
    }

    fn document_title(&self, resource_id: &str) -> Result<String, JobError> {
        self.titles
            .read()
            .map_err(poisoned)?
            .get(resource_id)
            .cloned()
            .ok_or_else(|| JobError::collaborator(format!("document {resource_id} not found")))
    }

    fn request_archive(&self, resource_id: &str) -> Result<String, JobError> {
        // Validates the document exists.
        self.document_title(resource_id)?;

        let n = self.next_archive.fetch_add(1, Ordering::SeqCst) + 1;
        let archive_id = format!("export-{n}");
        self.archives.write().map_err(poisoned)?.insert(
            archive_id.clone(),
            Archive {
                resource_id: resource_id.to_string(),
                polls_left: self.export_polls.load(Ordering::SeqCst),
            },
        );
        Ok(archive_id)
    }

    fn archive_status(&self, archive_id: &str) -> Result<ArchiveStatus, JobError> {
        let mut archives = self.archives.write().map_err(poisoned)?;
        let archive = archives
            .get_mut(archive_id)
            .ok_or_else(|| JobError::collaborator(format!("archive {archive_id} not found")))?;

        if archive.polls_left > 0 {
            archive.polls_left -= 1;
            return Ok(ArchiveStatus::Pending);
        }
        Ok(ArchiveStatus::Ready {
            location: format!("memory://archives/{}/{archive_id}.zip", archive.resource_id),
        })
    }
}

/// Snapshot of a module held by [`InMemoryModuleCatalog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogModule {
    pub owner: UserId,
    pub title: String,
    pub reserved: u32,
    pub published: BTreeSet<u32>,
    pub indexed: BTreeSet<u32>,
}

/// In-memory module catalog for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryModuleCatalog {
    modules: RwLock<HashMap<String, CatalogModule>>,
    next_id: AtomicU64,
}

impl InMemoryModuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn module(&self, module_id: &str) -> Option<CatalogModule> {
        self.modules.read().ok()?.get(module_id).cloned()
    }

    pub fn module_count(&self) -> usize {
        self.modules.read().map(|m| m.len()).unwrap_or(0)
    }

    fn with_module<T>(
        &self,
        module_id: &str,
        f: impl FnOnce(&mut CatalogModule) -> Result<T, JobError>,
    ) -> Result<T, JobError> {
        let mut modules = self.modules.write().map_err(poisoned)?;
        let module = modules
            .get_mut(module_id)
            .ok_or_else(|| JobError::collaborator(format!("module {module_id} not found")))?;
        f(module)
    }
}

impl ModuleCatalog for InMemoryModuleCatalog {
    fn create_module(&self, owner: UserId, title: &str) -> Result<String, JobError> {
        let id = format!("m{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.modules.write().map_err(poisoned)?.insert(
            id.clone(),
            CatalogModule {
                owner,
                title: title.to_string(),
                reserved: 0,
                published: BTreeSet::new(),
                indexed: BTreeSet::new(),
            },
        );
        Ok(id)
    }

    fn reserve_version(&self, module_id: &str) -> Result<u32, JobError> {
        self.with_module(module_id, |m| {
            m.reserved += 1;
            Ok(m.reserved)
        })
    }

    fn publish(&self, module_id: &str, version: u32, archive_location: &str) -> Result<(), JobError> {
        if archive_location.trim().is_empty() {
            return Err(JobError::collaborator("publish needs an archive location"));
        }
        self.with_module(module_id, |m| {
            if version == 0 || version > m.reserved {
                return Err(JobError::collaborator(format!(
                    "version {version} of {module_id} was never reserved"
                )));
            }
            m.published.insert(version);
            Ok(())
        })
    }

    fn index(&self, module_id: &str, version: u32) -> Result<(), JobError> {
        self.with_module(module_id, |m| {
            if !m.published.contains(&version) {
                return Err(JobError::collaborator(format!(
                    "version {version} of {module_id} is not published"
                )));
            }
            m.indexed.insert(version);
            Ok(())
        })
    }
}
