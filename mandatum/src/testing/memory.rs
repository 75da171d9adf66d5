use super::files::{MemoryDirectory, MemoryFile};
use super::probe::{BackendCall, CallRecord, Probe};
use crate::backend::{
    Backend, DirectoryHandle, FileHandle, FileInfo, FileInfoOptions, FileType, FindDirectoryKind,
    OpenMode, SetFileInfoMask, Uri, XferErrorMode, XferOptions, XferOverwriteMode, XferPhase,
    XferProgress, XferProgressInfo, XferProgressStatus, XferReply, XferRequest,
};
use crate::cancel::CancellationToken;
use crate::error::{BackendError, VfsError, VfsResult};

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};

/// Links followed before giving up on a chain.
const MAX_LINK_DEPTH: usize = 8;

const DEFAULT_FILE_PERMISSIONS: u32 = 0o644;
const DEFAULT_DIRECTORY_PERMISSIONS: u32 = 0o755;

#[derive(Clone)]
pub(crate) struct Node {
    file_type: FileType,
    data: Arc<Mutex<Vec<u8>>>,
    permissions: u32,
    uid: u32,
    gid: u32,
    modified: SystemTime,
    symlink_target: Option<String>,
}

impl Node {
    fn file(data: Vec<u8>, permissions: u32) -> Self {
        Self {
            file_type: FileType::Regular,
            data: Arc::new(Mutex::new(data)),
            permissions,
            uid: 0,
            gid: 0,
            modified: SystemTime::now(),
            symlink_target: None,
        }
    }

    fn directory(permissions: u32) -> Self {
        Self {
            file_type: FileType::Directory,
            ..Self::file(Vec::new(), permissions)
        }
    }

    fn symbolic_link(target: &str) -> Self {
        Self {
            file_type: FileType::SymbolicLink,
            symlink_target: Some(target.to_string()),
            ..Self::file(Vec::new(), 0o777)
        }
    }

    fn is_directory(&self) -> bool {
        self.file_type == FileType::Directory
    }

    /// Deep copy: the new node does not share contents with `self`.
    fn duplicate(&self) -> Self {
        let data = self.data.lock().clone();

        Self {
            data: Arc::new(Mutex::new(data)),
            modified: SystemTime::now(),
            ..self.clone()
        }
    }

    fn info(&self, name: &str, options: FileInfoOptions) -> FileInfo {
        FileInfo {
            name: name.to_string(),
            file_type: self.file_type,
            size: self.data.lock().len() as u64,
            permissions: self.permissions,
            uid: self.uid,
            gid: self.gid,
            modified: Some(self.modified),
            symlink_target: self.symlink_target.clone(),
            mime_type: options
                .get_mime_type
                .then(|| guess_mime_type(name, self.file_type).to_string()),
        }
    }
}

/// Everything the backend and its open handles share.
pub(crate) struct Store {
    pub(crate) nodes: Mutex<BTreeMap<String, Node>>,
    pub(crate) probe: Probe,
    pub(crate) opened: AtomicUsize,
    pub(crate) closed: AtomicUsize,
}

/// In-memory [`Backend`] for tests and examples.
///
/// Holds a tree of files, directories and symbolic links keyed by path; the
/// URI scheme is ignored. Besides storage it offers the hooks the engine's
/// tests need:
/// - pausing a kind of call until resumed ([`pause`](Self::pause)),
/// - a log of every finished call with ordering information
///   ([`calls`](Self::calls)),
/// - counters of opened and closed files,
/// - artificial latency and one-shot panics.
///
/// # Examples
///
/// ```rust,ignore
/// let backend = Arc::new(MemoryBackend::new());
/// backend.insert_file("/docs/a.txt", "hello");
///
/// let (engine, event_loop) = EngineBuilder::new().build(backend.clone());
/// ```
pub struct MemoryBackend {
    store: Arc<Store>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Creates a tree holding only the root directory.
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::directory(DEFAULT_DIRECTORY_PERMISSIONS));

        Self {
            store: Arc::new(Store {
                nodes: Mutex::new(nodes),
                probe: Probe::default(),
                opened: AtomicUsize::new(0),
                closed: AtomicUsize::new(0),
            }),
        }
    }

    /// Stores a file, creating missing parent directories.
    pub fn insert_file(&self, path: &str, data: impl Into<Vec<u8>>) {
        let path = normalize(path);
        let mut nodes = self.store.nodes.lock();

        create_parents(&mut nodes, &path);
        nodes.insert(path, Node::file(data.into(), DEFAULT_FILE_PERMISSIONS));
    }

    /// Creates a directory and its missing parents.
    pub fn insert_directory(&self, path: &str) {
        let path = normalize(path);
        let mut nodes = self.store.nodes.lock();

        create_parents(&mut nodes, &path);
        nodes
            .entry(path)
            .or_insert_with(|| Node::directory(DEFAULT_DIRECTORY_PERMISSIONS));
    }

    pub fn insert_symbolic_link(&self, path: &str, target: &str) {
        let path = normalize(path);
        let mut nodes = self.store.nodes.lock();

        create_parents(&mut nodes, &path);
        nodes.insert(path, Node::symbolic_link(target));
    }

    /// Contents of the file at `path`, if it is one.
    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        let nodes = self.store.nodes.lock();

        nodes
            .get(&normalize(path))
            .filter(|node| node.file_type == FileType::Regular)
            .map(|node| node.data.lock().clone())
    }

    pub fn exists(&self, path: &str) -> bool {
        self.store.nodes.lock().contains_key(&normalize(path))
    }

    /// Metadata of `path` without following links.
    pub fn info(&self, path: &str) -> Option<FileInfo> {
        let path = normalize(path);
        let nodes = self.store.nodes.lock();

        nodes
            .get(&path)
            .map(|node| node.info(name_of(&path), FileInfoOptions::default()))
    }

    /// Files opened and not closed yet.
    pub fn open_files(&self) -> usize {
        self.store.opened.load(Ordering::SeqCst) - self.store.closed.load(Ordering::SeqCst)
    }

    /// Files closed so far.
    pub fn close_count(&self) -> usize {
        self.store.closed.load(Ordering::SeqCst)
    }

    /// Makes every future `call` wait until [`resume`](Self::resume) or
    /// until its token is cancelled.
    pub fn pause(&self, call: BackendCall) {
        self.store.probe.pause(call);
    }

    pub fn resume(&self, call: BackendCall) {
        self.store.probe.resume(call);
    }

    /// Waits until a `call` is parked behind its paused gate.
    pub fn wait_until_blocked(&self, call: BackendCall, timeout: Duration) -> bool {
        self.store.probe.wait_until_blocked(call, timeout)
    }

    /// Number of `call`s currently parked behind a paused gate.
    pub fn blocked(&self, call: BackendCall) -> usize {
        self.store.probe.blocked(call)
    }

    /// Adds `latency` to every call.
    pub fn set_latency(&self, latency: Duration) {
        self.store.probe.set_latency(latency);
    }

    /// Makes the next `call` panic.
    pub fn panic_on(&self, call: BackendCall) {
        self.store.probe.panic_on(call);
    }

    /// Every finished call, in completion order.
    pub fn calls(&self) -> Vec<CallRecord> {
        self.store.probe.records()
    }

    fn file(&self, path: String, node: &Node, mode: OpenMode) -> Box<dyn FileHandle> {
        Box::new(MemoryFile::new(
            self.store.clone(),
            path,
            node.data.clone(),
            mode,
        ))
    }

    /// Copies one planned entry, asking about overwrites as configured.
    fn transfer_one(
        &self,
        item: &PlanItem,
        request: &XferRequest,
        progress: &mut XferProgress<'_>,
        info: &mut XferProgressInfo,
        token: &CancellationToken,
    ) -> VfsResult<()> {
        token.check()?;

        let source = {
            let nodes = self.store.nodes.lock();
            nodes
                .get(item.source.path())
                .cloned()
                .ok_or_else(|| BackendError::NotFound(item.source.to_string()))?
        };

        if source.is_directory() {
            if !request.options.contains(XferOptions::RECURSIVE) {
                return Err(BackendError::IsDirectory(item.source.to_string()).into());
            }

            let mut nodes = self.store.nodes.lock();
            check_parent(&nodes, item.target.path())?;

            return match nodes.get(item.target.path()) {
                Some(existing) if existing.is_directory() => Ok(()),
                Some(_) => Err(BackendError::NotDirectory(item.target.to_string()).into()),
                None => {
                    nodes.insert(item.target.path().to_string(), source.duplicate());
                    Ok(())
                }
            };
        }

        info.phase = XferPhase::OpenTarget;

        let exists = self.store.nodes.lock().contains_key(item.target.path());
        if exists {
            let replace = match request.overwrite_mode {
                XferOverwriteMode::Abort => {
                    return Err(BackendError::AlreadyExists(item.target.to_string()).into());
                }
                XferOverwriteMode::Replace => true,
                XferOverwriteMode::Skip => false,
                XferOverwriteMode::Query => {
                    info.status = XferProgressStatus::Overwrite;
                    let reply = report(progress, info)?;
                    info.status = XferProgressStatus::Ok;

                    match reply {
                        XferReply::Replace => true,
                        XferReply::Skip | XferReply::Continue => false,
                        XferReply::Abort | XferReply::Retry => return Err(VfsError::Interrupted),
                    }
                }
            };

            if !replace {
                return Ok(());
            }
        }

        info.phase = XferPhase::Copying;
        info.file_size = item.size;
        info.bytes_copied = 0;
        report(progress, info)?;

        {
            let mut nodes = self.store.nodes.lock();
            check_parent(&nodes, item.target.path())?;
            nodes.insert(item.target.path().to_string(), source.duplicate());
        }

        info.bytes_copied = item.size;
        info.total_bytes_copied += item.size;
        report(progress, info)?;

        if request.options.contains(XferOptions::REMOVE_SOURCE) {
            info.phase = XferPhase::DeleteSource;
            self.store.nodes.lock().remove(item.source.path());
        }

        info.phase = XferPhase::FileDone;
        report(progress, info)?;

        Ok(())
    }

    /// Expands the request into single entries, parents first.
    fn plan(&self, request: &XferRequest) -> Vec<PlanItem> {
        let nodes = self.store.nodes.lock();
        let mut items = Vec::new();

        for (source, target) in request.sources.iter().zip(&request.targets) {
            let Some(node) = nodes.get(source.path()) else {
                items.push(PlanItem {
                    source: source.clone(),
                    target: target.clone(),
                    directory: false,
                    size: 0,
                });
                continue;
            };

            items.push(PlanItem {
                source: source.clone(),
                target: target.clone(),
                directory: node.is_directory(),
                size: node.data.lock().len() as u64,
            });

            if !node.is_directory() || !request.options.contains(XferOptions::RECURSIVE) {
                continue;
            }

            let prefix = child_prefix(source.path());
            for (path, child) in nodes.range(prefix.clone()..) {
                let Some(rest) = path.strip_prefix(&prefix) else {
                    break;
                };

                if rest.is_empty() {
                    continue;
                }

                items.push(PlanItem {
                    source: Uri::new(source.scheme(), path),
                    target: target.append_file_name(rest),
                    directory: child.is_directory(),
                    size: child.data.lock().len() as u64,
                });
            }
        }

        items
    }
}

struct PlanItem {
    source: Uri,
    target: Uri,
    directory: bool,
    size: u64,
}

/// Sends one progress report; an `Abort` answer ends the transfer.
fn report(progress: &mut XferProgress<'_>, info: &XferProgressInfo) -> VfsResult<XferReply> {
    match progress(info) {
        XferReply::Abort => Err(VfsError::Interrupted),
        reply => Ok(reply),
    }
}

impl Backend for MemoryBackend {
    fn open(
        &self,
        uri: &Uri,
        mode: OpenMode,
        token: &CancellationToken,
    ) -> VfsResult<Box<dyn FileHandle>> {
        let _scope = self.store.probe.enter(BackendCall::Open, uri.path(), token)?;
        token.check()?;

        let nodes = self.store.nodes.lock();
        let (path, node) = resolve(&nodes, uri.path(), true)?;

        if node.is_directory() {
            return Err(BackendError::IsDirectory(uri.to_string()).into());
        }

        if mode.contains(OpenMode::WRITE | OpenMode::TRUNCATE) {
            node.data.lock().clear();
        }

        Ok(self.file(path, node, mode))
    }

    fn create(
        &self,
        uri: &Uri,
        mode: OpenMode,
        exclusive: bool,
        permissions: u32,
        token: &CancellationToken,
    ) -> VfsResult<Box<dyn FileHandle>> {
        let _scope = self.store.probe.enter(BackendCall::Create, uri.path(), token)?;
        token.check()?;

        let mut nodes = self.store.nodes.lock();
        check_parent(&nodes, uri.path())?;

        match nodes.get(uri.path()) {
            Some(_) if exclusive => Err(BackendError::AlreadyExists(uri.to_string()).into()),
            Some(node) if node.is_directory() => {
                Err(BackendError::IsDirectory(uri.to_string()).into())
            }
            Some(node) => {
                node.data.lock().clear();
                Ok(self.file(uri.path().to_string(), node, mode))
            }
            None => {
                let node = Node::file(Vec::new(), permissions);
                let file = self.file(uri.path().to_string(), &node, mode);
                nodes.insert(uri.path().to_string(), node);

                Ok(file)
            }
        }
    }

    fn create_symbolic_link(
        &self,
        uri: &Uri,
        target: &str,
        token: &CancellationToken,
    ) -> VfsResult<()> {
        let _scope = self
            .store
            .probe
            .enter(BackendCall::CreateSymbolicLink, uri.path(), token)?;
        token.check()?;

        let mut nodes = self.store.nodes.lock();
        check_parent(&nodes, uri.path())?;

        if nodes.contains_key(uri.path()) {
            return Err(BackendError::AlreadyExists(uri.to_string()).into());
        }

        nodes.insert(uri.path().to_string(), Node::symbolic_link(target));

        Ok(())
    }

    fn get_file_info(
        &self,
        uri: &Uri,
        options: FileInfoOptions,
        token: &CancellationToken,
    ) -> VfsResult<FileInfo> {
        let _scope = self
            .store
            .probe
            .enter(BackendCall::GetFileInfo, uri.path(), token)?;
        token.check()?;

        let nodes = self.store.nodes.lock();
        let (_, node) = resolve(&nodes, uri.path(), options.follow_links)?;

        Ok(node.info(name_of(uri.path()), options))
    }

    fn set_file_info(
        &self,
        uri: &Uri,
        info: &FileInfo,
        mask: SetFileInfoMask,
        token: &CancellationToken,
    ) -> VfsResult<()> {
        let _scope = self
            .store
            .probe
            .enter(BackendCall::SetFileInfo, uri.path(), token)?;
        token.check()?;

        let mut nodes = self.store.nodes.lock();
        let path = uri.path().to_string();

        let node = nodes
            .get_mut(&path)
            .ok_or_else(|| BackendError::NotFound(uri.to_string()))?;

        if mask.contains(SetFileInfoMask::PERMISSIONS) {
            node.permissions = info.permissions;
        }

        if mask.contains(SetFileInfoMask::OWNER) {
            node.uid = info.uid;
            node.gid = info.gid;
        }

        if mask.contains(SetFileInfoMask::TIME) {
            if let Some(modified) = info.modified {
                node.modified = modified;
            }
        }

        if mask.contains(SetFileInfoMask::NAME) {
            rename(&mut nodes, uri, &info.name)?;
        }

        Ok(())
    }

    fn open_directory(
        &self,
        uri: &Uri,
        options: FileInfoOptions,
        token: &CancellationToken,
    ) -> VfsResult<Box<dyn DirectoryHandle>> {
        let _scope = self
            .store
            .probe
            .enter(BackendCall::OpenDirectory, uri.path(), token)?;
        token.check()?;

        let nodes = self.store.nodes.lock();
        let (path, node) = resolve(&nodes, uri.path(), true)?;

        if !node.is_directory() {
            return Err(BackendError::NotDirectory(uri.to_string()).into());
        }

        let prefix = child_prefix(&path);
        let entries = nodes
            .range(prefix.clone()..)
            .take_while(|(child, _)| child.starts_with(&prefix))
            .filter(|(child, _)| {
                let rest = &child[prefix.len()..];
                !rest.is_empty() && !rest.contains('/')
            })
            .map(|(child, node)| node.info(name_of(child), options))
            .collect();

        Ok(Box::new(MemoryDirectory::new(self.store.clone(), path, entries)))
    }

    /// The trash lives in `/.Trash` and the desktop in `/Desktop`, whatever
    /// `near` is. `find_if_needed` has no effect on a single in-memory
    /// volume.
    fn find_directory(
        &self,
        near: &Uri,
        kind: FindDirectoryKind,
        create_if_needed: bool,
        _find_if_needed: bool,
        permissions: u32,
        token: &CancellationToken,
    ) -> VfsResult<Uri> {
        let _scope = self
            .store
            .probe
            .enter(BackendCall::FindDirectory, near.path(), token)?;
        token.check()?;

        let mut nodes = self.store.nodes.lock();

        if !nodes.contains_key(near.path()) {
            return Err(BackendError::NotFound(near.to_string()).into());
        }

        let path = match kind {
            FindDirectoryKind::Trash => "/.Trash",
            FindDirectoryKind::Desktop => "/Desktop",
        };
        let found = Uri::new(near.scheme(), path);

        match nodes.get(path) {
            Some(node) if node.is_directory() => Ok(found),
            Some(_) => Err(BackendError::NotDirectory(found.to_string()).into()),
            None if create_if_needed => {
                nodes.insert(path.to_string(), Node::directory(permissions));
                Ok(found)
            }
            None => Err(BackendError::NotFound(found.to_string()).into()),
        }
    }

    fn xfer(
        &self,
        request: &XferRequest,
        progress: &mut XferProgress<'_>,
        token: &CancellationToken,
    ) -> VfsResult<()> {
        let first = request.sources.first().map(Uri::path).unwrap_or("/");
        let _scope = self.store.probe.enter(BackendCall::Xfer, first, token)?;

        if request.sources.is_empty() || request.sources.len() != request.targets.len() {
            return Err(VfsError::BadParameters(
                "xfer needs as many targets as sources".into(),
            ));
        }

        let mut info = XferProgressInfo::default();
        report(progress, &info)?;

        info.phase = XferPhase::Collecting;
        let items = self.plan(request);

        info.files_total = items.iter().filter(|item| !item.directory).count() as u64;
        info.bytes_total = items.iter().map(|item| item.size).sum();
        info.phase = XferPhase::ReadyToGo;
        report(progress, &info)?;

        for (index, item) in items.iter().enumerate() {
            info.file_index = index as u64 + 1;
            info.source = Some(item.source.clone());
            info.target = Some(item.target.clone());
            info.phase = XferPhase::OpenSource;

            loop {
                match self.transfer_one(item, request, progress, &mut info, token) {
                    Ok(()) => break,
                    Err(e @ (VfsError::Interrupted | VfsError::Cancelled)) => return Err(e),
                    Err(e) if request.error_mode == XferErrorMode::Abort => return Err(e),
                    Err(e) => {
                        info.status = XferProgressStatus::VfsError;
                        info.vfs_status = Some(e.kind());
                        let reply = report(progress, &info)?;
                        info.status = XferProgressStatus::Ok;
                        info.vfs_status = None;

                        match reply {
                            XferReply::Retry => continue,
                            _ => break,
                        }
                    }
                }
            }
        }

        if request.options.contains(XferOptions::REMOVE_SOURCE) {
            info.phase = XferPhase::Cleanup;

            let mut nodes = self.store.nodes.lock();
            for item in items.iter().rev().filter(|item| item.directory) {
                let prefix = child_prefix(item.source.path());
                let empty = nodes
                    .range(prefix.clone()..)
                    .next()
                    .is_none_or(|(path, _)| !path.starts_with(&prefix));

                if empty {
                    nodes.remove(item.source.path());
                }
            }
        }

        info.phase = XferPhase::Completed;
        info.source = None;
        info.target = None;
        report(progress, &info)?;

        Ok(())
    }
}

fn normalize(path: &str) -> String {
    Uri::new("mem", path).path().to_string()
}

fn name_of(path: &str) -> &str {
    match path.rsplit('/').next() {
        Some("") | None => "/",
        Some(name) => name,
    }
}

fn parent_of(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }

    match path.rfind('/') {
        Some(0) | None => Some("/"),
        Some(cut) => Some(&path[..cut]),
    }
}

/// Prefix shared by every path strictly below `path`.
fn child_prefix(path: &str) -> String {
    if path == "/" {
        "/".to_string()
    } else {
        format!("{path}/")
    }
}

fn create_parents(nodes: &mut BTreeMap<String, Node>, path: &str) {
    let mut current = parent_of(path);
    let mut missing = Vec::new();

    while let Some(parent) = current {
        if nodes.contains_key(parent) {
            break;
        }

        missing.push(parent.to_string());
        current = parent_of(parent);
    }

    for parent in missing.into_iter().rev() {
        nodes.insert(parent, Node::directory(DEFAULT_DIRECTORY_PERMISSIONS));
    }
}

fn check_parent(nodes: &BTreeMap<String, Node>, path: &str) -> VfsResult<()> {
    let Some(parent) = parent_of(path) else {
        return Err(BackendError::AlreadyExists("/".to_string()).into());
    };

    match nodes.get(parent) {
        Some(node) if node.is_directory() => Ok(()),
        Some(_) => Err(BackendError::NotDirectory(parent.to_string()).into()),
        None => Err(BackendError::NotFound(parent.to_string()).into()),
    }
}

/// Finds the node at `path`, optionally following symbolic links.
fn resolve<'a>(
    nodes: &'a BTreeMap<String, Node>,
    path: &str,
    follow_links: bool,
) -> VfsResult<(String, &'a Node)> {
    let mut current = path.to_string();

    for _ in 0..MAX_LINK_DEPTH {
        let node = nodes
            .get(&current)
            .ok_or_else(|| BackendError::NotFound(current.clone()))?;

        let target = match (&node.symlink_target, follow_links) {
            (Some(target), true) => target,
            _ => return Ok((current, node)),
        };

        current = if target.starts_with('/') {
            normalize(target)
        } else {
            let base = parent_of(&current).unwrap_or("/");
            normalize(&format!("{base}/{target}"))
        };
    }

    Err(BackendError::Other(format!("too many levels of symbolic links: {path}")).into())
}

/// Moves `uri` and everything below it to `name` in the same directory.
fn rename(nodes: &mut BTreeMap<String, Node>, uri: &Uri, name: &str) -> VfsResult<()> {
    if name.is_empty() || name.contains('/') {
        return Err(VfsError::BadParameters(format!("invalid file name {name:?}")));
    }

    let Some(parent) = uri.parent() else {
        return Err(VfsError::BadParameters("cannot rename the root".into()));
    };

    let from = uri.path().to_string();
    let to = parent.append_file_name(name).path().to_string();

    if from == to {
        return Ok(());
    }

    if nodes.contains_key(&to) {
        return Err(BackendError::AlreadyExists(to).into());
    }

    let prefix = child_prefix(&from);
    let moved: Vec<String> = nodes
        .range(prefix.clone()..)
        .take_while(|(path, _)| path.starts_with(&prefix))
        .map(|(path, _)| path.clone())
        .collect();

    if let Some(node) = nodes.remove(&from) {
        nodes.insert(to.clone(), node);
    }

    for path in moved {
        if let Some(node) = nodes.remove(&path) {
            nodes.insert(format!("{to}/{}", &path[prefix.len()..]), node);
        }
    }

    Ok(())
}

fn guess_mime_type(name: &str, file_type: FileType) -> &'static str {
    if file_type == FileType::Directory {
        return "inode/directory";
    }

    match name.rsplit_once('.').map(|(_, ext)| ext) {
        Some("txt") => "text/plain",
        Some("html") => "text/html",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("rs") => "text/rust",
        _ => "application/octet-stream",
    }
}
