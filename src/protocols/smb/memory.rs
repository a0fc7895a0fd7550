//! In-memory SMB server for testing
//!
//! [`MemoryTransport`] implements the whole transport boundary against an
//! in-process server model: hosts with users and shares, share trees with
//! files and directories, and open handles with access checks. It keeps
//! counters of live connections, sessions, trees and handles so tests can
//! assert that nothing leaks.
//!
//! Paths are case-sensitive, unlike a real server.
//!
//! # Example
//!
//! ```
//! use orbit_smb_vfs::protocols::smb::MemoryTransport;
//!
//! let transport = MemoryTransport::new();
//! transport.add_host("fileserver");
//! transport.add_share("fileserver", "public");
//! transport.add_file("fileserver", "public", "docs/readme.txt", b"hello");
//!
//! assert_eq!(
//!     transport.read_file("fileserver", "public", "docs/readme.txt"),
//!     Some(b"hello".to_vec())
//! );
//! ```

use super::error::{Result, SmbError};
use super::types::*;
use super::{DiskShare, RemoteDirectory, RemoteFile, RemoteHandle, SmbConnection, SmbSession, SmbTransport};
use async_trait::async_trait;
use bytes::Bytes;
use secrecy::SecretString;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Normalize a share-relative path to the `a\b\c` key form
fn normalize(path: &str) -> String {
    path.replace('/', "\\")
        .split('\\')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("\\")
}

fn parent_of(key: &str) -> &str {
    key.rsplit_once('\\').map(|(parent, _)| parent).unwrap_or("")
}

fn base_name(key: &str) -> &str {
    key.rsplit_once('\\').map(|(_, name)| name).unwrap_or(key)
}

/// Snapshot of live remote resources
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceCounts {
    pub connections: usize,
    pub sessions: usize,
    pub trees: usize,
    pub handles: usize,
    /// Connections ever opened, closed ones included
    pub connects_total: usize,
}

impl ResourceCounts {
    /// Sum of all live resources
    pub fn live(&self) -> usize {
        self.connections + self.sessions + self.trees + self.handles
    }
}

#[derive(Debug, Default)]
struct Counters {
    connections: AtomicUsize,
    sessions: AtomicUsize,
    trees: AtomicUsize,
    handles: AtomicUsize,
    connects_total: AtomicUsize,
}

/// Releases one unit of a counter exactly once
#[derive(Debug)]
struct Tracked {
    closed: AtomicBool,
}

impl Tracked {
    fn open(counter: &AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self {
            closed: AtomicBool::new(false),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn close(&self, counter: &AtomicUsize) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            counter.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[derive(Debug, Clone)]
enum NodeKind {
    File(Vec<u8>),
    Directory,
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    attributes: FileAttributes,
    created: SystemTime,
    accessed: SystemTime,
    modified: SystemTime,
    changed: SystemTime,
}

impl Node {
    fn file(data: Vec<u8>) -> Self {
        let now = SystemTime::now();
        Self {
            kind: NodeKind::File(data),
            attributes: FileAttributes::ARCHIVE,
            created: now,
            accessed: now,
            modified: now,
            changed: now,
        }
    }

    fn directory() -> Self {
        let now = SystemTime::now();
        Self {
            kind: NodeKind::Directory,
            attributes: FileAttributes::DIRECTORY,
            created: now,
            accessed: now,
            modified: now,
            changed: now,
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Directory)
    }

    fn len(&self) -> u64 {
        match &self.kind {
            NodeKind::File(data) => data.len() as u64,
            NodeKind::Directory => 0,
        }
    }

    fn touch(&mut self) {
        let now = SystemTime::now();
        self.modified = now;
        self.changed = now;
    }

    fn info(&self) -> FileInformation {
        FileInformation {
            end_of_file: self.len(),
            attributes: self.attributes,
            creation_time: Some(self.created),
            last_access_time: Some(self.accessed),
            last_write_time: Some(self.modified),
            change_time: Some(self.changed),
        }
    }

    fn entry(&self, name: &str) -> DirectoryEntry {
        DirectoryEntry {
            file_name: name.to_string(),
            attributes: self.attributes,
            end_of_file: self.len(),
            last_write_time: Some(self.modified),
        }
    }
}

/// Files and directories of one share; the root (`""`) always exists
#[derive(Debug)]
struct ShareTree {
    root: Node,
    nodes: BTreeMap<String, Node>,
    conflicts: HashSet<String>,
    allowed_users: Option<HashSet<String>>,
}

impl ShareTree {
    fn new() -> Self {
        Self {
            root: Node::directory(),
            nodes: BTreeMap::new(),
            conflicts: HashSet::new(),
            allowed_users: None,
        }
    }

    fn node(&self, key: &str) -> Option<&Node> {
        if key.is_empty() {
            Some(&self.root)
        } else {
            self.nodes.get(key)
        }
    }

    fn node_mut(&mut self, key: &str) -> Option<&mut Node> {
        if key.is_empty() {
            Some(&mut self.root)
        } else {
            self.nodes.get_mut(key)
        }
    }

    fn is_dir(&self, key: &str) -> bool {
        self.node(key).is_some_and(Node::is_dir)
    }

    fn children(&self, key: &str) -> impl Iterator<Item = (&String, &Node)> {
        let key = key.to_string();
        self.nodes
            .iter()
            .filter(move |(child, _)| !child.is_empty() && parent_of(child) == key)
    }

    /// Insert a node, creating missing parent directories
    fn insert_with_parents(&mut self, key: &str, node: Node) {
        let mut current = String::new();
        let segments: Vec<&str> = key.split('\\').collect();
        for segment in &segments[..segments.len().saturating_sub(1)] {
            if !current.is_empty() {
                current.push('\\');
            }
            current.push_str(segment);
            self.nodes
                .entry(current.clone())
                .or_insert_with(Node::directory);
        }
        self.nodes.insert(key.to_string(), node);
    }

    fn listing(&self, key: &str, display: &str) -> Result<Vec<DirectoryEntry>> {
        let node = self
            .node(key)
            .ok_or_else(|| SmbError::NotFound(display.to_string()))?;
        if !node.is_dir() {
            return Err(SmbError::NotADirectory(display.to_string()));
        }

        let parent = self.node(parent_of(key)).unwrap_or(&self.root);
        let mut entries = vec![node.entry("."), parent.entry("..")];
        entries.extend(self.children(key).map(|(child, n)| n.entry(base_name(child))));
        Ok(entries)
    }

    /// Apply a create/open request to the tree
    fn open(&mut self, key: &str, args: &OpenArgs, want_dir: bool) -> Result<()> {
        match self.node_mut(key) {
            Some(node) => {
                if !args.disposition.may_open_existing() {
                    return Err(SmbError::ObjectNameCollision(key.to_string()));
                }
                if want_dir && !node.is_dir() {
                    return Err(SmbError::NotADirectory(key.to_string()));
                }
                if !want_dir && node.is_dir() {
                    return Err(SmbError::FileIsADirectory(key.to_string()));
                }
                if node.attributes.contains(FileAttributes::READONLY)
                    && (args.access.can_write_data() || args.access.can_delete())
                {
                    return Err(SmbError::Permission(key.to_string()));
                }
                if args.disposition.truncates() {
                    if let NodeKind::File(data) = &mut node.kind {
                        data.clear();
                        node.touch();
                    }
                }
                Ok(())
            }
            None => {
                if !args.disposition.may_create() {
                    return Err(SmbError::NotFound(key.to_string()));
                }
                let parent = parent_of(key);
                if !self.is_dir(parent) {
                    return Err(SmbError::NotFound(parent.to_string()));
                }
                let mut node = if want_dir {
                    Node::directory()
                } else {
                    Node::file(Vec::new())
                };
                let requested = args.attributes - FileAttributes::NORMAL;
                node.attributes |= requested;
                self.nodes.insert(key.to_string(), node);
                Ok(())
            }
        }
    }

    /// Move a node (and, for directories, everything below it)
    fn rename(&mut self, from: &str, to: &str, replace: bool) -> Result<()> {
        if from.is_empty() || to.is_empty() {
            return Err(SmbError::Permission("cannot rename the share root".to_string()));
        }
        if !self.nodes.contains_key(from) {
            return Err(SmbError::NotFound(from.to_string()));
        }
        if from == to {
            return Ok(());
        }
        if to.starts_with(&format!("{}\\", from)) {
            return Err(SmbError::InvalidPath(format!("cannot move {} into itself", from)));
        }
        if let Some(existing) = self.nodes.get(to) {
            if !replace {
                return Err(SmbError::ObjectNameCollision(to.to_string()));
            }
            if existing.is_dir() {
                return Err(SmbError::Permission(to.to_string()));
            }
        }
        if !self.is_dir(parent_of(to)) {
            return Err(SmbError::NotFound(parent_of(to).to_string()));
        }

        let prefix = format!("{}\\", from);
        let moved: Vec<String> = self
            .nodes
            .keys()
            .filter(|k| k.as_str() == from || k.starts_with(&prefix))
            .cloned()
            .collect();
        for old in moved {
            if let Some(mut node) = self.nodes.remove(&old) {
                let new = format!("{}{}", to, &old[from.len()..]);
                if old == from {
                    node.changed = SystemTime::now();
                }
                self.nodes.insert(new, node);
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
struct MemoryHost {
    users: HashMap<String, SecretString>,
    shares: HashMap<String, Arc<Mutex<ShareTree>>>,
    allow_guest: bool,
    unreachable: bool,
}

#[derive(Debug, Default)]
struct ServerState {
    hosts: Mutex<HashMap<String, MemoryHost>>,
    counters: Counters,
}

impl ServerState {
    fn tree(&self, host: &str, share: &str) -> Option<Arc<Mutex<ShareTree>>> {
        lock(&self.hosts)
            .get(&host.to_lowercase())
            .and_then(|h| h.shares.get(&share.to_lowercase()).cloned())
    }
}

/// In-memory transport and server model
///
/// Cloning shares the same server state.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    state: Arc<ServerState>,
}

impl MemoryTransport {
    /// Create an empty server with no hosts
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reachable host that accepts guest sessions
    pub fn add_host(&self, host: &str) {
        lock(&self.state.hosts)
            .entry(host.to_lowercase())
            .or_insert_with(|| MemoryHost {
                users: HashMap::new(),
                shares: HashMap::new(),
                allow_guest: true,
                unreachable: false,
            });
    }

    fn with_host<R>(&self, host: &str, f: impl FnOnce(&mut MemoryHost) -> R) -> Option<R> {
        lock(&self.state.hosts).get_mut(&host.to_lowercase()).map(f)
    }

    /// Register a user; guest sessions stay allowed unless disabled
    pub fn add_user(&self, host: &str, username: &str, password: &str) {
        self.with_host(host, |h| {
            h.users
                .insert(username.to_lowercase(), SecretString::from(password.to_string()))
        });
    }

    /// Accept or reject sessions with an empty user name
    pub fn set_allow_guest(&self, host: &str, allow: bool) {
        self.with_host(host, |h| h.allow_guest = allow);
    }

    /// Make connection attempts to `host` fail at the transport level
    pub fn set_unreachable(&self, host: &str, unreachable: bool) {
        self.with_host(host, |h| h.unreachable = unreachable);
    }

    /// Add an empty share
    pub fn add_share(&self, host: &str, share: &str) {
        self.with_host(host, |h| {
            h.shares
                .entry(share.to_lowercase())
                .or_insert_with(|| Arc::new(Mutex::new(ShareTree::new())));
        });
    }

    /// Limit tree connects on `share` to the listed users
    pub fn restrict_share(&self, host: &str, share: &str, users: &[&str]) {
        if let Some(tree) = self.state.tree(host, share) {
            lock(&tree).allowed_users = Some(users.iter().map(|u| u.to_lowercase()).collect());
        }
    }

    /// Add (or replace) a file, creating parent directories
    pub fn add_file(&self, host: &str, share: &str, path: &str, data: &[u8]) {
        if let Some(tree) = self.state.tree(host, share) {
            lock(&tree).insert_with_parents(&normalize(path), Node::file(data.to_vec()));
        }
    }

    /// Add a directory, creating parent directories
    pub fn add_dir(&self, host: &str, share: &str, path: &str) {
        if let Some(tree) = self.state.tree(host, share) {
            let key = normalize(path);
            let mut tree = lock(&tree);
            if !tree.is_dir(&key) {
                tree.insert_with_parents(&key, Node::directory());
            }
        }
    }

    /// Set extra attributes (e.g. HIDDEN, READONLY) on an existing object
    pub fn set_attributes(&self, host: &str, share: &str, path: &str, attributes: FileAttributes) {
        if let Some(tree) = self.state.tree(host, share) {
            if let Some(node) = lock(&tree).node_mut(&normalize(path)) {
                node.attributes |= attributes;
            }
        }
    }

    /// Make existence checks report `path` as both a file and a directory
    pub fn inject_type_conflict(&self, host: &str, share: &str, path: &str) {
        if let Some(tree) = self.state.tree(host, share) {
            lock(&tree).conflicts.insert(normalize(path));
        }
    }

    /// Content of a file, if it exists
    pub fn read_file(&self, host: &str, share: &str, path: &str) -> Option<Vec<u8>> {
        let tree = self.state.tree(host, share)?;
        let tree = lock(&tree);
        match &tree.node(&normalize(path))?.kind {
            NodeKind::File(data) => Some(data.clone()),
            NodeKind::Directory => None,
        }
    }

    /// Whether anything exists at `path`
    pub fn exists(&self, host: &str, share: &str, path: &str) -> bool {
        self.state
            .tree(host, share)
            .is_some_and(|tree| lock(&tree).node(&normalize(path)).is_some())
    }

    /// Live resource counters
    pub fn counts(&self) -> ResourceCounts {
        let c = &self.state.counters;
        ResourceCounts {
            connections: c.connections.load(Ordering::SeqCst),
            sessions: c.sessions.load(Ordering::SeqCst),
            trees: c.trees.load(Ordering::SeqCst),
            handles: c.handles.load(Ordering::SeqCst),
            connects_total: c.connects_total.load(Ordering::SeqCst),
        }
    }
}

#[async_trait]
impl SmbTransport for MemoryTransport {
    async fn connect(&self, host: &str, _port: u16) -> Result<Box<dyn SmbConnection>> {
        let reachable = self
            .with_host(host, |h| !h.unreachable)
            .unwrap_or(false);
        if !reachable {
            return Err(SmbError::Connection(format!("host unreachable: {}", host)));
        }

        self.state.counters.connects_total.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryConnection {
            state: Arc::clone(&self.state),
            host: host.to_lowercase(),
            tracked: Tracked::open(&self.state.counters.connections),
        }))
    }
}

struct MemoryConnection {
    state: Arc<ServerState>,
    host: String,
    tracked: Tracked,
}

#[async_trait]
impl SmbConnection for MemoryConnection {
    async fn authenticate(&self, auth: &AuthenticationContext) -> Result<Box<dyn SmbSession>> {
        if self.tracked.is_closed() {
            return Err(SmbError::Closed("connection".to_string()));
        }

        let accepted = {
            let hosts = lock(&self.state.hosts);
            let host = hosts
                .get(&self.host)
                .ok_or_else(|| SmbError::Connection(format!("host gone: {}", self.host)))?;
            if auth.is_anonymous() {
                host.allow_guest
            } else {
                host.users
                    .get(&auth.username.to_lowercase())
                    .is_some_and(|expected| auth.password_matches(expected))
            }
        };
        if !accepted {
            return Err(SmbError::Auth(auth.principal()));
        }

        Ok(Box::new(MemorySession {
            state: Arc::clone(&self.state),
            host: self.host.clone(),
            user: auth.username.to_lowercase(),
            tracked: Tracked::open(&self.state.counters.sessions),
        }))
    }

    async fn close(&self) -> Result<()> {
        self.tracked.close(&self.state.counters.connections);
        Ok(())
    }
}

struct MemorySession {
    state: Arc<ServerState>,
    host: String,
    user: String,
    tracked: Tracked,
}

#[async_trait]
impl SmbSession for MemorySession {
    async fn connect_share(&self, share: &str) -> Result<Arc<dyn DiskShare>> {
        if self.tracked.is_closed() {
            return Err(SmbError::Closed("session".to_string()));
        }

        let tree = self
            .state
            .tree(&self.host, share)
            .ok_or_else(|| SmbError::ShareNotFound(share.to_string()))?;
        let allowed = match &lock(&tree).allowed_users {
            Some(users) => users.contains(&self.user),
            None => true,
        };
        if !allowed {
            return Err(SmbError::Permission(format!("{} on {}", self.user, share)));
        }

        Ok(Arc::new(MemoryShare {
            state: Arc::clone(&self.state),
            tree,
            tracked: Tracked::open(&self.state.counters.trees),
        }))
    }

    async fn logoff(&self) -> Result<()> {
        self.tracked.close(&self.state.counters.sessions);
        Ok(())
    }
}

struct MemoryShare {
    state: Arc<ServerState>,
    tree: Arc<Mutex<ShareTree>>,
    tracked: Tracked,
}

impl MemoryShare {
    fn check_open(&self) -> Result<()> {
        if self.tracked.is_closed() {
            return Err(SmbError::Closed("tree".to_string()));
        }
        Ok(())
    }

    fn open_handle(&self, path: &str, args: &OpenArgs, want_dir: bool) -> Result<Arc<MemoryHandle>> {
        self.check_open()?;
        let key = normalize(path);
        lock(&self.tree).open(&key, args, want_dir)?;

        Ok(Arc::new(MemoryHandle {
            state: Arc::clone(&self.state),
            tree: Arc::clone(&self.tree),
            path: Mutex::new(key),
            access: args.access,
            tracked: Tracked::open(&self.state.counters.handles),
        }))
    }
}

#[async_trait]
impl DiskShare for MemoryShare {
    async fn file_exists(&self, path: &str) -> Result<bool> {
        self.check_open()?;
        let key = normalize(path);
        let tree = lock(&self.tree);
        Ok(tree.conflicts.contains(&key) || tree.node(&key).is_some_and(|n| !n.is_dir()))
    }

    async fn folder_exists(&self, path: &str) -> Result<bool> {
        self.check_open()?;
        let key = normalize(path);
        let tree = lock(&self.tree);
        Ok(tree.conflicts.contains(&key) || tree.is_dir(&key))
    }

    async fn open_file(&self, path: &str, args: &OpenArgs) -> Result<Arc<dyn RemoteFile>> {
        Ok(self.open_handle(path, args, false)?)
    }

    async fn open_directory(
        &self,
        path: &str,
        args: &OpenArgs,
    ) -> Result<Arc<dyn RemoteDirectory>> {
        Ok(self.open_handle(path, args, true)?)
    }

    async fn list(&self, path: &str) -> Result<Vec<DirectoryEntry>> {
        self.check_open()?;
        lock(&self.tree).listing(&normalize(path), path)
    }

    async fn rm(&self, path: &str) -> Result<()> {
        self.check_open()?;
        let key = normalize(path);
        let mut tree = lock(&self.tree);
        match tree.node(&key) {
            None => Err(SmbError::NotFound(path.to_string())),
            Some(node) if node.is_dir() => Err(SmbError::FileIsADirectory(path.to_string())),
            Some(node) if node.attributes.contains(FileAttributes::READONLY) => {
                Err(SmbError::Permission(path.to_string()))
            }
            Some(_) => {
                tree.nodes.remove(&key);
                Ok(())
            }
        }
    }

    async fn rmdir(&self, path: &str) -> Result<()> {
        self.check_open()?;
        let key = normalize(path);
        if key.is_empty() {
            return Err(SmbError::Permission("cannot remove the share root".to_string()));
        }
        let mut tree = lock(&self.tree);
        match tree.node(&key) {
            None => Err(SmbError::NotFound(path.to_string())),
            Some(node) if !node.is_dir() => Err(SmbError::NotADirectory(path.to_string())),
            Some(_) if tree.children(&key).next().is_some() => {
                Err(SmbError::DirectoryNotEmpty(path.to_string()))
            }
            Some(_) => {
                tree.nodes.remove(&key);
                Ok(())
            }
        }
    }

    async fn disconnect(&self) -> Result<()> {
        self.tracked.close(&self.state.counters.trees);
        Ok(())
    }
}

/// Open handle on a file or directory node
struct MemoryHandle {
    state: Arc<ServerState>,
    tree: Arc<Mutex<ShareTree>>,
    path: Mutex<String>,
    access: AccessMask,
    tracked: Tracked,
}

impl MemoryHandle {
    fn key(&self) -> Result<String> {
        if self.tracked.is_closed() {
            return Err(SmbError::Closed(lock(&self.path).clone()));
        }
        Ok(lock(&self.path).clone())
    }

    fn require(&self, granted: bool, key: &str) -> Result<()> {
        if granted {
            Ok(())
        } else {
            Err(SmbError::Permission(format!("access denied on handle for {}", key)))
        }
    }
}

#[async_trait]
impl RemoteHandle for MemoryHandle {
    fn path(&self) -> String {
        lock(&self.path).clone()
    }

    async fn query_info(&self) -> Result<FileInformation> {
        let key = self.key()?;
        self.require(self.access.can_read_attributes(), &key)?;
        lock(&self.tree)
            .node(&key)
            .map(Node::info)
            .ok_or(SmbError::NotFound(key))
    }

    async fn set_basic_info(&self, info: &FileBasicInformation) -> Result<()> {
        let key = self.key()?;
        self.require(self.access.can_write_attributes(), &key)?;
        let mut tree = lock(&self.tree);
        let node = tree
            .node_mut(&key)
            .ok_or_else(|| SmbError::NotFound(key.clone()))?;
        if let Some(t) = info.creation_time {
            node.created = t;
        }
        if let Some(t) = info.last_access_time {
            node.accessed = t;
        }
        if let Some(t) = info.last_write_time {
            node.modified = t;
        }
        if let Some(t) = info.change_time {
            node.changed = t;
        }
        if let Some(attributes) = info.attributes {
            let keep_dir = node.attributes & FileAttributes::DIRECTORY;
            node.attributes = (attributes - FileAttributes::NORMAL) | keep_dir;
        }
        Ok(())
    }

    async fn rename(&self, new_path: &str, replace_if_exists: bool) -> Result<()> {
        let key = self.key()?;
        self.require(self.access.can_delete(), &key)?;
        let target = normalize(new_path);
        lock(&self.tree).rename(&key, &target, replace_if_exists)?;
        *lock(&self.path) = target;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.tracked.close(&self.state.counters.handles);
        Ok(())
    }
}

#[async_trait]
impl RemoteFile for MemoryHandle {
    async fn read_at(&self, offset: u64, len: usize) -> Result<Bytes> {
        let key = self.key()?;
        self.require(self.access.can_read_data(), &key)?;
        let tree = lock(&self.tree);
        match tree.node(&key).map(|n| &n.kind) {
            Some(NodeKind::File(data)) => {
                let start = usize::try_from(offset).unwrap_or(usize::MAX).min(data.len());
                let end = start.saturating_add(len).min(data.len());
                Ok(Bytes::copy_from_slice(&data[start..end]))
            }
            Some(NodeKind::Directory) => Err(SmbError::FileIsADirectory(key)),
            None => Err(SmbError::NotFound(key)),
        }
    }

    async fn write_at(&self, offset: u64, data: Bytes) -> Result<usize> {
        let key = self.key()?;
        self.require(self.access.can_write_data(), &key)?;
        let offset = usize::try_from(offset)
            .map_err(|_| SmbError::InvalidPath(format!("offset out of range for {}", key)))?;
        let mut tree = lock(&self.tree);
        let node = tree
            .node_mut(&key)
            .ok_or_else(|| SmbError::NotFound(key.clone()))?;
        match &mut node.kind {
            NodeKind::File(content) => {
                let end = offset + data.len();
                if content.len() < end {
                    content.resize(end, 0);
                }
                content[offset..end].copy_from_slice(&data);
                node.touch();
                Ok(data.len())
            }
            NodeKind::Directory => Err(SmbError::FileIsADirectory(key)),
        }
    }
}

#[async_trait]
impl RemoteDirectory for MemoryHandle {
    async fn list(&self) -> Result<Vec<DirectoryEntry>> {
        let key = self.key()?;
        self.require(self.access.can_read_data() || self.access.can_read_attributes(), &key)?;
        lock(&self.tree).listing(&key, &key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_share() -> (MemoryTransport, Arc<dyn DiskShare>) {
        let transport = MemoryTransport::new();
        transport.add_host("server");
        transport.add_share("server", "data");
        transport.add_file("server", "data", "docs/a.txt", b"alpha");
        transport.add_dir("server", "data", "docs/empty");
        let tree = transport.state.tree("server", "data").unwrap();
        let share: Arc<dyn DiskShare> = Arc::new(MemoryShare {
            state: Arc::clone(&transport.state),
            tree,
            tracked: Tracked::open(&transport.state.counters.trees),
        });
        (transport, share)
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("/docs//a.txt"), "docs\\a.txt");
        assert_eq!(normalize("docs\\sub\\"), "docs\\sub");
        assert_eq!(normalize(""), "");
        assert_eq!(parent_of("docs\\a.txt"), "docs");
        assert_eq!(parent_of("a.txt"), "");
        assert_eq!(base_name("docs\\a.txt"), "a.txt");
    }

    #[tokio::test]
    async fn test_existence_checks() {
        let (_transport, share) = create_test_share();
        assert!(share.file_exists("docs\\a.txt").await.unwrap());
        assert!(!share.folder_exists("docs\\a.txt").await.unwrap());
        assert!(share.folder_exists("docs").await.unwrap());
        assert!(share.folder_exists("").await.unwrap());
        assert!(!share.file_exists("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_listing_includes_pseudo_entries() {
        let (_transport, share) = create_test_share();
        let names: Vec<String> = share
            .list("docs")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.file_name)
            .collect();
        assert_eq!(names, vec![".", "..", "a.txt", "empty"]);

        let err = share.list("docs\\a.txt").await.unwrap_err();
        assert!(matches!(err, SmbError::NotADirectory(_)));
    }

    #[tokio::test]
    async fn test_create_disposition_collision() {
        let (transport, share) = create_test_share();
        let args = OpenArgs::new(AccessMask::FILE_WRITE_DATA, CreateDisposition::Create).file();
        let collision = share.open_file("docs\\a.txt", &args).await;
        assert!(matches!(collision, Err(SmbError::ObjectNameCollision(_))));

        let handle = share.open_file("docs\\b.txt", &args).await.unwrap();
        assert_eq!(transport.counts().handles, 1);
        handle.write_at(0, Bytes::from_static(b"beta")).await.unwrap();
        handle.close().await.unwrap();
        handle.close().await.unwrap();
        assert_eq!(transport.counts().handles, 0);
        assert_eq!(transport.read_file("server", "data", "docs/b.txt"), Some(b"beta".to_vec()));
    }

    #[tokio::test]
    async fn test_access_mask_enforced() {
        let (_transport, share) = create_test_share();
        let handle = share
            .open_file("docs\\a.txt", &OpenArgs::open_existing(AccessMask::FILE_READ_DATA))
            .await
            .unwrap();
        let err = handle.write_at(0, Bytes::from_static(b"x")).await.unwrap_err();
        assert!(err.is_permission_error());
        assert_eq!(&handle.read_at(1, 3).await.unwrap()[..], b"lph");
        assert!(handle.read_at(10, 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rename_moves_directory_tree() {
        let (transport, share) = create_test_share();
        let dir = share
            .open_directory("docs", &OpenArgs::open_existing(AccessMask::DELETE).directory())
            .await
            .unwrap();
        dir.rename("archive", false).await.unwrap();
        assert_eq!(dir.path(), "archive");
        assert_eq!(
            transport.read_file("server", "data", "archive/a.txt"),
            Some(b"alpha".to_vec())
        );
        assert!(!transport.exists("server", "data", "docs"));
    }

    #[tokio::test]
    async fn test_rmdir_requires_empty() {
        let (_transport, share) = create_test_share();
        let err = share.rmdir("docs").await.unwrap_err();
        assert!(matches!(err, SmbError::DirectoryNotEmpty(_)));
        share.rmdir("docs\\empty").await.unwrap();
        assert!(!share.folder_exists("docs\\empty").await.unwrap());
    }
}
