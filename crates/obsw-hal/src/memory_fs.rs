//! In-memory [`FileSystem`] implementation.
//!
//! Backs host-side tests of the persistence layers and doubles as the
//! reference for the semantics a flight file system must provide:
//! operations on an unmounted file system fail with `NotMounted`, writes
//! on a read-only mount with `ReadOnly`, and `CREATE` requires an existing
//! parent directory.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use obsw_base::GpsTime;

use crate::file_system::{
    DirHandle, FileHandle, FileKind, FileSystem, FsError, FsResult, Info, OpenMask, Permission,
    SeekMode, MAX_PATH_LENGTH,
};

#[derive(Debug, Clone)]
enum NodeData {
    File(Vec<u8>),
    Directory,
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    permission: Permission,
    created: GpsTime,
    modified: GpsTime,
}

#[derive(Debug)]
struct OpenFile {
    path: String,
    mask: OpenMask,
    position: u64,
}

#[derive(Debug)]
struct OpenDir {
    path: String,
    cursor: usize,
}

pub struct MemoryFileSystem {
    mounted: bool,
    read_only: bool,
    /// Nodes keyed by normalized absolute path; the root "/" always
    /// exists.
    nodes: BTreeMap<String, Node>,
    files: HashMap<u64, OpenFile>,
    dirs: HashMap<u64, OpenDir>,
    next_handle: u64,
    /// Fake clock advanced by every mutating operation.
    now: GpsTime,
}

fn normalize(path: &str) -> FsResult<String> {
    if path.is_empty() || path.len() > MAX_PATH_LENGTH || !path.starts_with('/') {
        return Err(FsError::InvalidInput);
    }
    if path == "/" {
        return Ok("/".to_string());
    }
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty()
        || trimmed.split('/').skip(1).any(|part| part.is_empty() || part == "." || part == "..")
    {
        return Err(FsError::InvalidInput);
    }
    Ok(trimmed.to_string())
}

fn parent_of(path: &str) -> String {
    match path.rfind('/') {
        Some(0) => "/".to_string(),
        Some(index) => path[..index].to_string(),
        None => "/".to_string(),
    }
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            "/".to_string(),
            Node {
                data: NodeData::Directory,
                permission: Permission::RWX,
                created: GpsTime::default(),
                modified: GpsTime::default(),
            },
        );
        Self {
            mounted: false,
            read_only: false,
            nodes,
            files: HashMap::new(),
            dirs: HashMap::new(),
            next_handle: 1,
            now: GpsTime::default(),
        }
    }

    fn tick(&mut self) -> GpsTime {
        self.now = self.now + Duration::from_millis(1);
        self.now
    }

    fn check_mounted(&self) -> FsResult<()> {
        if self.mounted { Ok(()) } else { Err(FsError::NotMounted) }
    }

    fn check_writable(&self) -> FsResult<()> {
        self.check_mounted()?;
        if self.read_only { Err(FsError::ReadOnly) } else { Ok(()) }
    }

    fn node(&self, path: &str) -> FsResult<&Node> {
        self.nodes.get(path).ok_or(FsError::NotFound)
    }

    fn require_parent_dir(&self, path: &str) -> FsResult<()> {
        let parent = parent_of(path);
        match self.nodes.get(&parent) {
            Some(Node { data: NodeData::Directory, .. }) => Ok(()),
            Some(_) => Err(FsError::NotADirectory),
            None => Err(FsError::NotFound),
        }
    }

    fn is_open(&self, path: &str) -> bool {
        self.files.values().any(|open| open.path == path)
    }

    fn children_of(&self, path: &str) -> Vec<String> {
        let prefix = if path == "/" { "/".to_string() } else { format!("{path}/") };
        self.nodes
            .keys()
            .filter(|candidate| {
                candidate.starts_with(&prefix)
                    && candidate.len() > prefix.len()
                    && !candidate[prefix.len()..].contains('/')
            })
            .map(|candidate| candidate[prefix.len()..].to_string())
            .collect()
    }

    fn allocate_handle(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }
}

impl Default for MemoryFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for MemoryFileSystem {
    fn is_mounted(&self) -> bool {
        self.mounted
    }

    fn mount(&mut self, read_only: bool) -> FsResult<()> {
        if self.mounted {
            return Err(FsError::InvalidState);
        }
        self.mounted = true;
        self.read_only = read_only;
        Ok(())
    }

    fn unmount(&mut self) -> FsResult<()> {
        self.check_mounted()?;
        if !self.files.is_empty() || !self.dirs.is_empty() {
            return Err(FsError::FileInUse);
        }
        self.mounted = false;
        Ok(())
    }

    fn mkdir(&mut self, path: &str, permission: Permission) -> FsResult<()> {
        self.check_writable()?;
        let path = normalize(path)?;
        if self.nodes.contains_key(&path) {
            return Err(FsError::AlreadyExists);
        }
        self.require_parent_dir(&path)?;
        let now = self.tick();
        self.nodes.insert(
            path,
            Node { data: NodeData::Directory, permission, created: now, modified: now },
        );
        Ok(())
    }

    fn create_file(&mut self, path: &str, permission: Permission) -> FsResult<()> {
        self.check_writable()?;
        let path = normalize(path)?;
        if self.nodes.contains_key(&path) {
            return Err(FsError::AlreadyExists);
        }
        self.require_parent_dir(&path)?;
        let now = self.tick();
        self.nodes.insert(
            path,
            Node { data: NodeData::File(Vec::new()), permission, created: now, modified: now },
        );
        Ok(())
    }

    fn open(&mut self, path: &str, mask: OpenMask) -> FsResult<FileHandle> {
        self.check_mounted()?;
        let path = normalize(path)?;

        let wants_write = mask.is_set(OpenMask::WRITE) || mask.is_set(OpenMask::APPEND);
        if (wants_write || mask.is_set(OpenMask::CREATE)) && self.read_only {
            return Err(FsError::ReadOnly);
        }

        match self.nodes.get(&path) {
            Some(Node { data: NodeData::Directory, .. }) => return Err(FsError::NotAFile),
            Some(Node { permission, .. }) => {
                if mask.is_set(OpenMask::READ) && !permission.is_readable() {
                    return Err(FsError::AccessDenied);
                }
                if wants_write && !permission.is_writable() {
                    return Err(FsError::AccessDenied);
                }
                if mask.is_set(OpenMask::EXECUTE) && !permission.is_executable() {
                    return Err(FsError::AccessDenied);
                }
            }
            None => {
                if !mask.is_set(OpenMask::CREATE) {
                    return Err(FsError::NotFound);
                }
                self.require_parent_dir(&path)?;
                let now = self.tick();
                self.nodes.insert(
                    path.clone(),
                    Node {
                        data: NodeData::File(Vec::new()),
                        permission: Permission::RW,
                        created: now,
                        modified: now,
                    },
                );
            }
        }

        let position = if mask.is_set(OpenMask::APPEND) {
            match &self.node(&path)?.data {
                NodeData::File(data) => data.len() as u64,
                NodeData::Directory => unreachable!("directories rejected above"),
            }
        } else {
            0
        };

        let handle = self.allocate_handle();
        self.files.insert(handle, OpenFile { path, mask, position });
        Ok(FileHandle(handle))
    }

    fn close(&mut self, file: FileHandle) -> FsResult<()> {
        self.files.remove(&file.0).map(|_| ()).ok_or(FsError::InvalidInput)
    }

    fn read(&mut self, file: &FileHandle, dst: &mut [u8]) -> FsResult<usize> {
        self.check_mounted()?;
        let open = self.files.get_mut(&file.0).ok_or(FsError::InvalidInput)?;
        if !open.mask.is_set(OpenMask::READ) {
            return Err(FsError::WriteOnly);
        }
        let node = self.nodes.get(&open.path).ok_or(FsError::NotFound)?;
        let NodeData::File(data) = &node.data else {
            return Err(FsError::NotAFile);
        };

        let position = open.position as usize;
        if position >= data.len() {
            return Err(FsError::EndOfData);
        }
        let n = dst.len().min(data.len() - position);
        dst[..n].copy_from_slice(&data[position..position + n]);
        open.position += n as u64;
        Ok(n)
    }

    fn write(&mut self, file: &FileHandle, src: &[u8]) -> FsResult<usize> {
        self.check_writable()?;
        let open = self.files.get_mut(&file.0).ok_or(FsError::InvalidInput)?;
        if !open.mask.is_set(OpenMask::WRITE) && !open.mask.is_set(OpenMask::APPEND) {
            return Err(FsError::ReadOnly);
        }
        let path = open.path.clone();
        let position = open.position as usize;
        open.position += src.len() as u64;

        let now = self.tick();
        let node = self.nodes.get_mut(&path).ok_or(FsError::NotFound)?;
        let NodeData::File(data) = &mut node.data else {
            return Err(FsError::NotAFile);
        };
        if position + src.len() > data.len() {
            data.resize(position + src.len(), 0);
        }
        data[position..position + src.len()].copy_from_slice(src);
        node.modified = now;
        Ok(src.len())
    }

    fn seek(&mut self, file: &FileHandle, diff: i64, mode: SeekMode) -> FsResult<u64> {
        self.check_mounted()?;
        let open = self.files.get_mut(&file.0).ok_or(FsError::InvalidInput)?;
        let node = self.nodes.get(&open.path).ok_or(FsError::NotFound)?;
        let NodeData::File(data) = &node.data else {
            return Err(FsError::NotAFile);
        };

        let base = match mode {
            SeekMode::Set => 0i64,
            SeekMode::Current => open.position as i64,
            SeekMode::End => data.len() as i64,
        };
        let target = base.checked_add(diff).ok_or(FsError::InvalidInput)?;
        if target < 0 {
            return Err(FsError::InvalidInput);
        }
        open.position = target as u64;
        Ok(open.position)
    }

    fn flush(&mut self, file: &FileHandle) -> FsResult<()> {
        self.check_mounted()?;
        if self.files.contains_key(&file.0) {
            Ok(())
        } else {
            Err(FsError::InvalidInput)
        }
    }

    fn truncate(&mut self, path: &str, length: u64) -> FsResult<()> {
        self.check_writable()?;
        let path = normalize(path)?;
        let now = self.tick();
        let node = self.nodes.get_mut(&path).ok_or(FsError::NotFound)?;
        let NodeData::File(data) = &mut node.data else {
            return Err(FsError::NotAFile);
        };
        if length as usize > data.len() {
            return Err(FsError::InvalidInput);
        }
        data.truncate(length as usize);
        node.modified = now;
        Ok(())
    }

    fn rename(&mut self, source: &str, target: &str) -> FsResult<()> {
        self.check_writable()?;
        let source = normalize(source)?;
        let target = normalize(target)?;
        if self.is_open(&source) {
            return Err(FsError::FileInUse);
        }
        if self.nodes.contains_key(&target) {
            return Err(FsError::AlreadyExists);
        }
        self.require_parent_dir(&target)?;
        let node = self.nodes.remove(&source).ok_or(FsError::NotFound)?;
        if matches!(node.data, NodeData::Directory) && !self.children_of(&source).is_empty() {
            // keep it simple: only empty directories can be moved
            self.nodes.insert(source, node);
            return Err(FsError::NotEmpty);
        }
        self.nodes.insert(target, node);
        Ok(())
    }

    fn copy(&mut self, source: &str, target: &str) -> FsResult<()> {
        self.check_writable()?;
        let source = normalize(source)?;
        let target = normalize(target)?;
        if self.nodes.contains_key(&target) {
            return Err(FsError::AlreadyExists);
        }
        self.require_parent_dir(&target)?;
        let node = self.node(&source)?;
        if !matches!(node.data, NodeData::File(_)) {
            return Err(FsError::NotAFile);
        }
        let mut copy = node.clone();
        let now = self.tick();
        copy.created = now;
        copy.modified = now;
        self.nodes.insert(target, copy);
        Ok(())
    }

    fn chmod(&mut self, path: &str, permission: Permission) -> FsResult<()> {
        self.check_writable()?;
        let path = normalize(path)?;
        let node = self.nodes.get_mut(&path).ok_or(FsError::NotFound)?;
        node.permission = permission;
        Ok(())
    }

    fn remove(&mut self, path: &str) -> FsResult<()> {
        self.check_writable()?;
        let path = normalize(path)?;
        if path == "/" {
            return Err(FsError::AccessDenied);
        }
        if self.is_open(&path) {
            return Err(FsError::FileInUse);
        }
        let node = self.node(&path)?;
        if matches!(node.data, NodeData::Directory) && !self.children_of(&path).is_empty() {
            return Err(FsError::NotEmpty);
        }
        self.nodes.remove(&path);
        Ok(())
    }

    fn open_dir(&mut self, path: &str) -> FsResult<DirHandle> {
        self.check_mounted()?;
        let path = normalize(path)?;
        match self.node(&path)?.data {
            NodeData::Directory => {}
            NodeData::File(_) => return Err(FsError::NotADirectory),
        }
        let handle = self.allocate_handle();
        self.dirs.insert(handle, OpenDir { path, cursor: 0 });
        Ok(DirHandle(handle))
    }

    fn read_dir(&mut self, dir: &DirHandle) -> FsResult<String> {
        self.check_mounted()?;
        let open = self.dirs.get(&dir.0).ok_or(FsError::InvalidInput)?;
        let children = self.children_of(&open.path);
        let cursor = open.cursor;
        if cursor >= children.len() {
            return Err(FsError::EndOfData);
        }
        self.dirs.get_mut(&dir.0).expect("checked above").cursor += 1;
        Ok(children[cursor].clone())
    }

    fn rewind_dir(&mut self, dir: &DirHandle) -> FsResult<()> {
        self.check_mounted()?;
        self.dirs
            .get_mut(&dir.0)
            .map(|open| open.cursor = 0)
            .ok_or(FsError::InvalidInput)
    }

    fn close_dir(&mut self, dir: DirHandle) -> FsResult<()> {
        self.dirs.remove(&dir.0).map(|_| ()).ok_or(FsError::InvalidInput)
    }

    fn get_info(&self, path: &str) -> FsResult<Info> {
        self.check_mounted()?;
        let path = normalize(path)?;
        let node = self.node(&path)?;
        Ok(Info {
            kind: match node.data {
                NodeData::File(_) => FileKind::File,
                NodeData::Directory => FileKind::Directory,
            },
            size: match &node.data {
                NodeData::File(data) => data.len() as u64,
                NodeData::Directory => 0,
            },
            permission: node.permission,
            creation_time: node.created,
            modify_time: node.modified,
        })
    }
}
