//! Namespace entry types and data structures
//!
//! These types represent what the metadata service returns for listings,
//! attribute fetches and filesystem info.

/// Filesystem id (0 is never a valid id)
pub type FsId = u32;

/// Inode number
pub type InodeId = u64;

/// Inode of the namespace root
pub const ROOT_INODE_ID: InodeId = 1;

/// Namespace-generation token pinned for the whole walk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Epoch(pub u64);

impl Epoch {
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Epoch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Type of namespace entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryType {
    /// Regular file (anything that is not a directory)
    File,
    /// Directory
    Directory,
}

impl EntryType {
    /// Check if this is a regular file
    pub fn is_file(&self) -> bool {
        *self == EntryType::File
    }

    /// Check if this is a directory
    pub fn is_dir(&self) -> bool {
        *self == EntryType::Directory
    }
}

/// One child of a listed directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceEntry {
    /// Entry name (not full path)
    pub name: String,

    /// Inode the entry points at
    pub inode: InodeId,

    /// Inode of the directory holding the entry
    pub parent: InodeId,

    /// Entry type
    pub entry_type: EntryType,
}

impl NamespaceEntry {
    pub fn is_dir(&self) -> bool {
        self.entry_type.is_dir()
    }
}

/// Attributes of a file or directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InodeAttr {
    /// Inode number
    pub inode: InodeId,

    /// Length in bytes
    pub length: u64,

    /// Number of hard links
    pub nlink: u32,

    /// Entry type
    pub entry_type: EntryType,

    /// Directories linking to this inode (first one is the primary parent)
    pub parents: Vec<InodeId>,
}

impl InodeAttr {
    /// A file with more than one name
    pub fn is_hardlinked(&self) -> bool {
        self.entry_type.is_file() && self.nlink >= 2
    }
}

/// Filesystem info served by the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsInfo {
    pub fs_id: FsId,
    pub fs_name: String,
    pub epoch: Epoch,
}

/// Directory the walker is about to process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirNode {
    /// Inode of the directory
    pub inode: InodeId,

    /// Inode of its parent
    pub parent: InodeId,

    /// Name under the parent
    pub name: String,
}

impl DirNode {
    pub fn new(inode: InodeId, parent: InodeId, name: impl Into<String>) -> Self {
        Self {
            inode,
            parent,
            name: name.into(),
        }
    }

    /// Build from a listed directory entry
    pub fn from_entry(entry: &NamespaceEntry) -> Self {
        Self {
            inode: entry.inode,
            parent: entry.parent,
            name: entry.name.clone(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.inode == ROOT_INODE_ID
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hardlinked() {
        let mut attr = InodeAttr {
            inode: 10,
            length: 4096,
            nlink: 1,
            entry_type: EntryType::File,
            parents: vec![ROOT_INODE_ID],
        };
        assert!(!attr.is_hardlinked());

        attr.nlink = 2;
        assert!(attr.is_hardlinked());

        // Directories carry nlink >= 2 from "." and ".."
        attr.entry_type = EntryType::Directory;
        assert!(!attr.is_hardlinked());
    }

    #[test]
    fn test_dir_node_from_entry() {
        let entry = NamespaceEntry {
            name: "logs".into(),
            inode: 42,
            parent: 7,
            entry_type: EntryType::Directory,
        };
        let node = DirNode::from_entry(&entry);
        assert_eq!(node, DirNode::new(42, 7, "logs"));
        assert!(!node.is_root());
        assert!(DirNode::new(ROOT_INODE_ID, 0, "/").is_root());
    }
}
