//! Socket ownership from the process descriptor directory
//!
//! Every open descriptor of a process appears in `/proc/self/fd` as a
//! symbolic link. Socket descriptors link to `socket:[<inode>]`; the inodes
//! collected from those links are the sockets this process owns.

use crate::parse::parse_decimal;
use queue_probe_common::constants::{SOCKET_LINK_PREFIX, SOCKET_LINK_SUFFIX};
use std::{
    collections::HashSet,
    ffi::OsStr,
    fs, io,
    os::unix::ffi::OsStrExt,
    path::PathBuf,
};

/// Source of descriptor link targets
pub trait DescriptorDirectory {
    /// Visit the target of every symbolic link in the directory
    ///
    /// Entries that are not links, or that vanish before they can be
    /// resolved, are not visited.
    fn visit_links(&mut self, visit: &mut dyn FnMut(&OsStr)) -> io::Result<()>;
}

/// Descriptor directory on disk, normally `/proc/self/fd`
pub struct FdDirectory {
    path: PathBuf,
}

impl FdDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DescriptorDirectory for FdDirectory {
    fn visit_links(&mut self, visit: &mut dyn FnMut(&OsStr)) -> io::Result<()> {
        for entry in fs::read_dir(&self.path)? {
            // A descriptor closed mid-scan is not an error
            let Ok(entry) = entry else { continue };
            match entry.file_type() {
                Ok(file_type) if file_type.is_symlink() => {}
                _ => continue,
            }
            if let Ok(target) = fs::read_link(entry.path()) {
                visit(target.as_os_str());
            }
        }
        Ok(())
    }
}

/// Inode named by a socket link target, if it is one
pub fn socket_inode(target: &[u8]) -> Option<u64> {
    let digits = target
        .strip_prefix(SOCKET_LINK_PREFIX)?
        .strip_suffix(&[SOCKET_LINK_SUFFIX])?;
    parse_decimal(digits)
}

/// Replace the contents of `owned` with the socket inodes in `directory`
pub fn refresh_owned_inodes<D: DescriptorDirectory + ?Sized>(
    directory: &mut D,
    owned: &mut HashSet<u64>,
) -> io::Result<()> {
    owned.clear();
    directory.visit_links(&mut |target| {
        if let Some(inode) = socket_inode(target.as_bytes()) {
            owned.insert(inode);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;

    #[test]
    fn test_socket_inode() {
        assert_eq!(socket_inode(b"socket:[16107]"), Some(16_107));
        assert_eq!(socket_inode(b"socket:[]"), None);
        assert_eq!(socket_inode(b"socket:[12"), None);
        assert_eq!(socket_inode(b"pipe:[16107]"), None);
        assert_eq!(socket_inode(b"/dev/null"), None);
        assert_eq!(socket_inode(b"anon_inode:[eventpoll]"), None);
    }

    #[test]
    fn test_refresh_keeps_only_socket_links() {
        let dir = tempfile::tempdir().unwrap();
        symlink("socket:[5]", dir.path().join("0")).unwrap();
        symlink("socket:[7]", dir.path().join("1")).unwrap();
        symlink("pipe:[11]", dir.path().join("2")).unwrap();
        fs::write(dir.path().join("3"), b"regular file").unwrap();
        symlink("/tmp/queue-probe.log", dir.path().join("4")).unwrap();

        let mut directory = FdDirectory::new(dir.path());
        let mut owned = HashSet::new();
        refresh_owned_inodes(&mut directory, &mut owned).unwrap();

        assert_eq!(owned, HashSet::from([5, 7]));
    }

    #[test]
    fn test_refresh_replaces_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        symlink("socket:[9]", dir.path().join("6")).unwrap();

        let mut directory = FdDirectory::new(dir.path());
        let mut owned = HashSet::from([1, 2, 3]);
        refresh_owned_inodes(&mut directory, &mut owned).unwrap();

        assert_eq!(owned, HashSet::from([9]));
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut directory = FdDirectory::new(dir.path().join("fd"));
        let mut owned = HashSet::from([1]);

        assert!(refresh_owned_inodes(&mut directory, &mut owned).is_err());
        assert!(owned.is_empty());
    }

    #[test]
    fn test_own_process_sockets_are_found() {
        let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let mut directory = FdDirectory::new("/proc/self/fd");
        let mut owned = HashSet::new();
        refresh_owned_inodes(&mut directory, &mut owned).unwrap();

        assert!(!owned.is_empty());
        drop(socket);
    }
}
