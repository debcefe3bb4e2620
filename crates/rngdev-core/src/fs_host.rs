//! Filesystem-backed host.
//!
//! Lays a device registration out under a root directory:
//!
//! - `majors/<n>` — one file per claimed major, holding the owner's name
//! - `class/<class>/` — the class; each node adds `class/<class>/<node>/dev`
//!   with `major:minor`, as sysfs does
//! - `dev/<node>` — a FIFO that callers open and read
//!
//! Claims use `create_new`, so two processes sharing a root never get the
//! same major.

use std::ffi::CString;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use crate::host::{DYNAMIC_MAJOR_END, DYNAMIC_MAJOR_START, DeviceNumber, Host, HostResult};

/// Default root used by `rngdev serve`.
pub const DEFAULT_ROOT: &str = "/tmp/rngdev";

fn status(e: &std::io::Error) -> i32 {
    -e.raw_os_error().unwrap_or(libc::EIO)
}

#[derive(Debug)]
pub struct FsClass {
    path: PathBuf,
}

impl FsClass {
    /// Directory that holds the class and its node attributes.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Debug)]
pub struct FsNode {
    path: PathBuf,
    attr_dir: PathBuf,
}

impl FsNode {
    /// Path callers open to read from the device.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Debug, Clone)]
pub struct FsHost {
    root: PathBuf,
}

impl FsHost {
    /// Host rooted at `root`; subdirectories are created on first use.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn majors_dir(&self) -> PathBuf {
        self.root.join("majors")
    }

    fn class_dir(&self) -> PathBuf {
        self.root.join("class")
    }

    fn dev_dir(&self) -> PathBuf {
        self.root.join("dev")
    }
}

/// Class and node names become single path components under the root.
fn check_name(name: &str) -> HostResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\0']) {
        log::warn!("fs host: rejecting name {name:?}");
        return Err(-libc::EINVAL);
    }
    Ok(())
}

fn mkfifo(path: &Path, mode: libc::mode_t) -> HostResult<()> {
    let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|_| -libc::EINVAL)?;
    // SAFETY: c_path is a valid NUL-terminated CString.
    let ret = unsafe { libc::mkfifo(c_path.as_ptr(), mode) };
    if ret != 0 {
        return Err(status(&std::io::Error::last_os_error()));
    }
    Ok(())
}

impl Host for FsHost {
    type Class = FsClass;
    type Node = FsNode;

    fn register_major(&self, name: &str) -> HostResult<u32> {
        let dir = self.majors_dir();
        fs::create_dir_all(&dir).map_err(|e| status(&e))?;
        for major in (DYNAMIC_MAJOR_START..=DYNAMIC_MAJOR_END).rev() {
            let claim = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(dir.join(major.to_string()));
            match claim {
                Ok(mut f) => {
                    if let Err(e) = writeln!(f, "{name}") {
                        let _ = fs::remove_file(dir.join(major.to_string()));
                        return Err(status(&e));
                    }
                    return Ok(major);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(status(&e)),
            }
        }
        Err(-libc::EBUSY)
    }

    fn unregister_major(&self, major: u32, name: &str) {
        let path = self.majors_dir().join(major.to_string());
        match fs::read_to_string(&path) {
            Ok(owner) if owner.trim_end() == name => {
                if let Err(e) = fs::remove_file(&path) {
                    log::warn!("fs host: could not release major {major}: {e}");
                }
            }
            Ok(_) => log::warn!("fs host: major {major} is not held by {name}"),
            Err(e) => log::warn!("fs host: could not read claim for major {major}: {e}"),
        }
    }

    fn create_class(&self, name: &str) -> HostResult<FsClass> {
        check_name(name)?;
        let parent = self.class_dir();
        fs::create_dir_all(&parent).map_err(|e| status(&e))?;
        let path = parent.join(name);
        fs::create_dir(&path).map_err(|e| status(&e))?;
        Ok(FsClass { path })
    }

    fn destroy_class(&self, class: FsClass) {
        if let Err(e) = fs::remove_dir_all(&class.path) {
            log::warn!("fs host: could not remove {}: {e}", class.path.display());
        }
    }

    fn create_node(
        &self,
        class: &FsClass,
        number: DeviceNumber,
        name: &str,
    ) -> HostResult<FsNode> {
        check_name(name)?;
        let dev = self.dev_dir();
        fs::create_dir_all(&dev).map_err(|e| status(&e))?;
        let path = dev.join(name);
        mkfifo(&path, 0o644)?;

        let attr_dir = class.path.join(name);
        let attrs = fs::create_dir(&attr_dir)
            .and_then(|()| fs::write(attr_dir.join("dev"), format!("{number}\n")));
        if let Err(e) = attrs {
            let _ = fs::remove_dir_all(&attr_dir);
            let _ = fs::remove_file(&path);
            return Err(status(&e));
        }

        Ok(FsNode { path, attr_dir })
    }

    fn destroy_node(&self, _class: &FsClass, node: FsNode) {
        if let Err(e) = fs::remove_file(&node.path) {
            log::warn!("fs host: could not remove {}: {e}", node.path.display());
        }
        let _ = fs::remove_dir_all(&node.attr_dir);
    }
}
