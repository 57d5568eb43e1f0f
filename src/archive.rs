//! Day folders and file relocation.
//!
//! Each camera gets a `<archive-root>/<YYYY-MM-DD>/` folder per day and,
//! when configured, a matching folder under its remote root. When the local
//! folder is new, whatever the camera left in its export directory is moved
//! into the backup directory so the day starts empty.
//!
//! A reconciled movie is moved into the day folder (keeping its original
//! timestamps) and a copy is written back to the export directory.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use jiff::civil::Date;
use tracing::{info, warn};

use crate::config::CameraConfig;
use crate::model::DayFolders;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("not a file: {0}")]
    NotAFile(PathBuf),
}

pub type Result<T> = core::result::Result<T, ArchiveError>;

fn io_at(path: &Path) -> impl FnOnce(io::Error) -> ArchiveError + '_ {
    move |source| ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Today's folders and how many stale exports were cleared away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedDay {
    pub folders: DayFolders,
    pub archived: usize,
}

/// Create the day folders for `date`, emptying the export directory into
/// the backup directory if the local folder did not exist yet.
pub fn prepare_day(camera: &CameraConfig, date: Date) -> Result<PreparedDay> {
    let newly_created = !local_day_folder(camera, date).is_dir();
    let folders = ensure_day_folders(camera, date)?;

    let archived = if newly_created {
        archive_export_dir(&camera.export_dir, &camera.backup_dir())?
    } else {
        0
    };

    info!(
        camera = %camera.id,
        local = %folders.local.display(),
        remote = ?folders.remote.as_ref().map(|r| r.display().to_string()),
        archived,
        "prepared day folders"
    );

    Ok(PreparedDay { folders, archived })
}

/// Create the day folders for `date` without touching the export directory.
pub fn ensure_day_folders(camera: &CameraConfig, date: Date) -> Result<DayFolders> {
    let local = local_day_folder(camera, date);
    fs::create_dir_all(&local).map_err(io_at(&local))?;
    let remote = camera
        .remote_root
        .as_ref()
        .and_then(|root| remote_day_folder(&camera.id, root, &date.to_string()));
    Ok(DayFolders {
        date,
        local,
        remote,
    })
}

fn local_day_folder(camera: &CameraConfig, date: Date) -> PathBuf {
    camera.archive_root.join(date.to_string())
}

/// The remote folder for `day`, created without parents.
/// `None` when the remote store is unreachable.
fn remote_day_folder(camera: &str, root: &Path, day: &str) -> Option<PathBuf> {
    let dir = root.join(day);
    if dir.is_dir() {
        return Some(dir);
    }
    match fs::create_dir(&dir) {
        Ok(()) => Some(dir),
        Err(e) => {
            warn!(camera, remote = %dir.display(), error = %e, "remote store unavailable today");
            None
        }
    }
}

/// Move every file in `export_dir` into `backup_dir`. Returns how many were moved.
pub fn archive_export_dir(export_dir: &Path, backup_dir: &Path) -> Result<usize> {
    let entries = match fs::read_dir(export_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(io_at(export_dir)(e)),
    };
    fs::create_dir_all(backup_dir).map_err(io_at(backup_dir))?;

    let mut moved = 0;
    for entry in entries {
        let path = entry.map_err(io_at(export_dir))?.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name() else {
            continue;
        };
        move_file(&path, &backup_dir.join(name))?;
        moved += 1;
    }
    Ok(moved)
}

/// Where a relocated file ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relocation {
    pub local: PathBuf,
    pub remote: Option<PathBuf>,
}

/// Move `file` into the local day folder, copy it back to where it was,
/// and mirror it to the remote folder if there is one.
///
/// The remote copy is best effort: a failure is logged and leaves
/// `remote` empty.
pub fn relocate(file: &Path, folders: &DayFolders) -> Result<Relocation> {
    if !file.is_file() {
        return Err(ArchiveError::NotAFile(file.to_path_buf()));
    }
    let name = file
        .file_name()
        .ok_or_else(|| ArchiveError::NotAFile(file.to_path_buf()))?;
    let local = folders.local.join(name);

    move_file(file, &local)?;
    copy_preserving_mtime(&local, file)?;

    let remote = folders.remote.as_ref().and_then(|dir| {
        let target = dir.join(name);
        match copy_preserving_mtime(&local, &target) {
            Ok(()) => Some(target),
            Err(e) => {
                warn!(file = %local.display(), error = %e, "failed to mirror to remote store");
                None
            }
        }
    });

    Ok(Relocation { local, remote })
}

/// Rename, falling back to copy and delete across filesystems.
fn move_file(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    copy_preserving_mtime(from, to)?;
    fs::remove_file(from).map_err(io_at(from))
}

fn copy_preserving_mtime(from: &Path, to: &Path) -> Result<()> {
    let modified = fs::metadata(from)
        .and_then(|m| m.modified())
        .map_err(io_at(from))?;
    fs::copy(from, to).map_err(io_at(to))?;
    File::options()
        .write(true)
        .open(to)
        .and_then(|f| f.set_modified(modified))
        .map_err(io_at(to))
}
