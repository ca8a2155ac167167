//! Greedy, order-preserving partitioning of a file stream into archive
//! groups bounded by cumulative size, and materialization of the groups as
//! manifests on disk.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::domain::{FileEntry, GroupPlan};
use crate::error::{Result, SpoolError};
use crate::util::paths::{escape_member, normalize, normalize_path};

/// Assigns consecutive files to group indices. No lookahead and no
/// rebalancing: the file that pushes the running total over the budget
/// opens the next group.
#[derive(Clone, Debug)]
pub struct SizeBinPacker {
    budget: u64,
    acc: u64,
    index: usize,
    seen: bool,
}

impl SizeBinPacker {
    pub fn new(budget: u64) -> Result<Self> {
        if budget == 0 {
            return Err(SpoolError::planning(
                PathBuf::new(),
                "archive size budget must be greater than zero",
            ));
        }
        Ok(Self {
            budget,
            acc: 0,
            index: 0,
            seen: false,
        })
    }

    /// Group index for the next file of `size` bytes.
    pub fn assign(&mut self, size: u64) -> usize {
        self.acc = self.acc.saturating_add(size);
        // The very first file stays in group 0 whatever its size, so indices
        // stay dense.
        if self.acc > self.budget && self.seen {
            self.index += 1;
            self.acc = size;
        }
        self.seen = true;
        self.index
    }
}

/// Pure partitioning, kept separate from manifest I/O.
pub fn partition<I>(entries: I, budget: u64) -> Result<Vec<Vec<FileEntry>>>
where
    I: IntoIterator<Item = FileEntry>,
{
    let mut packer = SizeBinPacker::new(budget)?;
    let mut groups: Vec<Vec<FileEntry>> = Vec::new();
    for e in entries {
        let n = packer.assign(e.size);
        if n == groups.len() {
            groups.push(Vec::new());
        }
        groups[n].push(e);
    }
    Ok(groups)
}

/// Where a folder's plans point: local layout plus remote naming.
#[derive(Clone, Debug)]
pub struct PlanLayout<'a> {
    pub base_dir: &'a Path,
    /// Folder being archived, relative to `base_dir`.
    pub folder: &'a Path,
    pub work_dir: &'a Path,
    pub hsi_prefix: &'a str,
}

impl PlanLayout<'_> {
    fn folder_name(&self) -> Result<String> {
        self.folder
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| SpoolError::planning(self.folder, "folder has no name"))
    }

    fn parent(&self) -> PathBuf {
        self.folder
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }

    /// Directory the archiver runs in; members are relative to it.
    pub fn working_dir(&self) -> PathBuf {
        self.base_dir.join(self.parent())
    }

    pub fn local_folder(&self) -> PathBuf {
        self.base_dir.join(self.folder)
    }

    /// `<parent>/<folder>.htar`: restore script and execution transcript.
    pub fn transcript_path(&self) -> Result<PathBuf> {
        Ok(self.working_dir().join(format!("{}.htar", self.folder_name()?)))
    }

    /// Survey-mode stub, kept apart from the real transcript.
    pub fn stub_path(&self) -> Result<PathBuf> {
        Ok(self
            .working_dir()
            .join(format!("{}_STUB.htar", self.folder_name()?)))
    }

    pub fn archive_name(&self, n: usize) -> Result<String> {
        Ok(format!("{}.{n}.tar", self.folder_name()?))
    }

    pub fn archive_path(&self, n: usize) -> Result<String> {
        Ok(normalize(&format!(
            "{}/{}/{}",
            self.hsi_prefix,
            normalize_path(&self.parent()),
            self.archive_name(n)?
        )))
    }

    /// Remote directory the folder's archives land in.
    pub fn remote_dir(&self) -> String {
        normalize(&format!(
            "{}/{}",
            self.hsi_prefix,
            normalize_path(&self.parent())
        ))
    }

    pub fn manifest_path(&self, n: usize) -> PathBuf {
        let name = normalize_path(self.folder).replace('/', ":");
        self.work_dir.join(format!("htar_{name}.{n}"))
    }
}

struct OpenGroup {
    plan: GroupPlan,
    out: BufWriter<File>,
}

impl OpenGroup {
    fn finish(mut self) -> Result<GroupPlan> {
        self.out.flush()?;
        Ok(self.plan)
    }
}

/// Pack `entries` into groups and write one manifest per group. A manifest
/// is only created once its group has a member, so no manifest is empty.
pub fn plan_folder<I>(layout: &PlanLayout<'_>, entries: I, budget: u64) -> Result<Vec<GroupPlan>>
where
    I: IntoIterator<Item = Result<FileEntry>>,
{
    let mut packer = SizeBinPacker::new(budget)?;
    let working_dir = layout.working_dir();
    let transcript_path = layout.transcript_path()?;
    let mut plans = Vec::new();
    let mut current: Option<OpenGroup> = None;

    for entry in entries {
        let entry = entry?;
        let n = packer.assign(entry.size);

        if current.as_ref().map(|g| g.plan.group_index) != Some(n) {
            if let Some(done) = current.take() {
                plans.push(done.finish()?);
            }
            // htar runs in the working directory, so a relative work dir
            // would resolve against the wrong place
            let manifest_path = std::path::absolute(layout.manifest_path(n))?;
            tracing::debug!(manifest = %manifest_path.display(), group = n, "opening manifest");
            // Truncates any stale manifest from an earlier run
            let out = BufWriter::new(File::create(&manifest_path)?);
            let mut log_name = manifest_path.clone().into_os_string();
            log_name.push(".out");
            current = Some(OpenGroup {
                plan: GroupPlan {
                    group_index: n,
                    archive_name: layout.archive_name(n)?,
                    archive_path: layout.archive_path(n)?,
                    manifest_path,
                    log_path: PathBuf::from(log_name),
                    transcript_path: transcript_path.clone(),
                    working_dir: working_dir.clone(),
                    folder: layout.local_folder(),
                    members: 0,
                    bytes: 0,
                },
                out,
            });
        }

        let group = current
            .as_mut()
            .ok_or_else(|| SpoolError::planning(layout.folder, "no open group"))?;
        let rel = entry
            .path
            .strip_prefix(&working_dir)
            .unwrap_or(&entry.path)
            .to_str()
            .ok_or_else(|| SpoolError::planning(&entry.path, "file name is not valid UTF-8"))?;
        writeln!(group.out, "{}", escape_member(rel))?;
        group.plan.members += 1;
        group.plan.bytes += entry.size;
    }

    if let Some(done) = current.take() {
        plans.push(done.finish()?);
    }
    Ok(plans)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GB: u64 = 1 << 30;

    fn sizes(groups: &[Vec<FileEntry>]) -> Vec<Vec<u64>> {
        groups
            .iter()
            .map(|g| g.iter().map(|e| e.size).collect())
            .collect()
    }

    fn entries(sizes: &[u64]) -> Vec<FileEntry> {
        sizes
            .iter()
            .enumerate()
            .map(|(i, s)| FileEntry::new(format!("f{i}"), *s))
            .collect()
    }

    #[test]
    fn overflow_starts_new_group() {
        let groups = partition(entries(&[4 * GB, 3 * GB, 5 * GB]), 6 * GB).unwrap();
        assert_eq!(sizes(&groups), vec![vec![4 * GB], vec![3 * GB], vec![5 * GB]]);
    }

    #[test]
    fn fills_until_exceeded() {
        let groups = partition(entries(&[2, 2, 2, 1, 5, 1]), 6).unwrap();
        assert_eq!(sizes(&groups), vec![vec![2, 2, 2], vec![1, 5], vec![1]]);
    }

    #[test]
    fn oversize_first_file_is_group_zero() {
        let groups = partition(entries(&[10, 1, 1]), 4).unwrap();
        assert_eq!(sizes(&groups), vec![vec![10], vec![1, 1]]);
    }

    #[test]
    fn tiny_budget_gives_singletons() {
        let groups = partition(entries(&[3, 3, 3, 3]), 1).unwrap();
        assert_eq!(groups.len(), 4);
        assert!(groups.iter().all(|g| g.len() == 1));
    }

    #[test]
    fn zero_budget_rejected() {
        assert!(matches!(
            SizeBinPacker::new(0),
            Err(SpoolError::Planning { .. })
        ));
    }

    #[test]
    fn layout_names() {
        let layout = PlanLayout {
            base_dir: Path::new("/data"),
            folder: Path::new("20240131-C2/grid1/raw"),
            work_dir: Path::new("/tmp/spool"),
            hsi_prefix: "/cryoEM/exp/",
        };
        assert_eq!(layout.archive_name(3).unwrap(), "raw.3.tar");
        assert_eq!(
            layout.archive_path(3).unwrap(),
            "/cryoEM/exp/20240131-C2/grid1/raw.3.tar"
        );
        assert_eq!(layout.remote_dir(), "/cryoEM/exp/20240131-C2/grid1");
        assert_eq!(
            layout.transcript_path().unwrap(),
            PathBuf::from("/data/20240131-C2/grid1/raw.htar")
        );
        assert_eq!(
            layout.manifest_path(0),
            PathBuf::from("/tmp/spool/htar_20240131-C2:grid1:raw.0")
        );
        assert_eq!(layout.working_dir(), PathBuf::from("/data/20240131-C2/grid1"));
    }

    #[test]
    fn top_level_folder_has_prefix_only_remote_dir() {
        let layout = PlanLayout {
            base_dir: Path::new("/data"),
            folder: Path::new("raw"),
            work_dir: Path::new("/tmp"),
            hsi_prefix: "/cryoEM/exp/",
        };
        assert_eq!(layout.archive_path(0).unwrap(), "/cryoEM/exp/raw.0.tar");
        assert_eq!(layout.working_dir(), PathBuf::from("/data/"));
    }

    fn raw_layout<'a>(base: &'a Path, work: &'a Path) -> PlanLayout<'a> {
        PlanLayout {
            base_dir: base,
            folder: Path::new("proj/raw"),
            work_dir: work,
            hsi_prefix: "/cryoEM/exp/",
        }
    }

    #[test]
    fn relative_work_dir_gives_absolute_manifests() {
        // tempdir_in(".") hands back a relative path
        let tmp = tempfile::tempdir_in(".").unwrap();
        assert!(tmp.path().is_relative());
        let base = tmp.path().join("base");
        let work = tmp.path().join("work");
        std::fs::create_dir_all(base.join("proj/raw")).unwrap();
        std::fs::create_dir_all(&work).unwrap();
        let file = base.join("proj/raw/a");
        std::fs::write(&file, b"abc").unwrap();

        let plans = plan_folder(
            &raw_layout(&base, &work),
            [Ok(FileEntry::new(&file, 3))],
            10,
        )
        .unwrap();
        assert_eq!(plans.len(), 1);
        assert!(plans[0].manifest_path.is_absolute());
        assert!(plans[0].log_path.is_absolute());
        assert_eq!(
            std::fs::read_to_string(&plans[0].manifest_path).unwrap(),
            "raw/a\n"
        );
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn non_utf8_member_is_a_planning_error() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().join("base");
        let work = tmp.path().join("work");
        std::fs::create_dir_all(&work).unwrap();
        let bad = base.join("proj/raw").join(OsStr::from_bytes(b"frame\xff.mrc"));

        let err = plan_folder(&raw_layout(&base, &work), [Ok(FileEntry::new(&bad, 1))], 10)
            .unwrap_err();
        match err {
            SpoolError::Planning { path, reason } => {
                assert_eq!(path, bad);
                assert!(reason.contains("UTF-8"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
