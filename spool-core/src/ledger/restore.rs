use std::io::Write;
use std::path::Path;

use crate::domain::GroupPlan;
use crate::error::Result;
use crate::exec::command::ArchiverTemplate;
use crate::ledger::transcript::separator;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScriptKind {
    /// Files were archived; restoring needs an operator.
    Restore,
    /// Usage survey only; nothing was written to tape.
    Stub,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// An existing script was left alone.
    Kept,
}

/// Text of the restore script for `folder`, one extract line per plan.
pub fn render(
    kind: ScriptKind,
    folder: &Path,
    plans: &[GroupPlan],
    template: &dyn ArchiverTemplate,
) -> String {
    let rule = separator();
    let mut text = String::new();
    text.push_str(&rule);
    text.push('\n');
    match kind {
        ScriptKind::Restore => {
            text.push_str(&format!(
                "# The files under {} have been archived to tape.\n",
                folder.display()
            ));
            text.push_str(
                "# To restore, ask the storage administrators to run this file, giving them its full path.\n",
            );
        }
        ScriptKind::Stub => {
            text.push_str(&format!(
                "# The files under {} HAVE NOT been archived to tape. This is a stub generated by a usage survey.\n",
                folder.display()
            ));
        }
    }
    text.push_str(&rule);
    text.push_str("\n\n");
    text.push_str("# The following commands extract the archives from tape back to disk\n");
    for p in plans {
        text.push_str(&template.extract(&p.archive_path).render());
        text.push('\n');
    }
    text.push('\n');
    text.push_str(&rule);
    text.push('\n');
    text
}

/// Write `text` to `path` unless it exists and `overwrite` is off. The
/// existing file doubles as the transcript, so keeping it is the default.
pub fn write_script(path: &Path, text: &str, overwrite: bool) -> Result<WriteOutcome> {
    if path.exists() && !overwrite {
        return Ok(WriteOutcome::Kept);
    }
    let dir = path.parent().filter(|d| !d.as_os_str().is_empty());
    let mut tmp = match dir {
        Some(d) => tempfile::NamedTempFile::new_in(d)?,
        None => tempfile::NamedTempFile::new_in(".")?,
    };
    tmp.write_all(text.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(WriteOutcome::Written)
}
