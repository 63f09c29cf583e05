//! Recursive operations built only from `FsBackend` primitives.

use anyhow::Context;

use crate::core::{FsBackend, Result, utils};
use crate::error::VfsError;
use crate::Metadata;

const INDENT: &str = "  ";

/// Copies `source` to `destination` without ever overwriting.
///
/// If `destination` is an existing directory the copy lands inside it under the
/// source's name. Directories are copied with all their contents. The whole set of
/// new entries is collected first and committed with a single `create_all()`, so a
/// failed copy leaves nothing behind.
///
/// Returns the inner path of the created copy.
pub fn copy<B: FsBackend + ?Sized>(fs: &mut B, source: &str, destination: &str) -> Result<String> {
    let (src, _) = fs.resolve(source);
    if !fs.exists(&src) {
        return Err(VfsError::not_found("cp", src).into());
    }

    let (dst, dst_is_dir) = fs.resolve(destination);
    let target = if dst_is_dir {
        utils::join(&dst, utils::file_name(&src))
    } else {
        dst
    };
    if fs.exists(&target) {
        return Err(VfsError::already_exists("cp", target).into());
    }
    if utils::is_descendant(&target, &src) {
        return Err(VfsError::InvalidArgument {
            op: "cp",
            reason: format!("cannot copy {src} into itself ({target})"),
        }
        .into());
    }

    let mut plan = Vec::new();
    plan_copy(&*fs, &src, &target, &mut plan)?;
    fs.create_all(&plan)
        .with_context(|| format!("cp: cannot copy {src} to {target}"))?;
    Ok(target)
}

/// Appends the entries needed to copy `src` to `target`, parents before children.
fn plan_copy<B: FsBackend + ?Sized>(
    fs: &B,
    src: &str,
    target: &str,
    plan: &mut Vec<Metadata>,
) -> Result<()> {
    let meta = fs.metadata(src)?;
    plan.push(Metadata::new(target, meta.size(), meta.entry_type()));
    if meta.is_dir() {
        for name in fs.ls(src)? {
            let child = utils::join(src, &name);
            plan_copy(fs, &child, &utils::join(target, &name), plan)
                .with_context(|| format!("cp: cannot copy {child}"))?;
        }
    }
    Ok(())
}

/// Renders everything below `path`, one name per line, indented two spaces per level.
/// Returns an empty string if `path` is not a directory.
pub fn tree<B: FsBackend + ?Sized>(fs: &B, path: &str) -> String {
    let (dir, is_dir) = fs.resolve(path);
    let mut out = String::new();
    if is_dir {
        render(fs, &dir, 0, &mut out);
    }
    out
}

fn render<B: FsBackend + ?Sized>(fs: &B, dir: &str, depth: usize, out: &mut String) {
    let Ok(names) = fs.ls(dir) else {
        return;
    };
    for name in names {
        for _ in 0..depth {
            out.push_str(INDENT);
        }
        out.push_str(&name);
        out.push('\n');

        let (child, is_dir) = fs.resolve(&utils::join(dir, &name));
        if is_dir {
            render(fs, &child, depth + 1, out);
        }
    }
}

/// Searches below the current working directory for names containing `term`.
/// Matching directories are still descended into.
pub fn find<B: FsBackend + ?Sized>(fs: &B, term: &str) -> Vec<String> {
    let mut found = Vec::new();
    search(fs, fs.cwd(), term, &mut found);
    found
}

fn search<B: FsBackend + ?Sized>(fs: &B, dir: &str, term: &str, found: &mut Vec<String>) {
    let Ok(names) = fs.ls(dir) else {
        return;
    };
    for name in names {
        let (child, is_dir) = fs.resolve(&utils::join(dir, &name));
        if name.contains(term) {
            found.push(child.clone());
        }
        if is_dir {
            search(fs, &child, term, found);
        }
    }
}
