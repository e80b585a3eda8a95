//! Locating the IbInputSimulator files and AutoHotkey on disk.

use std::path::{Path, PathBuf};

const VENDOR_DIR: &str = "IbInputSimulator";
const AHK_BINDING_DIR: &str = "Binding.AHK2";
const DLL_NAME: &str = "IbInputSimulator.dll";
const AHK_INCLUDE_NAME: &str = "IbInputSimulator.ahk";

const AHK_EXE_NAMES: [&str; 4] = [
    "AutoHotkey64.exe",
    "AutoHotkeyU64.exe",
    "AutoHotkey.exe",
    "autohotkey.exe",
];

/// Directories that may hold an IbInputSimulator install, most specific first.
///
/// An explicit `ibsim_dir` comes first, then vendored copies next to the
/// executable, one and two levels up, and under the working directory.
pub fn candidate_dirs(ibsim_dir: Option<&Path>) -> Vec<PathBuf> {
    let mut roots: Vec<PathBuf> = Vec::new();
    if let Ok(exe) = std::env::current_exe() {
        roots.extend(exe.ancestors().skip(1).take(3).map(Path::to_path_buf));
    }
    if let Ok(cwd) = std::env::current_dir() {
        roots.push(cwd);
    }
    vendor_dirs(ibsim_dir, &roots)
}

fn vendor_dirs(ibsim_dir: Option<&Path>, roots: &[PathBuf]) -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = ibsim_dir.map(Path::to_path_buf).into_iter().collect();
    for root in roots {
        let vendor = root.join(VENDOR_DIR);
        out.push(vendor.join(AHK_BINDING_DIR));
        out.push(vendor);
    }
    out.dedup();
    out
}

/// Path of `name` inside a candidate directory.
///
/// The binding files live under `Binding.AHK2`; a candidate that already
/// is that directory is used as is.
fn binding_file(dir: &Path, name: &str) -> PathBuf {
    if dir.file_name().is_some_and(|n| n == AHK_BINDING_DIR) {
        dir.join(name)
    } else {
        dir.join(AHK_BINDING_DIR).join(name)
    }
}

fn find_binding_file(dirs: &[PathBuf], name: &str) -> Option<PathBuf> {
    dirs.iter()
        .flat_map(|d| [binding_file(d, name), d.join(name)])
        .find(|p| p.is_file())
}

pub fn find_ibsim_dll(dirs: &[PathBuf]) -> Option<PathBuf> {
    find_binding_file(dirs, DLL_NAME)
}

pub fn find_ahk_include(dirs: &[PathBuf]) -> Option<PathBuf> {
    find_binding_file(dirs, AHK_INCLUDE_NAME)
}

/// Find an AutoHotkey v2 executable.
///
/// Order: explicit override, `PATH`, then the usual Program Files layouts.
pub fn find_autohotkey(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        if path.is_file() {
            return Some(path.to_path_buf());
        }
        tracing::warn!("AUTOHOTKEY_EXE={} does not exist", path.display());
    }

    if let Some(path_var) = std::env::var_os("PATH") {
        for dir in std::env::split_paths(&path_var) {
            if let Some(found) = AHK_EXE_NAMES.iter().map(|n| dir.join(n)).find(|p| p.is_file()) {
                return Some(found);
            }
        }
    }

    let program_files = [
        std::env::var_os("ProgramFiles").map(PathBuf::from),
        std::env::var_os("ProgramFiles(x86)").map(PathBuf::from),
    ];
    program_files
        .into_iter()
        .flatten()
        .flat_map(|pf| program_files_candidates(&pf))
        .find(|p| p.is_file())
}

fn program_files_candidates(program_files: &Path) -> Vec<PathBuf> {
    let base = program_files.join("AutoHotkey");
    AHK_EXE_NAMES[..3]
        .iter()
        .flat_map(|name| [base.join("v2").join(name), base.join(name)])
        .collect()
}
