// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2024 Daniel J. H. Nebdal

//! Packaging manifests and their data files into ZIP containers, and
//! reading manifests back out of them.
//!
//! Responsibilities:
//! - Refuse to package when any referenced file is missing (no archive is written)
//!   or names a path outside the packaging directory.
//! - Write `MANIFEST.json` first, then every data file under its bare name.
//! - Locate the manifest entry in an existing container, case-insensitively.

use std::fs::{self, File};
use std::io::{self, Read, Seek, Write};
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info, warn};
use zip::{CompressionMethod, ZipArchive, write::FileOptions};

use crate::error::{ManifestError, Result};
use crate::models::attachment::assert_unique_entry_names;
use crate::models::manifest::Manifest;

/// Entry name of the manifest inside a container.
pub const MANIFEST_ENTRY: &str = "MANIFEST.json";

/// Default container extension.
pub const ARCHIVE_EXTENSION: &str = "zip";

/// Result of a packaging attempt that did not fail on I/O.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PackageOutcome {
    /// Archive written; holds its file name (relative to the packaging dir).
    Created(String),
    /// Nothing written; these referenced files do not exist.
    MissingFiles(Vec<String>),
}

/// True when `path` looks like a container (extension `zip`, any case).
pub fn is_archive_path(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some(ext) if ext.eq_ignore_ascii_case(ARCHIVE_EXTENSION)
    )
}

/// Package `manifest` and the files it references, all resolved inside `dir`.
///
/// Uses the output files of a completed manifest and the input files
/// otherwise. Every file name must be a bare name inside `dir`
/// ([`ManifestError::UnsafeFileName`] otherwise). On success
/// `manifest.zipfile` holds the archive name, which is also what the embedded
/// `MANIFEST.json` references. When files are missing the call is a no-op
/// returning [`PackageOutcome::MissingFiles`]. If writing fails midway the
/// partial archive is removed and `zipfile` restored.
pub fn package(manifest: &mut Manifest, dir: &Path) -> Result<PackageOutcome> {
    let files: Vec<String> = manifest
        .files_to_package()
        .file_names()
        .into_iter()
        .map(str::to_string)
        .collect();

    if let Some(unsafe_name) = files.iter().find(|name| !is_bare_file_name(name)) {
        warn!(name = %unsafe_name, "Refusing to package a file outside the working directory");
        return Err(ManifestError::UnsafeFileName(unsafe_name.clone()));
    }

    let missing: Vec<String> = files
        .iter()
        .filter(|name| !dir.join(name.as_str()).is_file())
        .cloned()
        .collect();
    if !missing.is_empty() {
        warn!(
            ?missing,
            "Some files specified in the manifest not found when trying to package"
        );
        return Ok(PackageOutcome::MissingFiles(missing));
    }

    let members: Vec<(PathBuf, String)> = files
        .iter()
        .map(|name| (dir.join(name), name.clone()))
        .collect();
    assert_unique_entry_names(members.iter().map(|(_, e)| e.as_str()), &[MANIFEST_ENTRY])?;

    let archive_name = manifest.make_archive_name(ARCHIVE_EXTENSION);
    let archive_path = dir.join(&archive_name);
    let previous = std::mem::replace(&mut manifest.zipfile, archive_name.clone());

    info!(archive = %archive_path.display(), "Creating archive");
    if let Err(err) = write_archive(manifest, &archive_path, &members) {
        manifest.zipfile = previous;
        if archive_path.exists()
            && let Err(cleanup) = fs::remove_file(&archive_path)
        {
            warn!(archive = %archive_path.display(), %cleanup, "Failed to remove partial archive");
        }
        return Err(err);
    }

    info!(archive = %archive_name, "Done");
    Ok(PackageOutcome::Created(archive_name))
}

fn write_archive(manifest: &Manifest, output: &Path, members: &[(PathBuf, String)]) -> Result<()> {
    let file = File::create(output).map_err(|err| ManifestError::io(output, err))?;
    let mut zip = zip::ZipWriter::new(file);
    let options: FileOptions<'_, ()> =
        FileOptions::default().compression_method(CompressionMethod::Deflated);

    info!("Adding {MANIFEST_ENTRY}");
    zip.start_file(MANIFEST_ENTRY, options)?;
    zip.write_all(manifest.to_json_pretty()?.as_bytes())
        .map_err(|err| ManifestError::io(output, err))?;

    for (path, entry) in members {
        info!("Adding {entry}");
        zip.start_file(entry.as_str(), options)?;
        let mut reader = File::open(path).map_err(|err| ManifestError::io(path, err))?;
        let written = io::copy(&mut reader, &mut zip).map_err(|err| ManifestError::io(path, err))?;
        debug!(entry = %entry, bytes = written, "Copied file into archive");
    }

    zip.finish()?;
    Ok(())
}

/// True for a single normal path component with no separators of either style.
fn is_bare_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !name.contains(['/', '\\'])
}

/// Pick the manifest entry among `names`: case-insensitive match on
/// `MANIFEST.json`, lexicographically smallest when there are several.
pub fn find_manifest_entry<'a>(names: impl IntoIterator<Item = &'a str>) -> Option<String> {
    let mut candidates: Vec<&str> = names
        .into_iter()
        .filter(|name| name.eq_ignore_ascii_case(MANIFEST_ENTRY))
        .collect();
    candidates.sort_unstable();

    if candidates.len() > 1 {
        warn!(
            ?candidates,
            chosen = candidates[0],
            "Found multiple manifests in archive; using the one that sorts first"
        );
    }
    candidates.first().map(|name| name.to_string())
}

/// Read the manifest out of an open container.
pub fn extract<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<Manifest> {
    let entry = find_manifest_entry(archive.file_names()).ok_or(ManifestError::NotFound)?;
    debug!(%entry, "Reading manifest entry");
    let reader = archive.by_name(&entry)?;
    Manifest::from_reader(reader)
}

/// Open the container at `path` and read its manifest.
pub fn extract_from_path(path: &Path) -> Result<Manifest> {
    let file = File::open(path).map_err(|err| ManifestError::io(path, err))?;
    let mut archive = ZipArchive::new(file)?;
    extract(&mut archive)
}

#[cfg(test)]
mod tests {
    use std::fs::{self, File};
    use std::io::{Cursor, Read, Write};
    use std::path::{Path, PathBuf};

    use serde_json::json;
    use tempfile::TempDir;
    use zip::write::FileOptions;
    use zip::{ZipArchive, ZipWriter};

    use super::{
        MANIFEST_ENTRY, PackageOutcome, extract, extract_from_path, find_manifest_entry,
        is_archive_path, package,
    };
    use crate::error::ManifestError;
    use crate::models::{FileAttachment, Manifest, Status};

    fn manifest_with(files: &[&str]) -> Manifest {
        let records: Vec<FileAttachment> = files
            .iter()
            .map(|name| FileAttachment::new(*name, "Methylation", "text/csv"))
            .collect();
        Manifest::new("Patient-0001", "End of Treatment", "OUS0001", records).unwrap()
    }

    fn entry_names(path: &Path) -> Vec<String> {
        let archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        archive.file_names().map(str::to_string).collect()
    }

    fn zip_with_entries(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options: FileOptions<'_, ()> = FileOptions::default();
        for (name, body) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    fn task_json(performer: &str) -> String {
        json!({
            "resourceType": "Task",
            "status": "requested",
            "authoredOn": "2024-01-01T00:00:00+01:00",
            "requestedPerformer": [{"reference": {"reference": performer}}],
            "input": [{
                "type": {"text": "Methylation"},
                "valueAttachment": {"contentType": "text/csv", "url": "file://a.csv"},
            }],
        })
        .to_string()
    }

    #[test]
    fn package_writes_manifest_then_bare_file_names() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.csv"), b"1,2,3").unwrap();
        fs::write(tmp.path().join("b.csv"), b"4,5,6").unwrap();
        let mut manifest = manifest_with(&["a.csv", "b.csv"]);

        let outcome = package(&mut manifest, tmp.path()).unwrap();

        let PackageOutcome::Created(name) = outcome else {
            panic!("expected an archive, got {outcome:?}");
        };
        assert!(name.starts_with("NEW.Patient-0001.End_of_Treatment.OUS0001."));
        assert!(name.ends_with(".zip"));
        assert_eq!(manifest.zipfile, name);

        let path = tmp.path().join(&name);
        assert_eq!(entry_names(&path), vec![MANIFEST_ENTRY, "a.csv", "b.csv"]);

        let mut archive = ZipArchive::new(File::open(&path).unwrap()).unwrap();
        let mut body = String::new();
        archive.by_name("b.csv").unwrap().read_to_string(&mut body).unwrap();
        assert_eq!(body, "4,5,6");

        // The embedded manifest references the archive it lives in.
        let embedded = extract(&mut archive).unwrap();
        assert_eq!(embedded.zipfile, name);
        assert_eq!(embedded, manifest);
    }

    #[test]
    fn package_reports_missing_files_and_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("present.csv"), b"x").unwrap();
        let mut manifest = manifest_with(&["present.csv", "absent.csv"]);

        let outcome = package(&mut manifest, tmp.path()).unwrap();

        assert_eq!(
            outcome,
            PackageOutcome::MissingFiles(vec!["absent.csv".to_string()])
        );
        assert!(manifest.zipfile.is_empty());
        let written: Vec<PathBuf> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(written, vec![tmp.path().join("present.csv")]);
    }

    #[test]
    fn package_uses_output_files_once_completed() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("result.csv"), b"r").unwrap();
        let mut manifest = manifest_with(&["input-not-on-disk.csv"]);
        manifest
            .mark_done(FileAttachment::new("result.csv", "Result", "text/csv"))
            .unwrap();

        let outcome = package(&mut manifest, tmp.path()).unwrap();

        let PackageOutcome::Created(name) = outcome else {
            panic!("expected an archive, got {outcome:?}");
        };
        assert!(name.starts_with("RES."));
        assert_eq!(
            entry_names(&tmp.path().join(&name)),
            vec![MANIFEST_ENTRY, "result.csv"]
        );
        assert_eq!(manifest.status(), Status::Completed);
    }

    #[test]
    fn package_rejects_colliding_entry_names() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(MANIFEST_ENTRY), b"{}").unwrap();
        let mut manifest = manifest_with(&[MANIFEST_ENTRY]);

        let result = package(&mut manifest, tmp.path());

        assert!(matches!(result, Err(ManifestError::DuplicateEntry(_))));
        assert!(manifest.zipfile.is_empty());
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    // A manifest without files cannot be built, so no archive can end up
    // holding a MANIFEST.json that fails to decode.
    #[test]
    fn manifest_without_files_never_reaches_packaging() {
        let result = Manifest::new(
            "Patient-0001",
            "End of Treatment",
            "OUS0001",
            Vec::<FileAttachment>::new(),
        );
        assert!(matches!(result, Err(ManifestError::Schema { .. })));
    }

    #[test]
    fn packaged_manifest_decodes_back_from_the_archive() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.csv"), b"1").unwrap();
        let mut manifest = manifest_with(&["a.csv"]);

        let PackageOutcome::Created(name) = package(&mut manifest, tmp.path()).unwrap() else {
            panic!("expected an archive");
        };
        assert_eq!(extract_from_path(&tmp.path().join(name)).unwrap(), manifest);
    }

    // Names with directories would read outside the packaging directory.
    #[test]
    fn package_rejects_file_names_with_directories() {
        let tmp = TempDir::new().unwrap();
        let inner = tmp.path().join("work");
        fs::create_dir(&inner).unwrap();
        fs::write(tmp.path().join("outside.csv"), b"secret").unwrap();
        let absolute = tmp.path().join("outside.csv").to_string_lossy().into_owned();

        for name in ["../outside.csv", absolute.as_str(), "sub/a.csv", "sub\\a.csv", "."] {
            let mut manifest = manifest_with(&[name]);
            let result = package(&mut manifest, &inner);

            assert!(
                matches!(result, Err(ManifestError::UnsafeFileName(ref n)) if n == name),
                "{name}: {result:?}"
            );
            assert!(manifest.zipfile.is_empty());
        }
        assert_eq!(fs::read_dir(&inner).unwrap().count(), 0);
    }

    #[test]
    fn find_manifest_entry_is_case_insensitive_and_deterministic() {
        assert_eq!(
            find_manifest_entry(["data.csv", "manifest.json", "MANIFEST.json"]),
            Some("MANIFEST.json".to_string())
        );
        assert_eq!(
            find_manifest_entry(["Manifest.JSON"]),
            Some("Manifest.JSON".to_string())
        );
        assert_eq!(find_manifest_entry(["sub/MANIFEST.json", "a.csv"]), None);
    }

    #[test]
    fn extract_picks_smallest_name_among_case_variants() {
        let bytes = zip_with_entries(&[
            ("manifest.json", &task_json("lower")),
            ("MANIFEST.json", &task_json("upper")),
        ]);
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();

        let manifest = extract(&mut archive).unwrap();

        // "MANIFEST.json" < "manifest.json" in byte order.
        assert_eq!(manifest.performer, "upper");
    }

    #[test]
    fn extract_without_manifest_entry_is_not_found() {
        let bytes = zip_with_entries(&[("a.csv", "1")]);
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();

        assert!(matches!(extract(&mut archive), Err(ManifestError::NotFound)));
    }

    #[test]
    fn extract_from_path_reports_malformed_manifest() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.zip");
        fs::write(&path, zip_with_entries(&[(MANIFEST_ENTRY, "{ nope")])).unwrap();

        assert!(matches!(
            extract_from_path(&path),
            Err(ManifestError::Json(_))
        ));
    }

    #[test]
    fn is_archive_path_ignores_extension_case() {
        assert!(is_archive_path(Path::new("NEW.a.b.c.1.zip")));
        assert!(is_archive_path(Path::new("bundle.ZIP")));
        assert!(!is_archive_path(Path::new("MANIFEST.json")));
        assert!(!is_archive_path(Path::new("zip")));
    }
}
