//! Reading binary package archives (`.deb`).
//!
//! A `.deb` is an `ar` container holding `debian-binary`, a `control.tar[.ext]` member with the
//! package metadata and a `data.tar[.ext]` member with the shipped files.

use crate::compression::Compression;
use crate::control::ControlParagraph;
use crate::{AptRepositoryError, Result};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::warn;

/// Everything a package record is built from, read in one pass.
#[derive(Debug, Clone, Default)]
pub struct ArchiveContents {
    pub control: ControlParagraph,
    /// Regular files shipped by the package.
    pub members: Vec<String>,
    /// Entries of the `md5sums` control member; empty when there is none.
    pub md5sums: BTreeMap<String, String>,
}

/// Access to the metadata inside a package archive.
pub trait ArchiveReader {
    /// The `control` stanza of the package.
    fn extract_control(&self, path: &Path) -> Result<ControlParagraph>;

    /// Regular files shipped by the package, relative, without a leading `./`.
    fn list_members(&self, path: &Path) -> Result<Vec<String>>;

    /// Per-file md5 digests from the `md5sums` control member, keyed by member path.
    ///
    /// A package without an `md5sums` member yields an empty map.
    fn member_checksums(&self, path: &Path) -> Result<BTreeMap<String, String>>;

    /// Control stanza, file list and md5sums together.
    fn read_contents(&self, path: &Path) -> Result<ArchiveContents> {
        Ok(ArchiveContents {
            control: self.extract_control(path)?,
            members: self.list_members(path)?,
            md5sums: self.member_checksums(path)?,
        })
    }
}

/// Reads `.deb` files from disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct DebArchive;

fn malformed(path: &Path, reason: impl std::fmt::Display) -> AptRepositoryError {
    AptRepositoryError::archive(path.display().to_string(), reason.to_string())
}

/// Stream every ar member after `debian-binary` through `visit` until it returns `false`.
fn visit_ar_members<F>(path: &Path, mut visit: F) -> Result<()>
where
    F: FnMut(&str, &mut dyn Read) -> Result<bool>,
{
    let file = File::open(path)?;
    let mut archive = ar::Archive::new(BufReader::new(file));
    let mut seen_version = false;

    while let Some(entry) = archive.next_entry() {
        let mut entry = entry.map_err(|e| malformed(path, e))?;
        let name = String::from_utf8_lossy(entry.header().identifier()).into_owned();

        if name == "debian-binary" {
            seen_version = true;
            continue;
        }
        if !seen_version {
            return Err(malformed(path, "missing debian-binary member"));
        }
        if !visit(&name, &mut entry)? {
            break;
        }
    }

    Ok(())
}

/// Call `visit` for every regular file in the tar stream of ar member `name`.
fn visit_tar<F>(path: &Path, name: &str, member: &mut dyn Read, mut visit: F) -> Result<()>
where
    F: FnMut(&str, &mut dyn Read) -> Result<bool>,
{
    let reader = Compression::from_filename(name)
        .reader(member)
        .map_err(|e| malformed(path, format!("{}: {}", name, e)))?;
    let mut tar = tar::Archive::new(reader);

    for entry in tar.entries().map_err(|e| malformed(path, e))? {
        let mut entry = entry.map_err(|e| malformed(path, e))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let file = entry
            .path()
            .map_err(|e| malformed(path, e))?
            .to_string_lossy()
            .into_owned();
        let file = file.strip_prefix("./").unwrap_or(&file).to_string();
        if !visit(&file, &mut entry)? {
            break;
        }
    }

    Ok(())
}

/// Call `visit` for every regular file in the first tar member named `<prefix>...`.
fn visit_tar_member<F>(path: &Path, prefix: &str, mut visit: F) -> Result<()>
where
    F: FnMut(&str, &mut dyn Read) -> Result<bool>,
{
    let mut found = false;
    visit_ar_members(path, |name, member| {
        if !name.starts_with(prefix) {
            return Ok(true);
        }
        found = true;
        visit_tar(path, name, member, &mut visit)?;
        Ok(false)
    })?;
    if !found {
        return Err(malformed(path, format!("no {} member", prefix)));
    }
    Ok(())
}

fn read_text(path: &Path, file: &str, reader: &mut dyn Read) -> Result<String> {
    let mut text = String::new();
    reader
        .read_to_string(&mut text)
        .map_err(|e| malformed(path, format!("{}: {}", file, e)))?;
    Ok(text)
}

/// Read a single file out of `control.tar`, if present.
fn read_control_file(path: &Path, wanted: &str) -> Result<Option<String>> {
    let mut contents = None;
    visit_tar_member(path, "control.tar", |file, reader| {
        if file != wanted {
            return Ok(true);
        }
        contents = Some(read_text(path, file, reader)?);
        Ok(false)
    })?;
    Ok(contents)
}

fn missing_md5sums(path: &Path) {
    warn!(
        "'md5sums' file not found in {}, can't list MD5 sums",
        path.display()
    );
}

impl ArchiveReader for DebArchive {
    fn extract_control(&self, path: &Path) -> Result<ControlParagraph> {
        let text = read_control_file(path, "control")?
            .ok_or_else(|| malformed(path, "control.tar has no control file"))?;
        ControlParagraph::parse(&text)
    }

    fn list_members(&self, path: &Path) -> Result<Vec<String>> {
        let mut members = Vec::new();
        visit_tar_member(path, "data.tar", |file, _| {
            members.push(file.to_string());
            Ok(true)
        })?;
        Ok(members)
    }

    fn member_checksums(&self, path: &Path) -> Result<BTreeMap<String, String>> {
        let Some(text) = read_control_file(path, "md5sums")? else {
            missing_md5sums(path);
            return Ok(BTreeMap::new());
        };
        Ok(parse_md5sums(&text))
    }

    fn read_contents(&self, path: &Path) -> Result<ArchiveContents> {
        let mut control: Option<String> = None;
        let mut md5sums: Option<String> = None;
        let mut members: Option<Vec<String>> = None;

        visit_ar_members(path, |name, member| {
            if name.starts_with("control.tar") && control.is_none() {
                visit_tar(path, name, member, |file, reader| {
                    match file {
                        "control" => control = Some(read_text(path, file, reader)?),
                        "md5sums" => md5sums = Some(read_text(path, file, reader)?),
                        _ => {}
                    }
                    Ok(true)
                })?;
                control.get_or_insert_with(String::new);
            } else if name.starts_with("data.tar") && members.is_none() {
                let mut files = Vec::new();
                visit_tar(path, name, member, |file, _| {
                    files.push(file.to_string());
                    Ok(true)
                })?;
                members = Some(files);
            }
            Ok(control.is_none() || members.is_none())
        })?;

        let control = control.ok_or_else(|| malformed(path, "no control.tar member"))?;
        if control.is_empty() {
            return Err(malformed(path, "control.tar has no control file"));
        }
        let members = members.ok_or_else(|| malformed(path, "no data.tar member"))?;
        let md5sums = match md5sums {
            Some(text) => parse_md5sums(&text),
            None => {
                missing_md5sums(path);
                BTreeMap::new()
            }
        };

        Ok(ArchiveContents {
            control: ControlParagraph::parse(&control)?,
            members,
            md5sums,
        })
    }
}

/// Parse `md5sums` member text: one `<digest>  <path>` per line.
pub fn parse_md5sums(text: &str) -> BTreeMap<String, String> {
    text.lines()
        .filter_map(|line| {
            let (digest, path) = line.trim().split_once(char::is_whitespace)?;
            let path = path.trim_start();
            (!path.is_empty()).then(|| (path.to_string(), digest.to_string()))
        })
        .collect()
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    //! Assembles small `.deb` files for tests. Panics on I/O errors.

    use crate::compression::Compression;
    use std::path::{Path, PathBuf};

    /// A tar stream of `files` behind a `./` directory entry, compressed with `compression`.
    pub fn tar(compression: Compression, files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());

        let mut dir = tar::Header::new_gnu();
        dir.set_entry_type(tar::EntryType::Directory);
        dir.set_mode(0o755);
        dir.set_size(0);
        builder
            .append_data(&mut dir, "./", std::io::empty())
            .unwrap();

        for (name, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_entry_type(tar::EntryType::Regular);
            header.set_mode(0o644);
            header.set_size(data.len() as u64);
            builder.append_data(&mut header, name, *data).unwrap();
        }
        compression.compress(&builder.into_inner().unwrap()).unwrap()
    }

    /// An ar container of `members`, in order.
    pub fn ar(members: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = ar::Builder::new(Vec::new());
        for (name, data) in members {
            let header = ar::Header::new(name.as_bytes().to_vec(), data.len() as u64);
            builder.append(&header, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    /// A `.deb` with the given control text, optional md5sums text and data files.
    pub fn build_deb(control: &str, md5sums: Option<&str>, files: &[(&str, &[u8])]) -> Vec<u8> {
        build_deb_compressed(control, md5sums, files, Compression::Gzip)
    }

    /// Like [`build_deb`], with the data member compressed by `compression`.
    pub fn build_deb_compressed(
        control: &str,
        md5sums: Option<&str>,
        files: &[(&str, &[u8])],
        compression: Compression,
    ) -> Vec<u8> {
        let mut control_files: Vec<(&str, &[u8])> = vec![("./control", control.as_bytes())];
        if let Some(md5sums) = md5sums {
            control_files.push(("./md5sums", md5sums.as_bytes()));
        }
        let control_tar = tar(Compression::Gzip, &control_files);
        let data_tar = tar(compression, files);
        let data_name = format!("data.tar{}", compression.extension());

        ar(&[
            ("debian-binary", &b"2.0\n"[..]),
            ("control.tar.gz", &control_tar[..]),
            (data_name.as_str(), &data_tar[..]),
        ])
    }

    /// A minimal package `name_version_arch.deb` written to `dir`.
    pub fn write_deb(dir: &Path, name: &str, version: &str, arch: &str) -> PathBuf {
        write_deb_with_fields(dir, name, version, arch, "Depends: libc6 (>= 2.34)\n")
    }

    /// A package shipping its copyright file, with `extra` control lines before `Description`.
    pub fn write_deb_with_fields(
        dir: &Path,
        name: &str,
        version: &str,
        arch: &str,
        extra: &str,
    ) -> PathBuf {
        let control = format!(
            "Package: {name}\nVersion: {version}\nArchitecture: {arch}\n\
             Maintainer: Test <test@example.com>\n{extra}\
             Description: test package {name}\n A package used in tests.\n"
        );
        let copyright = format!("usr/share/doc/{}/copyright", name);
        let md5sums = format!("{:x}  {}\n", md5::compute(b"copyright"), copyright);
        let deb = build_deb(&control, Some(&md5sums), &[(copyright.as_str(), b"copyright")]);
        let path = dir.join(format!("{}_{}_{}.deb", name, version, arch));
        std::fs::write(&path, deb).unwrap();
        path
    }
}
