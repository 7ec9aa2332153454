//! Archive extraction into the staging area.
//!
//! Zip and gzip-compressed tarballs are unpacked in-process (`zip`, `tar` +
//! `flate2`). Everything else is handed to the external tool chosen during
//! format negotiation, described as a [`ToolInvocation`] so the exact command
//! line can be inspected before it runs:
//!
//! ```text
//! tar.xz   tar -xJf <archive> -C <dest>
//! tar.bz2  tar -xjf <archive> -C <dest>
//! tar.gz   tar -xzf <archive> -C <dest>
//! tar      tar -xf <archive> -C <dest>
//! (filter) tar --use-compress-program <xz|bzip2|gzip> -xf <archive> -C <dest>
//! 7z       7z x <archive> -o<dest> -y
//! xz       xz -d -c <archive>  > <dest>/<archive stem>
//! ```
//!
//! Extraction is idempotent: an existing destination directory is treated as
//! already extracted. Work happens in `<dest>.partial`, renamed into place on
//! success, so an interrupted extraction is redone on the next attempt.

use crate::error::{FontError, Result};
use crate::formats::{ArchiveFormat, Extractor, FormatCapability, TarFilter};
use anyhow::Context;
use flate2::read::GzDecoder;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tar::Archive;
use tracing::debug;

/// An external extraction command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub program: &'static str,
    pub args: Vec<OsString>,
    /// Redirect stdout into this file (single-file decompressors).
    pub stdout_to: Option<PathBuf>,
}

/// Build the external command for `capability`, or `None` for built-ins.
pub fn invocation(
    archive: &Path,
    dest: &Path,
    capability: &FormatCapability,
) -> Result<Option<ToolInvocation>> {
    use ArchiveFormat::*;

    let unsupported = || FontError::UnsupportedFormat(capability.format.extension().to_string());
    let mut args: Vec<OsString> = Vec::new();

    let mut stdout_to = None;

    match (capability.format, capability.extractor) {
        (Zip, Extractor::BuiltinZip) | (TarGz, Extractor::BuiltinTarGz) => return Ok(None),

        (TarXz | TarBz2 | TarGz, Extractor::Tar(TarFilter::Builtin)) => {
            let flag = match capability.format {
                TarXz => "-xJf",
                TarBz2 => "-xjf",
                _ => "-xzf",
            };
            args.push(flag.into());
            args.push(archive.into());
            args.extend([OsString::from("-C"), OsString::from(dest)]);
        }
        (TarXz | TarBz2 | TarGz, Extractor::Tar(TarFilter::Program(filter))) => {
            args.extend([
                OsString::from("--use-compress-program"),
                OsString::from(filter),
                OsString::from("-xf"),
            ]);
            args.push(archive.into());
            args.extend([OsString::from("-C"), OsString::from(dest)]);
        }
        (Tar, Extractor::Tar(TarFilter::None)) => {
            args.push("-xf".into());
            args.push(archive.into());
            args.extend([OsString::from("-C"), OsString::from(dest)]);
        }
        (SevenZ, Extractor::SevenZip) => {
            let mut out = OsString::from("-o");
            out.push(dest);
            args.extend([
                OsString::from("x"),
                OsString::from(archive),
                out,
                OsString::from("-y"),
            ]);
        }
        (Xz, Extractor::XzStream) => {
            let name = archive
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| Xz.strip_extension(n))
                .ok_or_else(unsupported)?;
            args.extend([OsString::from("-d"), OsString::from("-c"), OsString::from(archive)]);
            stdout_to = Some(dest.join(name));
        }
        _ => return Err(unsupported()),
    }

    let program = capability.extractor.program().ok_or_else(unsupported)?;
    Ok(Some(ToolInvocation {
        program,
        args,
        stdout_to,
    }))
}

/// Extract `archive` into `dest`. Returns `false` if `dest` already existed.
pub fn extract_archive(archive: &Path, dest: &Path, capability: &FormatCapability) -> Result<bool> {
    if dest.exists() {
        debug!("{} already extracted", dest.display());
        return Ok(false);
    }

    let dest_name = dest
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("Invalid extraction directory: {}", dest.display()))?;
    let mut partial_name = dest_name.to_os_string();
    partial_name.push(".partial");
    let partial = dest.with_file_name(partial_name);

    if partial.exists() {
        fs::remove_dir_all(&partial)?;
    }
    fs::create_dir_all(&partial)
        .with_context(|| format!("Failed to create directory: {}", partial.display()))?;

    let result = match invocation(archive, &partial, capability)? {
        None => match capability.extractor {
            Extractor::BuiltinZip => extract_zip(archive, &partial),
            _ => extract_tar_gz(archive, &partial),
        },
        Some(tool) => run_tool(archive, &tool),
    };

    if let Err(e) = result {
        let _ = fs::remove_dir_all(&partial);
        return Err(e);
    }

    fs::rename(&partial, dest)?;
    Ok(true)
}

fn run_tool(archive: &Path, tool: &ToolInvocation) -> Result<()> {
    debug!("Running {} {:?}", tool.program, tool.args);

    let mut command = Command::new(tool.program);
    command.args(&tool.args).stdin(Stdio::null());
    if let Some(path) = &tool.stdout_to {
        let file = fs::File::create(path)
            .with_context(|| format!("Failed to create file: {}", path.display()))?;
        command.stdout(file);
    }

    let output = command
        .output()
        .with_context(|| format!("Failed to run {}", tool.program))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(FontError::ExtractFailed {
            archive: archive.to_path_buf(),
            reason: format!("{} exited with {}: {}", tool.program, output.status, stderr.trim()),
        });
    }

    Ok(())
}

/// Extract a ZIP archive, rejecting entries that escape `dest`
fn extract_zip(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = fs::File::open(archive_path)
        .with_context(|| format!("Failed to open archive: {}", archive_path.display()))?;
    let mut archive = zip::ZipArchive::new(file)
        .with_context(|| format!("Failed to read ZIP archive: {}", archive_path.display()))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .with_context(|| format!("Failed to read archive entry {}", i))?;

        let entry_path = entry.enclosed_name().ok_or_else(|| FontError::ExtractFailed {
            archive: archive_path.to_path_buf(),
            reason: format!("unsafe entry path: {}", entry.name()),
        })?;
        let output_path = dest.join(entry_path);

        if entry.is_dir() {
            fs::create_dir_all(&output_path)?;
        } else {
            if let Some(parent) = output_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut outfile = fs::File::create(&output_path)
                .with_context(|| format!("Failed to create file: {}", output_path.display()))?;
            std::io::copy(&mut entry, &mut outfile)
                .with_context(|| format!("Failed to extract: {}", output_path.display()))?;
        }
    }

    Ok(())
}

fn extract_tar_gz(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = fs::File::open(archive_path)
        .with_context(|| format!("Failed to open archive: {}", archive_path.display()))?;
    let mut archive = Archive::new(GzDecoder::new(file));

    archive
        .unpack(dest)
        .with_context(|| format!("Failed to extract archive to: {}", dest.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn cap(format: ArchiveFormat, extractor: Extractor) -> FormatCapability {
        FormatCapability::new(format, extractor)
    }

    fn args(tool: &ToolInvocation) -> Vec<String> {
        tool.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_tar_flag_templates() {
        let archive = Path::new("/s/Hack.tar.xz");
        let dest = Path::new("/s/Hack");

        let xz = invocation(archive, dest, &cap(ArchiveFormat::TarXz, Extractor::Tar(TarFilter::Builtin)))
            .unwrap()
            .unwrap();
        assert_eq!(xz.program, "tar");
        assert_eq!(args(&xz), ["-xJf", "/s/Hack.tar.xz", "-C", "/s/Hack"]);

        let bz = invocation(archive, dest, &cap(ArchiveFormat::TarBz2, Extractor::Tar(TarFilter::Builtin)))
            .unwrap()
            .unwrap();
        assert_eq!(args(&bz)[0], "-xjf");

        let piped = invocation(
            archive,
            dest,
            &cap(ArchiveFormat::TarXz, Extractor::Tar(TarFilter::Program("xz"))),
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            args(&piped),
            ["--use-compress-program", "xz", "-xf", "/s/Hack.tar.xz", "-C", "/s/Hack"]
        );
    }

    #[test]
    fn test_seven_zip_and_xz_templates() {
        let seven = invocation(
            Path::new("/s/Hack.7z"),
            Path::new("/s/Hack"),
            &cap(ArchiveFormat::SevenZ, Extractor::SevenZip),
        )
        .unwrap()
        .unwrap();
        assert_eq!(seven.program, "7z");
        assert_eq!(args(&seven), ["x", "/s/Hack.7z", "-o/s/Hack", "-y"]);

        let xz = invocation(
            Path::new("/s/Font.ttf.xz"),
            Path::new("/s/Font"),
            &cap(ArchiveFormat::Xz, Extractor::XzStream),
        )
        .unwrap()
        .unwrap();
        assert_eq!(args(&xz), ["-d", "-c", "/s/Font.ttf.xz"]);
        assert_eq!(xz.stdout_to, Some(PathBuf::from("/s/Font/Font.ttf")));
    }

    #[test]
    fn test_builtins_need_no_tool() {
        let none = invocation(
            Path::new("a.zip"),
            Path::new("a"),
            &cap(ArchiveFormat::Zip, Extractor::BuiltinZip),
        )
        .unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn test_mismatched_capability_is_unsupported() {
        let err = invocation(
            Path::new("a.7z"),
            Path::new("a"),
            &cap(ArchiveFormat::SevenZ, Extractor::BuiltinZip),
        )
        .unwrap_err();
        match err {
            FontError::UnsupportedFormat(ext) => assert_eq!(ext, "7z"),
            other => panic!("unexpected error: {}", other),
        }

        assert!(
            invocation(
                Path::new("a.tar.xz"),
                Path::new("a"),
                &cap(ArchiveFormat::TarXz, Extractor::Tar(TarFilter::None)),
            )
            .is_err()
        );
    }

    fn write_zip(path: &Path, files: &[(&str, &[u8])]) {
        let file = fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        for (name, data) in files {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_extract_zip_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("Hack.zip");
        write_zip(&archive, &[("HackNerdFont-Regular.ttf", b"font"), ("LICENSE.md", b"mit")]);
        let dest = dir.path().join("Hack");
        let zip_cap = cap(ArchiveFormat::Zip, Extractor::BuiltinZip);

        assert!(extract_archive(&archive, &dest, &zip_cap).unwrap());
        assert_eq!(fs::read(dest.join("HackNerdFont-Regular.ttf")).unwrap(), b"font");
        assert!(!dir.path().join("Hack.partial").exists());

        // Second call must not touch the directory
        fs::remove_file(dest.join("LICENSE.md")).unwrap();
        assert!(!extract_archive(&archive, &dest, &zip_cap).unwrap());
        assert!(!dest.join("LICENSE.md").exists());
    }

    #[test]
    fn test_extract_tar_gz_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("Font.tar.gz");
        {
            let file = fs::File::create(&archive).unwrap();
            let gz = flate2::write::GzEncoder::new(file, flate2::Compression::default());
            let mut builder = tar::Builder::new(gz);
            let data = b"otf data";
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, "otf/Font-Regular.otf", &data[..])
                .unwrap();
            builder.into_inner().unwrap().finish().unwrap();
        }

        let dest = dir.path().join("Font");
        let tgz = cap(ArchiveFormat::TarGz, Extractor::BuiltinTarGz);
        assert!(extract_archive(&archive, &dest, &tgz).unwrap());
        assert_eq!(fs::read(dest.join("otf/Font-Regular.otf")).unwrap(), b"otf data");
    }

    #[test]
    fn test_corrupt_archive_leaves_no_directory() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("Broken.zip");
        fs::write(&archive, b"not a zip").unwrap();
        let dest = dir.path().join("Broken");

        assert!(extract_archive(&archive, &dest, &cap(ArchiveFormat::Zip, Extractor::BuiltinZip)).is_err());
        assert!(!dest.exists());
        assert!(!dir.path().join("Broken.partial").exists());
    }
}
