//! Archive format negotiation.
//!
//! Works out which release archive formats this machine can unpack and in
//! which order they should be preferred. Detection looks at:
//! - **`tar`**: GNU tar gates compression filters on its version (xz needs
//!   1.22+, bzip2 1.15+, gzip always); bsdtar/libarchive advertises the
//!   linked libraries in its version banner (`liblzma`, `bz2lib`, `zlib`).
//! - **Standalone tools**: `xz`, `7z`, `bzip2` and `gzip` on `PATH`. The
//!   compressors also let a `tar` without the built-in filter handle the
//!   matching tarball through `--use-compress-program`.
//! - **Built-ins**: zip and tar.gz are always unpacked in-process.
//!
//! The candidates are then filtered against [`PREFERENCE`], keeping the first
//! candidate for each format.

use std::path::PathBuf;
use std::process::Command;

/// Archive formats a release may ship, most preferred first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    TarXz,
    Xz,
    SevenZ,
    TarBz2,
    TarGz,
    Zip,
    Tar,
}

/// Global preference order.
pub const PREFERENCE: [ArchiveFormat; 7] = [
    ArchiveFormat::TarXz,
    ArchiveFormat::Xz,
    ArchiveFormat::SevenZ,
    ArchiveFormat::TarBz2,
    ArchiveFormat::TarGz,
    ArchiveFormat::Zip,
    ArchiveFormat::Tar,
];

impl ArchiveFormat {
    /// File extension without the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            ArchiveFormat::TarXz => "tar.xz",
            ArchiveFormat::Xz => "xz",
            ArchiveFormat::SevenZ => "7z",
            ArchiveFormat::TarBz2 => "tar.bz2",
            ArchiveFormat::TarGz => "tar.gz",
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::Tar => "tar",
        }
    }

    /// Strip this format's extension from an archive file name.
    pub fn strip_extension(self, file_name: &str) -> Option<&str> {
        file_name
            .strip_suffix(self.extension())
            .and_then(|stem| stem.strip_suffix('.'))
            .filter(|stem| !stem.is_empty())
    }
}

impl std::fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Compression handled by a `tar` invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TarFilter {
    None,
    /// `tar` decompresses itself (`-J`, `-j`, `-z`).
    Builtin,
    /// `tar --use-compress-program=<program>`.
    Program(&'static str),
}

/// How an archive gets unpacked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extractor {
    /// In-process zip reader.
    BuiltinZip,
    /// In-process tar + gzip reader.
    BuiltinTarGz,
    Tar(TarFilter),
    SevenZip,
    /// Single-file `xz` decompression.
    XzStream,
}

impl Extractor {
    /// External executable this extractor runs, if any.
    pub fn program(self) -> Option<&'static str> {
        match self {
            Extractor::BuiltinZip | Extractor::BuiltinTarGz => None,
            Extractor::Tar(_) => Some("tar"),
            Extractor::SevenZip => Some("7z"),
            Extractor::XzStream => Some("xz"),
        }
    }
}

/// A supported format and the strategy used to unpack it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatCapability {
    pub format: ArchiveFormat,
    pub extractor: Extractor,
}

impl FormatCapability {
    pub const fn new(format: ArchiveFormat, extractor: Extractor) -> Self {
        Self { format, extractor }
    }
}

/// Flavour of the `tar` found on the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TarFlavor {
    Gnu { major: u32, minor: u32 },
    Bsd { xz: bool, bzip2: bool, gzip: bool },
}

impl TarFlavor {
    /// Classify `tar --version` output.
    pub fn from_banner(banner: &str) -> Option<Self> {
        if banner.contains("GNU tar") {
            let version = banner.lines().next()?.split_whitespace().last()?;
            let mut parts = version.split('.').map(|p| p.parse::<u32>().ok());
            let major = parts.next().flatten()?;
            let minor = parts.next().flatten().unwrap_or(0);
            return Some(TarFlavor::Gnu { major, minor });
        }
        if banner.contains("bsdtar") || banner.contains("libarchive") {
            return Some(TarFlavor::Bsd {
                xz: banner.contains("liblzma"),
                bzip2: banner.contains("bz2lib"),
                gzip: banner.contains("zlib"),
            });
        }
        None
    }

    fn at_least(major: u32, minor: u32, want: (u32, u32)) -> bool {
        (major, minor) >= want
    }

    pub fn supports_xz(&self) -> bool {
        match self {
            TarFlavor::Gnu { major, minor } => Self::at_least(*major, *minor, (1, 22)),
            TarFlavor::Bsd { xz, .. } => *xz,
        }
    }

    pub fn supports_bzip2(&self) -> bool {
        match self {
            TarFlavor::Gnu { major, minor } => Self::at_least(*major, *minor, (1, 15)),
            TarFlavor::Bsd { bzip2, .. } => *bzip2,
        }
    }

    pub fn supports_gzip(&self) -> bool {
        match self {
            TarFlavor::Gnu { .. } => true,
            TarFlavor::Bsd { gzip, .. } => *gzip,
        }
    }
}

/// What the environment offers, as gathered by a probe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolInventory {
    /// `tar --version` output, if a `tar` is installed.
    pub tar_banner: Option<String>,
    pub xz: bool,
    pub seven_zip: bool,
    pub bzip2: bool,
    pub gzip: bool,
}

impl ToolInventory {
    /// Probe `PATH` and `tar --version`.
    pub fn probe() -> Self {
        let tar_banner = find_executable("tar").and_then(|tar| {
            let output = Command::new(tar).arg("--version").output().ok()?;
            if !output.status.success() {
                return None;
            }
            Some(String::from_utf8_lossy(&output.stdout).into_owned())
        });

        Self {
            tar_banner,
            xz: find_executable("xz").is_some(),
            seven_zip: find_executable("7z").is_some(),
            bzip2: find_executable("bzip2").is_some(),
            gzip: find_executable("gzip").is_some(),
        }
    }
}

/// Locate `name` on `PATH` (honouring `PATHEXT` on Windows).
pub fn find_executable(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    let extensions: Vec<String> = if cfg!(windows) {
        std::env::var("PATHEXT")
            .unwrap_or_else(|_| ".EXE;.CMD;.BAT".to_string())
            .split(';')
            .map(str::to_string)
            .collect()
    } else {
        vec![String::new()]
    };

    std::env::split_paths(&path).find_map(|dir| {
        extensions.iter().find_map(|ext| {
            let candidate = dir.join(format!("{}{}", name, ext));
            candidate.is_file().then_some(candidate)
        })
    })
}

/// Every way this inventory can unpack something, unordered and with repeats.
fn candidates(tools: &ToolInventory) -> Vec<FormatCapability> {
    use ArchiveFormat::*;

    let mut found = vec![
        FormatCapability::new(Zip, Extractor::BuiltinZip),
        FormatCapability::new(TarGz, Extractor::BuiltinTarGz),
    ];

    let tar = tools.tar_banner.as_deref().and_then(TarFlavor::from_banner);
    if let Some(tar) = &tar {
        let filtered = |supported: bool, standalone: bool, program: &'static str| {
            if supported {
                Some(TarFilter::Builtin)
            } else if standalone {
                Some(TarFilter::Program(program))
            } else {
                None
            }
        };

        if let Some(filter) = filtered(tar.supports_xz(), tools.xz, "xz") {
            found.push(FormatCapability::new(TarXz, Extractor::Tar(filter)));
        }
        if let Some(filter) = filtered(tar.supports_bzip2(), tools.bzip2, "bzip2") {
            found.push(FormatCapability::new(TarBz2, Extractor::Tar(filter)));
        }
        if let Some(filter) = filtered(tar.supports_gzip(), tools.gzip, "gzip") {
            found.push(FormatCapability::new(TarGz, Extractor::Tar(filter)));
        }
        found.push(FormatCapability::new(Tar, Extractor::Tar(TarFilter::None)));
    }

    if tools.xz {
        found.push(FormatCapability::new(Xz, Extractor::XzStream));
    }
    if tools.seven_zip {
        found.push(FormatCapability::new(SevenZ, Extractor::SevenZip));
    }

    found
}

/// Order the inventory's capabilities by [`PREFERENCE`], one per format.
pub fn negotiate(tools: &ToolInventory) -> Vec<FormatCapability> {
    let found = candidates(tools);
    PREFERENCE
        .iter()
        .filter_map(|format| found.iter().find(|c| c.format == *format).copied())
        .collect()
}

/// Probe the machine and return its supported formats, most preferred first.
pub fn detect_supported_formats() -> Vec<FormatCapability> {
    let tools = ToolInventory::probe();
    tracing::debug!("Archive tools: {:?}", tools);
    negotiate(&tools)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ArchiveFormat::*;

    const GNU_134: &str = "tar (GNU tar) 1.34\nCopyright (C) 2021 Free Software Foundation, Inc.\n";
    const BSD_FULL: &str =
        "bsdtar 3.5.3 - libarchive 3.5.3 zlib/1.2.11 liblzma/5.0.5 bz2lib/1.0.8 libzstd/1.5.5\n";
    const BSD_ZLIB_ONLY: &str = "bsdtar 3.6.2 - libarchive 3.6.2 zlib/1.2.12\n";

    fn formats(caps: &[FormatCapability]) -> Vec<ArchiveFormat> {
        caps.iter().map(|c| c.format).collect()
    }

    #[test]
    fn test_builtins_always_present() {
        let caps = negotiate(&ToolInventory::default());
        assert_eq!(formats(&caps), vec![TarGz, Zip]);
        assert_eq!(caps[1].extractor, Extractor::BuiltinZip);
    }

    #[test]
    fn test_gnu_tar_version_gates() {
        let old = TarFlavor::from_banner("tar (GNU tar) 1.14\n").unwrap();
        assert!(!old.supports_bzip2());
        assert!(!old.supports_xz());
        assert!(old.supports_gzip());

        let mid = TarFlavor::from_banner("tar (GNU tar) 1.21\n").unwrap();
        assert!(mid.supports_bzip2());
        assert!(!mid.supports_xz());

        let new = TarFlavor::from_banner(GNU_134).unwrap();
        assert_eq!(new, TarFlavor::Gnu { major: 1, minor: 34 });
        assert!(new.supports_xz());
    }

    #[test]
    fn test_bsd_tar_banner_substrings() {
        let flavor = TarFlavor::from_banner(BSD_ZLIB_ONLY).unwrap();
        assert_eq!(
            flavor,
            TarFlavor::Bsd {
                xz: false,
                bzip2: false,
                gzip: true
            }
        );
        assert!(TarFlavor::from_banner("busybox v1.36").is_none());
    }

    #[test]
    fn test_full_toolset_order() {
        let tools = ToolInventory {
            tar_banner: Some(GNU_134.to_string()),
            xz: true,
            seven_zip: true,
            bzip2: true,
            gzip: true,
        };
        let caps = negotiate(&tools);
        assert_eq!(formats(&caps), PREFERENCE.to_vec());
        assert_eq!(caps[0].extractor, Extractor::Tar(TarFilter::Builtin));
        assert_eq!(caps[4].extractor, Extractor::BuiltinTarGz);
    }

    #[test]
    fn test_standalone_compressor_fills_tar_gap() {
        let tools = ToolInventory {
            tar_banner: Some(BSD_ZLIB_ONLY.to_string()),
            xz: true,
            ..Default::default()
        };
        let caps = negotiate(&tools);
        assert_eq!(formats(&caps), vec![TarXz, Xz, TarGz, Zip, Tar]);
        assert_eq!(caps[0].extractor, Extractor::Tar(TarFilter::Program("xz")));
    }

    #[test]
    fn test_negotiation_is_deterministic() {
        let tools = ToolInventory {
            tar_banner: Some(BSD_FULL.to_string()),
            seven_zip: true,
            ..Default::default()
        };
        let first = negotiate(&tools);
        for _ in 0..10 {
            assert_eq!(negotiate(&tools), first);
        }
        assert_eq!(formats(&first), vec![TarXz, SevenZ, TarBz2, TarGz, Zip, Tar]);
    }

    #[test]
    fn test_strip_extension() {
        assert_eq!(TarXz.strip_extension("Hack.tar.xz"), Some("Hack"));
        assert_eq!(Zip.strip_extension("Hack.zip"), Some("Hack"));
        assert_eq!(Zip.strip_extension("Hackzip"), None);
        assert_eq!(Zip.strip_extension(".zip"), None);
    }
}
