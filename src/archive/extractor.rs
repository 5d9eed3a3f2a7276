//! Lazy member iteration over the archive shapes the datasets ship in.
//!
//! Members are decompressed one at a time as the iterator is advanced, so a
//! caller that stops early never pays for the rest of the archive.

use crate::archive::error::ArchiveError;
use crate::types::raw_member::RawMember;
use crate::types::source::{file_name_of, ArchiveFormat, DedupKey, MemberFilter, SourceDescriptor};
use flate2::read::GzDecoder;
use log::{debug, warn};
use std::collections::HashSet;
use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::path::{Path, PathBuf};
use zip::ZipArchive;

/// Which members to yield and how many.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub filter: MemberFilter,
    pub dedup: DedupKey,
    pub limit: Option<usize>,
}

impl Selection {
    pub fn new(filter: MemberFilter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    pub fn with_dedup(mut self, dedup: DedupKey) -> Self {
        self.dedup = dedup;
        self
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }
}

impl From<&SourceDescriptor> for Selection {
    fn from(descriptor: &SourceDescriptor) -> Self {
        Selection {
            filter: descriptor.filter.clone(),
            dedup: descriptor.dedup,
            limit: descriptor.limit,
        }
    }
}

/// Book-keeping shared by every archive shape: filter, dedup keys seen so far
/// and the number of members handed out.
struct Selector {
    selection: Selection,
    seen: HashSet<String>,
    taken: usize,
}

impl Selector {
    fn new(selection: Selection) -> Self {
        Self {
            selection,
            seen: HashSet::new(),
            taken: 0,
        }
    }

    fn is_full(&self) -> bool {
        self.selection
            .limit
            .is_some_and(|limit| self.taken >= limit)
    }

    fn admit(&mut self, name: &str) -> bool {
        if !self.selection.filter.matches(name) {
            return false;
        }
        match self.selection.dedup.key_for(name) {
            Some(key) => self.seen.insert(key),
            None => true,
        }
    }

    fn took(&mut self) {
        self.taken += 1;
    }
}

enum Inner {
    Gzip(Option<GzDecoder<File>>),
    Tar(tar::Archive<GzDecoder<File>>),
    Zip(ZipArchive<File>),
    ZipOfZips {
        archive: ZipArchive<File>,
        containers: Option<HashSet<String>>,
    },
}

/// An opened dataset archive.
pub struct ArchiveExtractor {
    path: PathBuf,
    inner: Inner,
}

impl ArchiveExtractor {
    pub fn open(path: &Path, format: ArchiveFormat) -> Result<Self, ArchiveError> {
        let open_file = || File::open(path).map_err(|e| ArchiveError::Open(path.to_path_buf(), e));
        let open_zip = || {
            ZipArchive::new(open_file()?).map_err(|e| ArchiveError::Zip(path.to_path_buf(), e))
        };
        let inner = match format {
            ArchiveFormat::GzipCsv => Inner::Gzip(Some(GzDecoder::new(open_file()?))),
            ArchiveFormat::TarGz => Inner::Tar(tar::Archive::new(GzDecoder::new(open_file()?))),
            ArchiveFormat::Zip => Inner::Zip(open_zip()?),
            ArchiveFormat::ZipOfZips => Inner::ZipOfZips {
                archive: open_zip()?,
                containers: None,
            },
            ArchiveFormat::ParquetChunks => {
                return Err(ArchiveError::UnsupportedFormat {
                    path: path.to_path_buf(),
                    format,
                })
            }
        };
        debug!("Opened {:?} archive {:?}", format, path);
        Ok(Self {
            path: path.to_path_buf(),
            inner,
        })
    }

    /// Restricts a zip of zips to the nested archives with these file names.
    pub fn with_containers<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Inner::ZipOfZips { containers, .. } = &mut self.inner {
            *containers = Some(names.into_iter().map(Into::into).collect());
        }
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lazily yields the members picked by `selection`, in archive order.
    ///
    /// An unreadable member is logged and skipped. A corrupt archive stream
    /// yields one error and then ends.
    pub fn members(&mut self, selection: Selection) -> Result<Members<'_>, ArchiveError> {
        let path = self.path.as_path();
        let selector = Selector::new(selection);
        let iter: Box<dyn Iterator<Item = Result<RawMember, ArchiveError>> + '_> =
            match &mut self.inner {
                Inner::Gzip(decoder) => Box::new(GzipMembers {
                    path,
                    decoder: decoder.take(),
                    selector,
                }),
                Inner::Tar(archive) => Box::new(TarMembers {
                    path,
                    entries: archive
                        .entries()
                        .map_err(|e| ArchiveError::Tar(path.to_path_buf(), e))?,
                    selector,
                    failed: false,
                }),
                Inner::Zip(archive) => Box::new(ZipMembers {
                    path,
                    archive,
                    index: 0,
                    selector,
                }),
                Inner::ZipOfZips {
                    archive,
                    containers,
                } => Box::new(NestedZipMembers {
                    path,
                    archive,
                    containers: containers.as_ref(),
                    index: 0,
                    selector,
                }),
            };
        Ok(Members { iter })
    }
}

/// Opens `path` and reads every selected member into memory.
pub fn extract(
    path: &Path,
    format: ArchiveFormat,
    selection: Selection,
) -> Result<Vec<RawMember>, ArchiveError> {
    let mut extractor = ArchiveExtractor::open(path, format)?;
    let members: Result<Vec<RawMember>, ArchiveError> = extractor.members(selection)?.collect();
    members
}

pub struct Members<'a> {
    iter: Box<dyn Iterator<Item = Result<RawMember, ArchiveError>> + 'a>,
}

impl Iterator for Members<'_> {
    type Item = Result<RawMember, ArchiveError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next()
    }
}

struct GzipMembers<'a> {
    path: &'a Path,
    decoder: Option<GzDecoder<File>>,
    selector: Selector,
}

impl Iterator for GzipMembers<'_> {
    type Item = Result<RawMember, ArchiveError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.selector.is_full() {
            return None;
        }
        let mut decoder = self.decoder.take()?;
        let file_name = file_name_of(&self.path.to_string_lossy()).to_string();
        let name = file_name
            .strip_suffix(".gz")
            .unwrap_or(&file_name)
            .to_string();
        if !self.selector.admit(&name) {
            return None;
        }
        let mut bytes = Vec::new();
        if let Err(e) = decoder.read_to_end(&mut bytes) {
            return Some(Err(ArchiveError::Gzip(self.path.to_path_buf(), e)));
        }
        self.selector.took();
        Some(Ok(RawMember::new(name, bytes)))
    }
}

struct TarMembers<'a> {
    path: &'a Path,
    entries: tar::Entries<'a, GzDecoder<File>>,
    selector: Selector,
    failed: bool,
}

impl Iterator for TarMembers<'_> {
    type Item = Result<RawMember, ArchiveError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.failed && !self.selector.is_full() {
            let mut entry = match self.entries.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(ArchiveError::Tar(self.path.to_path_buf(), e)));
                }
            };
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let name = match entry.path() {
                Ok(name) => name.to_string_lossy().into_owned(),
                Err(e) => {
                    warn!("Skipping tar entry with unreadable name in {:?}: {}", self.path, e);
                    continue;
                }
            };
            if !self.selector.admit(&name) {
                continue;
            }
            let mut bytes = Vec::new();
            if let Err(e) = entry.read_to_end(&mut bytes) {
                warn!("Skipping unreadable member {} in {:?}: {}", name, self.path, e);
                continue;
            }
            self.selector.took();
            return Some(Ok(RawMember::new(name, bytes)));
        }
        None
    }
}

/// Reads entry `index` if it is a file the selector admits.
fn read_zip_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    index: usize,
    selector: &mut Selector,
    origin: &str,
) -> Option<(String, Vec<u8>)> {
    let mut file = match archive.by_index(index) {
        Ok(file) => file,
        Err(e) => {
            warn!("Skipping unreadable entry #{} in {}: {}", index, origin, e);
            return None;
        }
    };
    if !file.is_file() {
        return None;
    }
    let name = file.name().to_string();
    if !selector.admit(&name) {
        return None;
    }
    let mut bytes = Vec::new();
    if let Err(e) = file.read_to_end(&mut bytes) {
        warn!("Skipping unreadable member {} in {}: {}", name, origin, e);
        return None;
    }
    Some((name, bytes))
}

struct ZipMembers<'a> {
    path: &'a Path,
    archive: &'a mut ZipArchive<File>,
    index: usize,
    selector: Selector,
}

impl Iterator for ZipMembers<'_> {
    type Item = Result<RawMember, ArchiveError>;

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.path;
        let origin = path.to_string_lossy();
        while self.index < self.archive.len() && !self.selector.is_full() {
            let index = self.index;
            self.index += 1;
            if let Some((name, bytes)) =
                read_zip_entry(self.archive, index, &mut self.selector, &origin)
            {
                self.selector.took();
                return Some(Ok(RawMember::new(name, bytes)));
            }
        }
        None
    }
}

/// Yields the first selected member of every nested zip.
struct NestedZipMembers<'a> {
    path: &'a Path,
    archive: &'a mut ZipArchive<File>,
    containers: Option<&'a HashSet<String>>,
    index: usize,
    selector: Selector,
}

impl NestedZipMembers<'_> {
    fn read_container(&mut self, index: usize) -> Option<(String, Vec<u8>)> {
        let mut file = match self.archive.by_index(index) {
            Ok(file) => file,
            Err(e) => {
                warn!("Skipping unreadable entry #{} in {:?}: {}", index, self.path, e);
                return None;
            }
        };
        let name = file_name_of(file.name()).to_string();
        if !file.is_file() || !name.ends_with(".zip") {
            return None;
        }
        if self.containers.is_some_and(|wanted| !wanted.contains(&name)) {
            return None;
        }
        let mut bytes = Vec::new();
        if let Err(e) = file.read_to_end(&mut bytes) {
            warn!("Skipping unreadable member {} in {:?}: {}", name, self.path, e);
            return None;
        }
        Some((name, bytes))
    }
}

impl Iterator for NestedZipMembers<'_> {
    type Item = Result<RawMember, ArchiveError>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.index < self.archive.len() && !self.selector.is_full() {
            let index = self.index;
            self.index += 1;
            let Some((container, bytes)) = self.read_container(index) else {
                continue;
            };
            let mut nested = match ZipArchive::new(Cursor::new(bytes)) {
                Ok(nested) => nested,
                Err(e) => {
                    warn!("Skipping {}: not a readable zip archive: {}", container, e);
                    continue;
                }
            };
            let found = (0..nested.len())
                .find_map(|i| read_zip_entry(&mut nested, i, &mut self.selector, &container));
            match found {
                Some((name, bytes)) => {
                    self.selector.took();
                    return Some(Ok(RawMember::nested(container, name, bytes)));
                }
                None => warn!("No valid member found in {}", container),
            }
        }
        None
    }
}
