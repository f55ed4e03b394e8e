//! Decompression stages.
//!
//! A file is unpacked into one or more members by looking at its name:
//! `.gz`/`.gzip` yields one member named after the gzip header (or the
//! file name minus the suffix), `.zip` yields one member per entry. Members
//! are unpacked again until no stage applies, to a bounded depth.

use std::io::{Cursor, Read};

use ferry_core::emit;
use ferry_core::metrics::events::{FileSkipped, SkipReason};
use flate2::read::GzDecoder;
use snafu::ResultExt;
use tracing::{info, warn};

use crate::error::{BadGzipSnafu, BadZipSnafu, DecodeError};

/// Nested archives deeper than this are passed through undecoded.
const MAX_DEPTH: usize = 4;

/// Decompressed content and the name that decides how to parse it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// Display path, e.g. `/exports/a.zip/orders.csv`.
    pub path: String,
    /// Name used to pick the next stage or parser.
    pub name: String,
    pub data: Vec<u8>,
}

impl Member {
    pub fn new(path: impl Into<String>, data: Vec<u8>) -> Self {
        let path = path.into();
        let name = base_name(&path).to_string();
        Self { path, name, data }
    }
}

/// One way of turning a compressed payload into members.
pub trait CompressionStage: Send + Sync {
    fn unpack(&self, member: &Member) -> Result<Vec<Member>, DecodeError>;

    fn name(&self) -> &'static str;
}

/// Single-member gzip.
#[derive(Debug, Clone, Copy, Default)]
pub struct GzipStage;

impl CompressionStage for GzipStage {
    fn unpack(&self, member: &Member) -> Result<Vec<Member>, DecodeError> {
        let mut decoder = GzDecoder::new(member.data.as_slice());
        let mut data = Vec::new();
        decoder.read_to_end(&mut data).context(BadGzipSnafu {
            path: member.path.clone(),
        })?;

        let inner = decoder
            .header()
            .and_then(|h| h.filename())
            .map(|raw| base_name(&String::from_utf8_lossy(raw)).to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| strip_gzip_suffix(&member.name).to_string());

        Ok(vec![Member {
            path: member.path.clone(),
            name: inner,
            data,
        }])
    }

    fn name(&self) -> &'static str {
        "gzip"
    }
}

/// Multi-member zip archive. Unreadable entries are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipStage;

impl CompressionStage for ZipStage {
    fn unpack(&self, member: &Member) -> Result<Vec<Member>, DecodeError> {
        let mut archive =
            zip::ZipArchive::new(Cursor::new(member.data.as_slice())).context(BadZipSnafu {
                path: member.path.clone(),
            })?;

        let mut members = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let mut entry = match archive.by_index(index) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(path = %member.path, index, error = %e, "Skipping unreadable archive entry");
                    emit!(FileSkipped {
                        reason: SkipReason::CorruptArchive
                    });
                    continue;
                }
            };
            if entry.is_dir() {
                continue;
            }

            let entry_name = entry.name().to_string();
            let path = format!("{}/{}", member.path, entry_name);
            let mut data = Vec::new();
            if let Err(e) = entry.read_to_end(&mut data) {
                warn!(path = %path, error = %e, "Skipping {path} file because it is not a zipped file.");
                emit!(FileSkipped {
                    reason: SkipReason::CorruptArchive
                });
                continue;
            }

            members.push(Member {
                path,
                name: base_name(&entry_name).to_string(),
                data,
            });
        }
        Ok(members)
    }

    fn name(&self) -> &'static str {
        "zip"
    }
}

/// Pick the stage for a member name, if any.
///
/// Tar archives are rejected outright.
pub fn stage_for(path: &str, name: &str) -> Result<Option<&'static dyn CompressionStage>, DecodeError> {
    let lower = name.to_ascii_lowercase();
    if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
        return Err(DecodeError::NotImplemented {
            path: path.to_string(),
            format: "tar.gz",
        });
    }
    if lower.ends_with(".gz") || lower.ends_with(".gzip") {
        return Ok(Some(&GzipStage));
    }
    if lower.ends_with(".zip") {
        return Ok(Some(&ZipStage));
    }
    Ok(None)
}

/// Unpack `member` through every applicable stage.
///
/// Empty results are logged and dropped. An error on the outermost stage is
/// returned; errors inside an archive only drop the affected entry.
pub fn expand(member: Member) -> Result<Vec<Member>, DecodeError> {
    let mut out = Vec::new();
    expand_into(member, 0, &mut out)?;
    Ok(out)
}

fn expand_into(member: Member, depth: usize, out: &mut Vec<Member>) -> Result<(), DecodeError> {
    let stage = if depth < MAX_DEPTH {
        stage_for(&member.path, &member.name)?
    } else {
        None
    };

    let Some(stage) = stage else {
        if member.data.is_empty() {
            info!(path = %member.path, "Skipping {} file because it is empty.", member.path);
            emit!(FileSkipped {
                reason: SkipReason::Empty
            });
        } else {
            out.push(member);
        }
        return Ok(());
    };

    for inner in stage.unpack(&member)? {
        match expand_into(inner, depth + 1, out) {
            Ok(()) => {}
            Err(e) if e.kind().is_fatal() => return Err(e),
            Err(e) => {
                warn!(path = %member.path, stage = stage.name(), error = %e, "Skipping archive member");
                emit!(FileSkipped {
                    reason: SkipReason::CorruptArchive
                });
            }
        }
    }
    Ok(())
}

fn base_name(path: &str) -> &str {
    path.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(path)
}

fn strip_gzip_suffix(name: &str) -> &str {
    let lower = name.to_ascii_lowercase();
    for suffix in [".gzip", ".gz"] {
        if lower.ends_with(suffix) {
            return &name[..name.len() - suffix.len()];
        }
    }
    name
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;

    pub(crate) fn make_gzip(data: &[u8], embedded_name: Option<&str>) -> Vec<u8> {
        let mut builder = flate2::GzBuilder::new();
        if let Some(name) = embedded_name {
            builder = builder.filename(name);
        }
        let mut encoder = builder.write(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    pub(crate) fn make_zip(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default();
        for (name, data) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_plain_file_passes_through() {
        let members = expand(Member::new("/exports/a.csv", b"id\n1\n".to_vec())).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].name, "a.csv");
    }

    #[test]
    fn test_gzip_uses_embedded_name() {
        let data = make_gzip(b"{\"id\":1}\n", Some("orders.jsonl"));
        let members = expand(Member::new("/exports/export.gz", data)).unwrap();

        assert_eq!(members.len(), 1);
        assert_eq!(members[0].name, "orders.jsonl");
        assert_eq!(members[0].path, "/exports/export.gz");
        assert_eq!(members[0].data, b"{\"id\":1}\n");
    }

    #[test]
    fn test_gzip_without_header_name_strips_suffix() {
        let data = make_gzip(b"id\n1\n", None);
        let members = expand(Member::new("/exports/test.txt.gzip", data)).unwrap();
        assert_eq!(members[0].name, "test.txt");
    }

    #[test]
    fn test_zip_yields_every_member() {
        let data = make_zip(&[("a.csv", b"id\n1\n".to_vec()), ("nested/b.jsonl", b"{\"id\":2}\n".to_vec())]);
        let members = expand(Member::new("/exports/bundle.zip", data)).unwrap();

        let names: Vec<_> = members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["a.csv", "b.jsonl"]);
        assert_eq!(members[0].path, "/exports/bundle.zip/a.csv");
    }

    #[test]
    fn test_gzip_inside_zip() {
        let inner = make_gzip(b"id\n1\n", Some("inner.csv"));
        let data = make_zip(&[("inner.csv.gz", inner)]);
        let members = expand(Member::new("/exports/bundle.zip", data)).unwrap();

        assert_eq!(members.len(), 1);
        assert_eq!(members[0].name, "inner.csv");
    }

    #[test]
    fn test_empty_zip_member_skipped() {
        let data = make_zip(&[("empty.csv", b"".to_vec()), ("full.csv", b"id\n1\n".to_vec())]);
        let members = expand(Member::new("/exports/bundle.zip", data)).unwrap();

        assert_eq!(members.len(), 1);
        assert_eq!(members[0].name, "full.csv");
    }

    #[test]
    fn test_tar_gz_not_implemented() {
        let err = expand(Member::new("/exports/a.tar.gz", vec![1, 2, 3])).unwrap_err();
        assert!(matches!(err, DecodeError::NotImplemented { .. }));
        assert!(err.kind().is_fatal());
    }

    #[test]
    fn test_corrupt_archives_are_recoverable() {
        let err = expand(Member::new("/exports/a.zip", b"not a zip".to_vec())).unwrap_err();
        assert!(matches!(err, DecodeError::BadZip { .. }));
        assert!(!err.kind().is_fatal());

        let err = expand(Member::new("/exports/a.csv.gz", b"not gzip".to_vec())).unwrap_err();
        assert!(matches!(err, DecodeError::BadGzip { .. }));
    }

    #[test]
    fn test_corrupt_gzip_inside_zip_skips_member() {
        let data = make_zip(&[("bad.csv.gz", b"garbage".to_vec()), ("good.csv", b"id\n1\n".to_vec())]);
        let members = expand(Member::new("/exports/bundle.zip", data)).unwrap();

        assert_eq!(members.len(), 1);
        assert_eq!(members[0].name, "good.csv");
    }
}
