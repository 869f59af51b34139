//! Volume naming schemes for split and multi-part archives
//!
//! Recognizes the three numbering conventions seen in Usenet releases:
//! - 7z split: `name.7z.001`, `name.7z.002`, ...
//! - RAR new-style: `name.part01.rar`, `name.part02.rar`, ...
//! - RAR old-style: `name.rar`, `name.r00`, `name.r01`, ...
//!
//! Matching is ASCII case-insensitive; generated part names keep the case of
//! the primary file's stem.

use std::path::{Path, PathBuf};

/// Check if a filename is the first volume of a RAR archive.
///
/// Returns `true` for `.rar` (plain) and `.part01.rar`/`.part001.rar`.
/// Returns `false` for subsequent volumes (`.part02.rar`) and old-style `.rNN` files.
pub fn is_first_rar_volume(filename: &str) -> bool {
    let lower = filename.to_ascii_lowercase();

    if let Some(stem) = lower.strip_suffix(".rar") {
        if let Some((_, num)) = rar_part_number(stem) {
            return num == 1;
        }
        // Plain .rar with no .partNNN is the first volume
        return true;
    }

    // .r00 is a continuation of the .rar file, never a first volume
    false
}

/// Check if a filename is any volume of a RAR archive (first or subsequent).
pub fn is_rar_volume(filename: &str) -> bool {
    let lower = filename.to_ascii_lowercase();
    lower.ends_with(".rar") || legacy_rar_index(&lower).is_some()
}

/// Part number of a split 7z volume (`name.7z.NNN`), if the name is one
pub fn split_7z_part_number(filename: &str) -> Option<u32> {
    let lower = filename.to_ascii_lowercase();
    let pos = lower.rfind(".7z.")?;
    parse_digits(&lower[pos + 4..])
}

/// Check if a filename is the first part of a split 7z archive (`.7z.001`)
pub fn is_first_split_part(filename: &str) -> bool {
    split_7z_part_number(filename) == Some(1)
}

/// Check if a filename is a continuation volume that is never handled on its own
///
/// These are picked up through the group of their first volume.
pub fn is_continuation_volume(filename: &str) -> bool {
    if let Some(num) = split_7z_part_number(filename) {
        return num != 1;
    }
    let lower = filename.to_ascii_lowercase();
    if legacy_rar_index(&lower).is_some() {
        return true;
    }
    is_rar_volume(filename) && !is_first_rar_volume(filename)
}

/// Numbering convention of an archive group, derived from its primary volume
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitScheme {
    /// A standalone file with no further volumes
    Single,
    /// `prefix` + zero-padded number, starting at 1 (`movie.7z.` + `001`)
    SevenZipNumbered {
        /// Everything before the number, including the trailing dot
        prefix: String,
        /// Digits in the number
        width: usize,
    },
    /// `prefix` + zero-padded number + `.rar`, starting at 1 (`movie.part` + `01` + `.rar`)
    RarNumbered {
        /// Everything before the number, including `.part`
        prefix: String,
        /// Digits in the number
        width: usize,
        /// The `.rar` suffix as it appears on the primary
        suffix: String,
    },
    /// `stem.rar`, then `stem.r00`, `stem.r01`, ... `stem.r99`
    RarLegacy {
        /// File name without the `.rar` extension
        stem: String,
    },
}

impl SplitScheme {
    /// Classify the primary volume's file name
    pub fn of(filename: &str) -> Self {
        let lower = filename.to_ascii_lowercase();

        if let Some(pos) = lower.rfind(".7z.") {
            let digits = &lower[pos + 4..];
            if parse_digits(digits).is_some() {
                return SplitScheme::SevenZipNumbered {
                    prefix: filename[..pos + 4].to_string(),
                    width: digits.len(),
                };
            }
        }

        if let Some(stem) = lower.strip_suffix(".rar") {
            if let Some((part_idx, _)) = rar_part_number(stem) {
                let digits_start = part_idx + ".part".len();
                return SplitScheme::RarNumbered {
                    prefix: filename[..digits_start].to_string(),
                    width: stem.len() - digits_start,
                    suffix: filename[stem.len()..].to_string(),
                };
            }
            return SplitScheme::RarLegacy {
                stem: filename[..stem.len()].to_string(),
            };
        }

        SplitScheme::Single
    }

    /// File name of the volume at `index` (0 = primary), or `None` past the scheme's range
    pub fn part_name(&self, index: u32) -> Option<String> {
        match self {
            SplitScheme::Single => None,
            SplitScheme::SevenZipNumbered { prefix, width } => {
                Some(format!("{prefix}{:0width$}", index + 1, width = *width))
            }
            SplitScheme::RarNumbered {
                prefix,
                width,
                suffix,
            } => Some(format!(
                "{prefix}{:0width$}{suffix}",
                index + 1,
                width = *width
            )),
            SplitScheme::RarLegacy { stem } => match index {
                0 => Some(format!("{stem}.rar")),
                1..=100 => Some(format!("{stem}.r{:02}", index - 1)),
                _ => None,
            },
        }
    }
}

/// List the volumes of the group starting at `primary`, in order
///
/// Probes sequential part names with `exists` and stops at the first gap. The
/// given volume is always the first element, followed by the volumes numbered
/// after it, so a continuation such as `a.7z.002` yields `002, 003, ...`.
/// Nothing is known about how many parts the finished group will have; a
/// missing middle part simply ends the list.
pub fn discover_parts(primary: &Path, exists: impl Fn(&Path) -> bool) -> Vec<PathBuf> {
    let mut parts = vec![primary.to_path_buf()];

    let Some(filename) = primary.file_name().and_then(|n| n.to_str()) else {
        return parts;
    };
    let scheme = SplitScheme::of(filename);
    let dir = primary.parent().unwrap_or_else(|| Path::new(""));

    // part_name(n) is the volume numbered n + 1
    let mut index = volume_number(filename).unwrap_or(1).max(1);
    while let Some(name) = scheme.part_name(index) {
        let candidate = dir.join(name);
        if !exists(&candidate) {
            break;
        }
        parts.push(candidate);
        index += 1;
    }

    parts
}

/// Number of a `.7z.NNN` or `.partNN.rar` volume
fn volume_number(filename: &str) -> Option<u32> {
    if let Some(num) = split_7z_part_number(filename) {
        return Some(num);
    }
    let lower = filename.to_ascii_lowercase();
    let stem = lower.strip_suffix(".rar")?;
    rar_part_number(stem).map(|(_, num)| num)
}

/// `(index of ".part", number)` for a stem like `movie.part01`
fn rar_part_number(stem: &str) -> Option<(usize, u32)> {
    let part_idx = stem.rfind(".part")?;
    let num = parse_digits(&stem[part_idx + ".part".len()..])?;
    Some((part_idx, num))
}

/// Index of an old-style `.rNN` continuation (`.r00` -> 0)
fn legacy_rar_index(lower: &str) -> Option<u32> {
    let (_, ext) = lower.rsplit_once('.')?;
    let digits = ext.strip_prefix('r')?;
    if digits.len() != 2 {
        return None;
    }
    parse_digits(digits)
}

fn parse_digits(s: &str) -> Option<u32> {
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}
