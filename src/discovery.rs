//! Group discovery: find labeled images and bucket them by group identifier.

use anyhow::Result;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::scan::collect_files;

/// A group identifier such as `Group_19`, as it appears in a filename.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct GroupLabel {
    label: String,
    #[serde(skip)]
    prefix_len: usize,
}

impl GroupLabel {
    /// Build the label the labeler writes for group `number`.
    pub fn new(prefix: &str, number: u64) -> Self {
        Self {
            label: format!("{prefix}_{number}"),
            prefix_len: prefix.len(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.label
    }

    pub fn prefix(&self) -> &str {
        &self.label[..self.prefix_len]
    }

    /// The numeric part (`Group_007` → 7), or `None` if it does not fit a `u64`.
    pub fn number(&self) -> Option<u64> {
        self.label[self.prefix_len + 1..].parse().ok()
    }
}

impl fmt::Display for GroupLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

/// Extract the group identifier from a filename.
///
/// The identifier must open the filename: `{prefix}_` followed by one or more
/// ASCII digits, ending at a non-alphanumeric character or the end of the
/// name. Anchoring keeps derived names such as `HDR_Group_1_batch_1.jpg` from
/// being picked up as members of `Group_1`.
///
/// ```rust
/// use bracket_hdr::discovery::parse_group_label;
///
/// assert_eq!(parse_group_label("Group_19_E1.jpg", "Group").unwrap().as_str(), "Group_19");
/// assert!(parse_group_label("HDR_Group_1_batch_1.jpg", "Group").is_none());
/// assert!(parse_group_label("Group_12abc.jpg", "Group").is_none());
/// ```
pub fn parse_group_label(file_name: &str, prefix: &str) -> Option<GroupLabel> {
    let rest = file_name.strip_prefix(prefix)?.strip_prefix('_')?;
    let digits_len = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits_len == 0 {
        return None;
    }
    if rest[digits_len..].chars().next().is_some_and(char::is_alphanumeric) {
        return None;
    }

    let digits = &rest[..digits_len];
    Some(GroupLabel {
        label: format!("{prefix}_{digits}"),
        prefix_len: prefix.len(),
    })
}

/// One group's images, in filesystem-listing order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageGroup {
    pub label: GroupLabel,
    pub files: Vec<PathBuf>,
}

/// Groups keyed by label, iterated in the order each label was first seen.
#[derive(Debug, Clone, Default)]
pub struct GroupMap {
    groups: Vec<ImageGroup>,
    index: HashMap<GroupLabel, usize>,
}

impl GroupMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `path` to `label`'s group, creating the group if needed.
    pub fn insert(&mut self, label: GroupLabel, path: PathBuf) {
        match self.index.get(&label) {
            Some(&i) => self.groups[i].files.push(path),
            None => {
                self.index.insert(label.clone(), self.groups.len());
                self.groups.push(ImageGroup { label, files: vec![path] });
            }
        }
    }

    pub fn get(&self, label: &str) -> Option<&ImageGroup> {
        self.groups.iter().find(|g| g.label.as_str() == label)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn total_files(&self) -> usize {
        self.groups.iter().map(|g| g.files.len()).sum()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ImageGroup> {
        self.groups.iter()
    }
}

impl<'a> IntoIterator for &'a GroupMap {
    type Item = &'a ImageGroup;
    type IntoIter = std::slice::Iter<'a, ImageGroup>;

    fn into_iter(self) -> Self::IntoIter {
        self.groups.iter()
    }
}

impl FromIterator<(GroupLabel, PathBuf)> for GroupMap {
    fn from_iter<I: IntoIterator<Item = (GroupLabel, PathBuf)>>(iter: I) -> Self {
        let mut map = GroupMap::new();
        for (label, path) in iter {
            map.insert(label, path);
        }
        map
    }
}

/// Scan `folder` for images with one of `extensions` and group them by label.
///
/// Files without a label are skipped quietly: unrelated images may share the
/// folder.
///
/// # Example
///
/// ```rust,no_run
/// use bracket_hdr::discovery::discover_groups;
/// use std::path::Path;
///
/// let groups = discover_groups(Path::new("./export"), "Group", &["jpg".to_string()])?;
/// for group in &groups {
///     println!("{}: {} image(s)", group.label, group.files.len());
/// }
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn discover_groups(folder: &Path, prefix: &str, extensions: &[String]) -> Result<GroupMap> {
    let files = collect_files(folder, extensions)?;
    let mut groups = GroupMap::new();

    for path in files {
        let label = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|name| parse_group_label(name, prefix));
        match label {
            Some(label) => groups.insert(label, path),
            None => log::debug!("No group label in {}", path.display()),
        }
    }

    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::fs;
    use tempfile::TempDir;

    fn label(name: &str) -> Option<String> {
        parse_group_label(name, "Group").map(|l| l.to_string())
    }

    // ── parse_group_label ────────────────────────────────────────────

    #[test]
    fn parses_labeler_output() {
        assert_eq!(label("Group_19_E1.jpg").as_deref(), Some("Group_19"));
        assert_eq!(label("Group_1_E12.JPG").as_deref(), Some("Group_1"));
        assert_eq!(label("Group_3.jpg").as_deref(), Some("Group_3"));
        assert_eq!(label("Group_4-edit.jpg").as_deref(), Some("Group_4"));
        assert_eq!(label("Group_5").as_deref(), Some("Group_5"));
    }

    #[test]
    fn rejects_unanchored_or_malformed() {
        assert_eq!(label("HDR_Group_1_batch_1.jpg"), None);
        assert_eq!(label("IMG_0001.jpg"), None);
        assert_eq!(label("Group_.jpg"), None);
        assert_eq!(label("Group_x1.jpg"), None);
        assert_eq!(label("Group_12abc.jpg"), None);
        assert_eq!(label("Group12_E1.jpg"), None);
        assert_eq!(label("group_1_E1.jpg"), None);
        assert_eq!(label("Grouping_1_E1.jpg"), None);
    }

    #[test]
    fn only_first_token_counts() {
        assert_eq!(label("Group_2_Group_7_E1.jpg").as_deref(), Some("Group_2"));
    }

    #[test]
    fn leading_zeros_are_kept_in_the_label() {
        let parsed = parse_group_label("Group_007_E1.jpg", "Group").unwrap();
        assert_eq!(parsed.as_str(), "Group_007");
        assert_eq!(parsed.number(), Some(7));
        assert_eq!(parsed.prefix(), "Group");
    }

    #[test]
    fn oversized_group_number_is_still_a_label() {
        let name = "Group_123456789012345678901234567890_E1.jpg";
        let parsed = parse_group_label(name, "Group").unwrap();
        assert_eq!(parsed.as_str(), "Group_123456789012345678901234567890");
        assert_eq!(parsed.number(), None);

        let groups: GroupMap = [(parsed.clone(), PathBuf::from(name))].into_iter().collect();
        assert_eq!(groups.get(parsed.as_str()).unwrap().files.len(), 1);
    }

    #[test]
    fn custom_prefix() {
        let parsed = parse_group_label("Set_2_E1.jpg", "Set").unwrap();
        assert_eq!(parsed, GroupLabel::new("Set", 2));
        assert!(parse_group_label("Group_2_E1.jpg", "Set").is_none());
    }

    // ── GroupMap ─────────────────────────────────────────────────────

    #[test]
    fn group_map_keeps_first_seen_order() {
        let map: GroupMap = [
            (GroupLabel::new("Group", 10), PathBuf::from("a")),
            (GroupLabel::new("Group", 2), PathBuf::from("b")),
            (GroupLabel::new("Group", 10), PathBuf::from("c")),
        ]
        .into_iter()
        .collect();

        let labels: Vec<&str> = map.iter().map(|g| g.label.as_str()).collect();
        assert_eq!(labels, vec!["Group_10", "Group_2"]);
        assert_eq!(map.get("Group_10").unwrap().files, vec![PathBuf::from("a"), PathBuf::from("c")]);
        assert_eq!(map.total_files(), 3);
    }

    // ── discover_groups ──────────────────────────────────────────────

    #[test]
    fn discovers_groups_and_skips_unlabeled() {
        let dir = TempDir::new().unwrap();
        for name in [
            "Group_1_E1.jpg",
            "Group_1_E2.jpg",
            "Group_1_E3.JPG",
            "Group_2_E1.jpg",
            "Group_2_E1.arw",
            "HDR_Group_1_batch_1.jpg",
            "vacation.jpg",
        ] {
            fs::write(dir.path().join(name), b"img").unwrap();
        }

        let groups = discover_groups(dir.path(), "Group", &["jpg".to_string()]).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups.get("Group_1").unwrap().files.len(), 3);
        assert_eq!(groups.get("Group_2").unwrap().files.len(), 1);
        assert_eq!(groups.total_files(), 4);
    }

    #[test]
    fn no_file_lands_in_two_groups() {
        let dir = TempDir::new().unwrap();
        for name in ["Group_1_E1.jpg", "Group_11_E1.jpg", "Group_1_Group_11.jpg", "Group_111.jpg"] {
            fs::write(dir.path().join(name), b"img").unwrap();
        }

        let groups = discover_groups(dir.path(), "Group", &["jpg".to_string()]).unwrap();
        let mut seen = HashSet::new();
        for group in &groups {
            for file in &group.files {
                assert!(seen.insert(file.clone()), "{} in two groups", file.display());
            }
        }
        assert_eq!(seen.len(), 4);
        assert_eq!(groups.get("Group_1").unwrap().files.len(), 2);
    }

    #[test]
    fn empty_folder_has_no_groups() {
        let dir = TempDir::new().unwrap();
        let groups = discover_groups(dir.path(), "Group", &["jpg".to_string()]).unwrap();
        assert!(groups.is_empty());
    }
}
