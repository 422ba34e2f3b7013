//! Category rules for routing files into subfolders by extension.
//!
//! A [`CategoryTable`] is an ordered list of categories. Most categories are a
//! flat set of extensions routed to a like-named folder. The `Documents`
//! category may instead hold named subcategories, which are checked before any
//! flat category. Extensions nobody claims fall into `Others`.
//!
//! # Examples
//!
//! ```
//! use dirsorter::file_category::CategoryTable;
//! use std::path::PathBuf;
//!
//! let mut table = CategoryTable::empty();
//! table.push_category("Images", &[".jpg", "PNG"]);
//! table.push_subcategory("Documents", "PDF", &[".pdf"]);
//!
//! assert_eq!(table.destination_subpath(".png"), PathBuf::from("Images"));
//! assert_eq!(table.destination_subpath(".PDF"), PathBuf::from("Documents").join("PDF"));
//! assert_eq!(table.destination_subpath(".xyz"), PathBuf::from("Others"));
//! ```
use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// Folder for files no category claims.
pub const CATCH_ALL: &str = "Others";

/// The one category whose subcategories take priority over flat categories.
pub const NESTED_CATEGORY: &str = "Documents";

/// Category whose extensions the watcher treats as transient and never moves.
pub const TEMP_CATEGORY: &str = "Temp";

/// Normalizes an extension to lower case with a leading dot.
///
/// Returns an empty string for blank input so it never matches a category.
///
/// ```
/// use dirsorter::file_category::normalize_extension;
///
/// assert_eq!(normalize_extension("JPG"), ".jpg");
/// assert_eq!(normalize_extension(" .Tar.GZ "), ".tar.gz");
/// assert_eq!(normalize_extension(""), "");
/// ```
pub fn normalize_extension(ext: &str) -> String {
    let trimmed = ext.trim();
    if trimmed.is_empty() || trimmed == "." {
        return String::new();
    }
    let lower = trimmed.to_lowercase();
    if lower.starts_with('.') {
        lower
    } else {
        format!(".{}", lower)
    }
}

/// Returns the normalized extension of a file path, or an empty string.
///
/// Only the last extension counts and dot-files have none, so
/// `archive.tar.gz` yields `.gz` and `.bashrc` yields `""`.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|ext| normalize_extension(&ext.to_string_lossy()))
        .unwrap_or_default()
}

/// The value side of one category entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryRule {
    /// A flat set of normalized extensions.
    Extensions(BTreeSet<String>),
    /// Ordered subcategories, each with its own extension set.
    Nested(Vec<(String, BTreeSet<String>)>),
}

impl CategoryRule {
    fn extensions<S: AsRef<str>>(exts: &[S]) -> BTreeSet<String> {
        exts.iter()
            .map(|ext| normalize_extension(ext.as_ref()))
            .filter(|ext| !ext.is_empty())
            .collect()
    }
}

/// Ordered mapping from category names to extension rules.
///
/// Declaration order is kept because the first matching flat category wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryTable {
    entries: Vec<(String, CategoryRule)>,
}

impl CategoryTable {
    /// Creates a table with no categories; every file maps to [`CATCH_ALL`].
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Adds or replaces a flat category. Replacing keeps the original position.
    pub fn push_category<S: AsRef<str>>(&mut self, name: &str, extensions: &[S]) {
        let rule = CategoryRule::Extensions(CategoryRule::extensions(extensions));
        match self.entries.iter_mut().find(|(existing, _)| existing == name) {
            Some(entry) => entry.1 = rule,
            None => self.entries.push((name.to_string(), rule)),
        }
    }

    /// Adds or replaces a subcategory under a nested parent category.
    ///
    /// A flat category with the parent's name is turned into a nested one.
    pub fn push_subcategory<S: AsRef<str>>(&mut self, parent: &str, name: &str, extensions: &[S]) {
        let set = CategoryRule::extensions(extensions);
        let index = match self.entries.iter().position(|(existing, _)| existing == parent) {
            Some(index) => index,
            None => {
                self.entries
                    .push((parent.to_string(), CategoryRule::Nested(Vec::new())));
                self.entries.len() - 1
            }
        };

        let rule = &mut self.entries[index].1;
        if matches!(rule, CategoryRule::Extensions(_)) {
            *rule = CategoryRule::Nested(Vec::new());
        }
        if let CategoryRule::Nested(subs) = rule {
            match subs.iter_mut().find(|(existing, _)| existing == name) {
                Some(sub) => sub.1 = set,
                None => subs.push((name.to_string(), set)),
            }
        }
    }

    /// Looks up a category by name.
    pub fn get(&self, name: &str) -> Option<&CategoryRule> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, rule)| rule)
    }

    /// Category names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Nested categories other than [`NESTED_CATEGORY`]; these are never consulted.
    pub fn unreachable_nested(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(name, rule)| {
                name != NESTED_CATEGORY && matches!(rule, CategoryRule::Nested(_))
            })
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Computes the folder, relative to the base directory, for an extension.
    ///
    /// Resolution order:
    /// 1. Subcategories of `Documents`, in order, as `Documents/<sub>`
    /// 2. Flat categories in declaration order, skipping nested ones
    /// 3. `Others`
    pub fn destination_subpath(&self, extension: &str) -> PathBuf {
        let ext = normalize_extension(extension);

        if let Some(CategoryRule::Nested(subs)) = self.get(NESTED_CATEGORY) {
            for (sub, extensions) in subs {
                if extensions.contains(&ext) {
                    return PathBuf::from(NESTED_CATEGORY).join(sub);
                }
            }
        }

        for (name, rule) in &self.entries {
            if let CategoryRule::Extensions(extensions) = rule
                && extensions.contains(&ext)
            {
                return PathBuf::from(name);
            }
        }

        PathBuf::from(CATCH_ALL)
    }

    /// Whether an extension is on the `Temp` skip-list.
    pub fn is_temp_extension(&self, extension: &str) -> bool {
        match self.get(TEMP_CATEGORY) {
            Some(CategoryRule::Extensions(extensions)) => {
                extensions.contains(&normalize_extension(extension))
            }
            _ => false,
        }
    }
}

impl Default for CategoryTable {
    /// The built-in table used when no configuration supplies one.
    fn default() -> Self {
        let mut table = Self::empty();
        table.push_category(
            "Images",
            &[".jpg", ".jpeg", ".png", ".gif", ".bmp", ".svg", ".webp", ".tiff", ".ico", ".heic"],
        );
        table.push_category(
            "Videos",
            &[".mp4", ".mkv", ".avi", ".mov", ".wmv", ".flv", ".webm", ".3gp"],
        );
        table.push_category(
            "Audio",
            &[".mp3", ".wav", ".flac", ".aac", ".ogg", ".m4a", ".wma"],
        );
        table.push_category(
            "Archives",
            &[".zip", ".rar", ".7z", ".tar", ".gz", ".bz2", ".xz"],
        );
        table.push_subcategory(NESTED_CATEGORY, "PDF", &[".pdf"]);
        table.push_subcategory(NESTED_CATEGORY, "Word", &[".doc", ".docx", ".odt", ".rtf"]);
        table.push_subcategory(NESTED_CATEGORY, "Excel", &[".xls", ".xlsx", ".ods", ".csv"]);
        table.push_subcategory(NESTED_CATEGORY, "PowerPoint", &[".ppt", ".pptx", ".odp"]);
        table.push_subcategory(NESTED_CATEGORY, "Text", &[".txt", ".md"]);
        table.push_category(
            "Code",
            &[
                ".py", ".rs", ".js", ".ts", ".java", ".c", ".cpp", ".h", ".go", ".sh", ".html",
                ".css", ".json", ".xml", ".yaml", ".yml", ".toml",
            ],
        );
        table.push_category("Executables", &[".exe", ".msi", ".dmg", ".deb", ".rpm", ".appimage"]);
        table.push_category(
            TEMP_CATEGORY,
            &[".tmp", ".part", ".crdownload", ".download", ".swp", ".partial"],
        );
        table
    }
}

impl Serialize for CategoryRule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CategoryRule::Extensions(extensions) => {
                let mut seq = serializer.serialize_seq(Some(extensions.len()))?;
                for ext in extensions {
                    seq.serialize_element(ext)?;
                }
                seq.end()
            }
            CategoryRule::Nested(subs) => {
                let mut map = serializer.serialize_map(Some(subs.len()))?;
                for (name, extensions) in subs {
                    map.serialize_entry(name, extensions)?;
                }
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for CategoryRule {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RuleVisitor;

        impl<'de> Visitor<'de> for RuleVisitor {
            type Value = CategoryRule;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a list of extensions or a map of subcategories")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut extensions = Vec::new();
                while let Some(ext) = seq.next_element::<String>()? {
                    extensions.push(ext);
                }
                Ok(CategoryRule::Extensions(CategoryRule::extensions(&extensions)))
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut subs: Vec<(String, BTreeSet<String>)> = Vec::new();
                while let Some((name, extensions)) = map.next_entry::<String, Vec<String>>()? {
                    if subs.iter().any(|(existing, _)| *existing == name) {
                        return Err(de::Error::custom(format!("duplicate subcategory '{}'", name)));
                    }
                    subs.push((name, CategoryRule::extensions(&extensions)));
                }
                Ok(CategoryRule::Nested(subs))
            }
        }

        deserializer.deserialize_any(RuleVisitor)
    }
}

impl Serialize for CategoryTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, rule) in &self.entries {
            map.serialize_entry(name, rule)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for CategoryTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TableVisitor;

        impl<'de> Visitor<'de> for TableVisitor {
            type Value = CategoryTable;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of category names to extension rules")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries: Vec<(String, CategoryRule)> = Vec::new();
                while let Some((name, rule)) = map.next_entry::<String, CategoryRule>()? {
                    if entries.iter().any(|(existing, _)| *existing == name) {
                        return Err(de::Error::custom(format!("duplicate category '{}'", name)));
                    }
                    entries.push((name, rule));
                }
                Ok(CategoryTable { entries })
            }
        }

        deserializer.deserialize_map(TableVisitor)
    }
}
