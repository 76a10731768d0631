//! Game-relative paths.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// Identifier of a registered game location (`Game`, `Saves`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocationId(pub CompactString);

impl LocationId {
    /// Name of the main game folder location.
    pub const GAME: &'static str = "Game";

    /// Create a location id from a name.
    pub fn new(name: impl Into<CompactString>) -> Self {
        Self(name.into())
    }

    /// The main game folder location.
    pub fn game() -> Self {
        Self::new(Self::GAME)
    }

    /// Get the location name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A path relative to one of a game's registered locations.
///
/// The relative part is always normalised: `/`-separated, without empty,
/// `.` or `..` components. An empty relative part denotes the location root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GamePath {
    location: LocationId,
    path: CompactString,
}

impl GamePath {
    /// Create a game path, normalising the relative part.
    pub fn new(location: LocationId, path: impl AsRef<str>) -> Self {
        let mut parts: Vec<&str> = Vec::new();
        for part in path.as_ref().split(['/', '\\']) {
            match part {
                "" | "." => {}
                ".." => {
                    parts.pop();
                }
                other => parts.push(other),
            }
        }
        Self {
            location,
            path: CompactString::from(parts.join("/")),
        }
    }

    /// The root of a location.
    pub fn root(location: LocationId) -> Self {
        Self {
            location,
            path: CompactString::default(),
        }
    }

    /// Build a game path from a filesystem path relative to the location root.
    pub fn from_relative(location: LocationId, relative: &Path) -> Self {
        let joined = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/");
        Self::new(location, joined)
    }

    /// The location this path is relative to.
    pub fn location(&self) -> &LocationId {
        &self.location
    }

    /// The normalised relative part.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether this is the location root.
    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    /// Parent directory, `None` for the location root.
    pub fn parent(&self) -> Option<GamePath> {
        if self.is_root() {
            return None;
        }
        let parent = match self.path.rfind('/') {
            Some(idx) => &self.path[..idx],
            None => "",
        };
        Some(Self {
            location: self.location.clone(),
            path: CompactString::from(parent),
        })
    }

    /// All parents of this path, nearest first, ending with the location root.
    pub fn ancestors(&self) -> impl Iterator<Item = GamePath> {
        std::iter::successors(self.parent(), GamePath::parent)
    }

    /// Last component, empty for the root.
    pub fn file_name(&self) -> &str {
        match self.path.rfind('/') {
            Some(idx) => &self.path[idx + 1..],
            None => &self.path,
        }
    }

    /// Extension of the last component, without the dot.
    pub fn extension(&self) -> Option<&str> {
        let name = self.file_name();
        match name.rfind('.') {
            Some(0) | None => None,
            Some(idx) => Some(&name[idx + 1..]),
        }
    }

    /// Append a relative segment.
    pub fn join(&self, segment: impl AsRef<str>) -> GamePath {
        if self.is_root() {
            return Self::new(self.location.clone(), segment);
        }
        Self::new(
            self.location.clone(),
            format!("{}/{}", self.path, segment.as_ref()),
        )
    }

    /// Whether `other` is this path or one of its ancestors.
    pub fn starts_with(&self, other: &GamePath) -> bool {
        if self.location != other.location {
            return false;
        }
        if other.is_root() || self.path == other.path {
            return true;
        }
        self.path.starts_with(other.path.as_str())
            && self.path.as_bytes().get(other.path.len()) == Some(&b'/')
    }

    /// The relative part as a platform path.
    pub fn to_relative_path_buf(&self) -> PathBuf {
        self.path.split('/').filter(|p| !p.is_empty()).collect()
    }
}

impl fmt::Display for GamePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}/{}", self.location, self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn game(path: &str) -> GamePath {
        GamePath::new(LocationId::game(), path)
    }

    #[test]
    fn test_normalisation() {
        assert_eq!(game("/bin//./x/../run.sh").path(), "bin/run.sh");
        assert_eq!(game("data\\textures\\a.dds").path(), "data/textures/a.dds");
        assert!(game("").is_root());
    }

    #[test]
    fn test_parent_chain() {
        let path = game("dir/sub/file.txt");
        let chain: Vec<String> = path.ancestors().map(|p| p.path().to_string()).collect();
        assert_eq!(chain, vec!["dir/sub", "dir", ""]);
        assert!(GamePath::root(LocationId::game()).parent().is_none());
    }

    #[test]
    fn test_file_name_and_extension() {
        let path = game("bin/run.sh");
        assert_eq!(path.file_name(), "run.sh");
        assert_eq!(path.extension(), Some("sh"));
        assert_eq!(game("bin/launcher").extension(), None);
        assert_eq!(game(".hidden").extension(), None);
    }

    #[test]
    fn test_starts_with() {
        let path = game("dir/sub/file.txt");
        assert!(path.starts_with(&game("dir")));
        assert!(path.starts_with(&game("")));
        assert!(!path.starts_with(&game("di")));
        assert!(!path.starts_with(&GamePath::new(LocationId::new("Saves"), "dir")));
    }

    #[test]
    fn test_join() {
        let root = GamePath::root(LocationId::game());
        assert_eq!(root.join("a").join("b.txt").path(), "a/b.txt");
        assert_eq!(
            game("a/b").to_relative_path_buf(),
            PathBuf::from("a").join("b")
        );
    }
}
