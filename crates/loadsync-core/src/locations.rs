//! Mapping between game locations and native directories.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::path::{GamePath, LocationId};

/// The native directories a game's locations resolve to.
#[derive(Debug, Clone, Default)]
pub struct LocationsRegister {
    locations: BTreeMap<LocationId, PathBuf>,
}

impl LocationsRegister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a location, consuming and returning the register.
    pub fn with_location(mut self, id: LocationId, root: impl Into<PathBuf>) -> Self {
        self.insert(id, root);
        self
    }

    pub fn insert(&mut self, id: LocationId, root: impl Into<PathBuf>) {
        self.locations.insert(id, root.into());
    }

    /// Native root of a location.
    pub fn get(&self, id: &LocationId) -> Option<&Path> {
        self.locations.get(id).map(PathBuf::as_path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&LocationId, &Path)> {
        self.locations.iter().map(|(id, p)| (id, p.as_path()))
    }

    /// Native path of a game path, `None` for unregistered locations.
    pub fn resolve(&self, path: &GamePath) -> Option<PathBuf> {
        self.get(path.location())
            .map(|root| root.join(path.to_relative_path_buf()))
    }

    /// Game path of a native path, relative to the deepest matching location.
    /// Locations sharing a root resolve to the first of them.
    pub fn to_game_path(&self, native: &Path) -> Option<GamePath> {
        let mut best: Option<(usize, &LocationId, &Path)> = None;
        for (id, root) in &self.locations {
            let Ok(rel) = native.strip_prefix(root) else {
                continue;
            };
            let depth = root.components().count();
            if best.is_none_or(|(d, _, _)| depth > d) {
                best = Some((depth, id, rel));
            }
        }
        best.map(|(_, id, rel)| GamePath::from_relative(id.clone(), rel))
    }

    /// Locations whose directory is not nested inside another location.
    /// Scanning these covers every registered directory exactly once; of
    /// several locations sharing a root only the first is returned.
    pub fn top_level_locations(&self) -> Vec<(LocationId, PathBuf)> {
        let mut top: Vec<(LocationId, PathBuf)> = Vec::new();
        for (id, root) in &self.locations {
            let nested = self
                .locations
                .values()
                .any(|other| root != other && root.starts_with(other));
            if !nested && !top.iter().any(|(_, seen)| seen == root) {
                top.push((id.clone(), root.clone()));
            }
        }
        top
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register() -> LocationsRegister {
        LocationsRegister::new()
            .with_location(LocationId::game(), "/games/foo")
            .with_location(LocationId::new("Saves"), "/games/foo/saves")
            .with_location(LocationId::new("Prefs"), "/home/user/.foo")
    }

    #[test]
    fn test_resolve() {
        let reg = register();
        let path = GamePath::new(LocationId::game(), "bin/run.sh");
        assert_eq!(
            reg.resolve(&path),
            Some(PathBuf::from("/games/foo/bin/run.sh"))
        );
        assert_eq!(
            reg.resolve(&GamePath::new(LocationId::new("Nope"), "a")),
            None
        );
    }

    #[test]
    fn test_to_game_path_prefers_deepest_location() {
        let reg = register();
        let path = reg
            .to_game_path(Path::new("/games/foo/saves/slot1.sav"))
            .unwrap();
        assert_eq!(path.location().as_str(), "Saves");
        assert_eq!(path.path(), "slot1.sav");

        let path = reg.to_game_path(Path::new("/games/foo/data/a.pak")).unwrap();
        assert_eq!(path.location(), &LocationId::game());
        assert!(reg.to_game_path(Path::new("/elsewhere/a")).is_none());
    }

    #[test]
    fn test_top_level_locations() {
        let top: Vec<_> = register()
            .top_level_locations()
            .into_iter()
            .map(|(id, _)| id.as_str().to_string())
            .collect();
        assert_eq!(top, vec!["Game", "Prefs"]);
    }

    #[test]
    fn test_shared_root_is_scanned_once() {
        let reg = LocationsRegister::new()
            .with_location(LocationId::game(), "/games/foo")
            .with_location(LocationId::new("Saves"), "/games/foo");

        let top = reg.top_level_locations();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].0, LocationId::game());

        let path = reg.to_game_path(Path::new("/games/foo/a.txt")).unwrap();
        assert_eq!(path.location(), &LocationId::game());
    }
}
