//! Typed read models over the metadata log.

mod disk_state;
mod installation;
mod loadout;

pub use disk_state::{DiskState, DiskStateEntry};
pub use installation::{GameInstallMetadata, GameInstallation};
pub use loadout::{GroupKind, ItemKind, Loadout, LoadoutItem, LoadoutKind, NewLoadout};
