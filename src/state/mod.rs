//! Install state: the INI store format and the two-scope overlay built on it.

mod cfg;
mod overlay;

pub use cfg::{Cfg, ConfigStore};
pub use overlay::InstallStateOverlay;
