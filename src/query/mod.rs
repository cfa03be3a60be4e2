//! Path enumeration over scenario graphs
//!
//! Produces the linear walks a player can take through a scenario, in a
//! deterministic order and under explicit bounds.

mod path;
mod types;

pub use path::{check_explicit_path, enumerate_paths, PathEnumerator};
pub use types::{EnumerationStats, Path, PathBounds, PathTermination};
