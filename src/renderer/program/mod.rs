//! Program generation and caching.
//!
//! - [`key`]: structured and fast program keys
//! - [`shader_gen`]: template rendering of program source
//! - [`cache`]: compiled programs, reference counts and eviction

pub mod cache;
pub mod key;
pub mod shader_gen;

pub use cache::{MaterialFingerprint, ProgramCache, ProgramCacheStats, ProgramHandle, ProgramRequest};
pub use key::{FastProgramKey, FogKind, OutputTarget, ProgramKey, SceneInputs, fx_hash_key};
pub use shader_gen::{ProgramSource, ShaderGenerator};
