pub mod replay;
pub mod sandbox;
pub mod structural;
pub mod verifier;

pub use replay::{ReplayEngine, ReplayError, ReplayOptions, Replayed};
pub use sandbox::SandboxSpec;
pub use structural::{StructuralChecker, StructuralViolation};
pub use verifier::{ReplayFailure, Verdict, Verifier};
