//! The install gate: between a computed dependency diff and the real
//! install, scan what would change and let policy (or a human) decide.

pub mod gate;
pub mod lookup;
pub mod progress;
pub mod render;

pub use gate::{parse_answer, prompt, Classification, GateContext, InstallGate};
pub use lookup::SharedLookup;
pub use progress::Progress;
pub use render::{issue_title, render_report, ClassifiedFinding, PackageFindings};
