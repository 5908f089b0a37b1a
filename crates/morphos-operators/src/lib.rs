//! # Morphos Operators
//!
//! The six pure state transforms and the policy that picks one per cycle.
//!
//! ## Operators
//!
//! | Operator | Field | Rule |
//! |---|---|---|
//! | Linear | `linear_progress` | `+= e` |
//! | Circular | `circular_phase` | `(x + e) mod 1` |
//! | Rotating | `rotation_angle` | `+= e·π` |
//! | Modular | `modules_active` | `∪ {e}` |
//! | Iterative | `iteration_count` | `+= ⌊10e⌋` |
//! | Inverted | `validation_score` | `1 - |x - e|` |
//!
//! Every operator also stamps `last_entropy` and `last_operator`.

pub mod registry;
pub mod selector;

pub use registry::{apply, OperatorRegistry, TransformFn};
pub use selector::OperatorSelector;
