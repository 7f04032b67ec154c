//! # FPCF Analysis
//!
//! Immutability and string constancy analyses hosted on the FPCF property
//! store, together with the program model they read and a harness that
//! checks results against expectation tables.
//!
//! ## Modules
//!
//! - **[`ir`]** - Normalized program representation and provider traits
//! - **[`program`]** - In-memory program model and builder
//! - **[`analyses`]** - Hosted analyses and standard registration
//! - **[`verify`]** - Expectation tables and result comparison
//!
//! ## Quick Start
//!
//! ```rust
//! use fpcf_analysis::prelude::*;
//!
//! let program = Program::builder()
//!     .class(
//!         ClassBuilder::new("pkg.Point")
//!             .final_class()
//!             .field(FieldBuilder::new("x", FieldType::Primitive).final_()),
//!     )
//!     .build()
//!     .unwrap();
//!
//! let spec = standard_profile(PrecisionLevel::L1, SoundnessMode::High);
//! let session = AnalysisSession::for_program(program, &spec, EngineConfig::default()).unwrap();
//! let class_immutability = session.kinds.class_immutability;
//!
//! let snapshot = session.run(&[("pkg.Point", class_immutability)]).unwrap();
//! assert_eq!(
//!     snapshot.get_named("pkg.Point", "ClassImmutability"),
//!     Some(&PropertyValue::Immutability(Immutability::DeepImmutable))
//! );
//! ```

pub mod analyses;
pub mod ir;
pub mod program;
pub mod verify;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::analyses::{standard_profile, AnalysisSession, StandardKinds};
    pub use crate::ir::{Expr, FieldType, HierarchyProvider, IrProvider, ProgramModel, Stmt};
    pub use crate::program::{ClassBuilder, FieldBuilder, Program};
    pub use crate::verify::{compare, ComparisonReport, ExpectationTable, ExpectedValue, HarnessError};

    pub use fpcf_core::prelude::*;
}

pub use analyses::{standard_profile, AnalysisSession, StandardKinds};
pub use program::Program;
pub use verify::{compare, ComparisonReport, ExpectationTable, HarnessError};
