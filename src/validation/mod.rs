//! Executing candidate queries against TypeDB and the retry loop around it.

pub mod engine;
pub mod retry_loop;
pub mod supervisor;
pub mod typedb_http;
pub mod validator;

pub use engine::{EngineError, EngineRecovery, NoRecovery, QueryOutcome, ValidationEngine};
pub use retry_loop::{ConvertedQuery, LoopError, LoopState, ValidationLoop, WorkItem};
pub use supervisor::TypeDbServer;
pub use typedb_http::TypeDbHttpEngine;
pub use validator::{validate_schema_text, ValidationMode, Validator, Verdict};
