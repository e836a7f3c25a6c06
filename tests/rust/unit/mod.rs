//! Unit tests - cross-module translation behaviour, no engine or LLM.
//!
//! Mappings are the sample files under `mappings/`, so these tests also keep
//! those files loadable.

mod clause_splitting_tests;
mod translation_tests;
