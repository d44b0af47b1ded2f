//! Validation error taxonomy, consolidation, and text rendering

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Closed set of validation error codes.
///
/// Every recoverable structural mismatch the validator can detect maps to
/// exactly one of these; anything outside this set is a fatal schema-grammar
/// violation and surfaces as [`crate::error::Error::Schema`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorCode {
    MissingRpc,
    MissingField,
    IncorrectType,
    ProtobufIsList,
    ProtobufIsNotList,
    ExtraneousEnumValue,
    MissingEnumValue,
    InvalidFetchDig,
    IncorrectArgument,
    InputMapIncorrectArg,
    InputMapMissingSourceField,
    InputMapIncorrectType,
    DataloaderIncorrectKeyFormat,
    DataloaderIncorrectSourceKey,
    DataloaderIncorrectArgKey,
    DataloaderIncorrectListArgument,
    DataloaderIncorrectResponseKey,
    NonNullableRecursiveField,
    WrappedFieldNotFound,
}

/// The fetch root a path starts from, as rendered in reports:
/// `Query.posts:[Post] calls Posts/ListPosts`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathRoot {
    pub parent_type: String,
    pub field_name: String,
    pub return_type: String,
    pub service: String,
    pub rpc: String,
}

/// One step of a walk: a GraphQL (parent type, field) checked against a
/// protobuf message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathStep {
    pub gql_parent: String,
    pub gql_field: String,
    pub proto_message: String,
}

/// A recorded walk from a fetch root down to the point an error was found
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Path {
    pub root: PathRoot,
    pub steps: Vec<PathStep>,
}

impl Path {
    pub fn root_only(root: PathRoot) -> Self {
        Self {
            root,
            steps: Vec::new(),
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}:{} calls {}/{}",
            self.root.parent_type,
            self.root.field_name,
            self.root.return_type,
            self.root.service,
            self.root.rpc
        )?;
        for step in &self.steps {
            write!(
                f,
                "\n  ⌙ {}.{} -> {}",
                step.gql_parent, step.gql_field, step.proto_message
            )?;
        }
        Ok(())
    }
}

/// A single structural inconsistency found on one path
#[derive(Debug, Clone, Serialize)]
pub struct ValidationError {
    pub code: ErrorCode,
    /// Dedup key: errors with equal (code, key) are one logical problem
    pub key: String,
    pub message: String,
    pub path: Path,
}

/// A consolidated report entry: one logical problem with every path that
/// reached it
#[derive(Debug, Clone, Serialize)]
pub struct ConsolidatedError {
    pub code: ErrorCode,
    pub key: String,
    pub message: String,
    pub paths: Vec<Path>,
}

impl fmt::Display for ConsolidatedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[ERROR] {}", self.message)?;
        for path in &self.paths {
            write!(f, "\n  {}", path)?;
        }
        Ok(())
    }
}

/// Merge duplicate `(code, key)` errors into single entries carrying all
/// contributing paths. Input order is preserved for first occurrences, and a
/// path is never listed twice.
pub fn consolidate(errors: Vec<ValidationError>) -> Vec<ConsolidatedError> {
    let mut by_key: HashMap<(ErrorCode, String), usize> = HashMap::new();
    let mut consolidated: Vec<ConsolidatedError> = Vec::new();

    for error in errors {
        match by_key.get(&(error.code, error.key.clone())) {
            Some(&idx) => {
                let entry = &mut consolidated[idx];
                if !entry.paths.contains(&error.path) {
                    entry.paths.push(error.path);
                }
            }
            None => {
                by_key.insert((error.code, error.key.clone()), consolidated.len());
                consolidated.push(ConsolidatedError {
                    code: error.code,
                    key: error.key,
                    message: error.message,
                    paths: vec![error.path],
                });
            }
        }
    }

    consolidated
}
